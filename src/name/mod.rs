// Copyright 2021 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implementation of data structures related to domain names.
//!
//! Names are kept as label sequences in their on-the-wire form rather
//! than as dotted strings, so that operations like taking a superdomain
//! or relativizing against an origin work on label boundaries.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FusedIterator;
use std::str::FromStr;

mod builder;
mod error;
mod label;
mod wire;
pub use builder::NameBuilder;
pub use error::Error;
pub use label::Label;

/// The maximum number of labels in a domain name.
const MAX_N_LABELS: usize = 128;

/// The maximum length of the uncompressed on-the-wire representation of
/// a domain name.
const MAX_WIRE_LEN: usize = 255;

/// The maximum length of a label in a domain name (not including the
/// octet that provides the length).
const MAX_LABEL_LEN: usize = 63;

////////////////////////////////////////////////////////////////////////
// FULLY QUALIFIED NAMES                                              //
////////////////////////////////////////////////////////////////////////

/// A fully qualified domain name.
///
/// A `Name` stores the uncompressed on-the-wire representation defined
/// in [RFC 1035 § 3.1] together with the offset of each label in it.
/// The last label is always the null label, so the DNS root `.` has
/// length 1.
///
/// `Name`s can be constructed
///
/// * through the [`FromStr`] implementation, which requires the text
///   to end with `.`;
/// * through a [`NameBuilder`]; and
/// * from compressed on-the-wire names in DNS messages through
///   [`Name::try_from_compressed`].
///
/// [RFC 1035 § 3.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.1
#[derive(Clone)]
pub struct Name {
    wire_repr: Vec<u8>,
    label_offsets: Vec<u8>,
}

#[allow(clippy::len_without_is_empty)] // A domain name is never empty!
impl Name {
    /// Assembles a `Name` from parts that the caller has already
    /// validated.
    fn from_parts(wire_repr: Vec<u8>, label_offsets: Vec<u8>) -> Self {
        debug_assert_eq!(wire_repr.last(), Some(&0));
        Self {
            wire_repr,
            label_offsets,
        }
    }

    fn label_offsets(&self) -> &[u8] {
        &self.label_offsets
    }

    /// Returns the DNS root, `.`.
    pub fn root() -> Self {
        Self::from_parts(vec![0], vec![0])
    }

    /// Returns whether the `Name` is the DNS root `.`.
    pub fn is_root(&self) -> bool {
        self.len() == 1
    }

    /// Returns the number of labels in this `Name`, including the null
    /// label.
    pub fn len(&self) -> usize {
        self.label_offsets.len()
    }

    /// Returns an iterator over labels in this `Name`.
    pub fn labels(&self) -> Labels {
        Labels::new(&self.wire_repr, &self.label_offsets)
    }

    /// Returns the (uncompressed) on-the-wire representation of the
    /// `Name`.
    pub fn wire_repr(&self) -> &[u8] {
        &self.wire_repr
    }

    /// Returns whether this `Name` is equal to or a subdomain of
    /// `other`.
    pub fn eq_or_subdomain_of(&self, other: &Name) -> bool {
        self.len() >= other.len()
            && self
                .labels()
                .rev()
                .zip(other.labels().rev())
                .all(|(a, b)| a == b)
    }

    /// Returns the superdomain obtained by skipping the first `skip`
    /// labels of the `Name`, or `None` if there aren't enough labels.
    pub fn superdomain(&self, skip: usize) -> Option<Name> {
        if skip < self.len() {
            let start = self.label_offsets[skip];
            let label_offsets = self.label_offsets[skip..]
                .iter()
                .map(|offset| offset - start)
                .collect();
            Some(Self::from_parts(
                self.wire_repr[start as usize..].to_vec(),
                label_offsets,
            ))
        } else {
            None
        }
    }

    /// Expresses this `Name` relative to `origin`.
    ///
    /// * If the `Name` equals `origin`, the empty [`RelativeName`] is
    ///   returned.
    /// * If the `Name` is a proper subdomain of `origin`, the labels in
    ///   front of `origin` are returned; `alpha.dc1.example.com.`
    ///   relative to `example.com.` is `alpha.dc1`.
    /// * Otherwise the `Name` cannot be expressed relative to `origin`,
    ///   and `None` is returned.
    pub fn relativize(&self, origin: &Name) -> Option<RelativeName> {
        if !self.eq_or_subdomain_of(origin) {
            return None;
        }
        let n_labels = self.len() - origin.len();
        if n_labels == 0 {
            Some(RelativeName::empty())
        } else {
            let end = self.label_offsets[n_labels] as usize;
            Some(RelativeName::from_parts(
                self.wire_repr[..end].to_vec(),
                self.label_offsets[..n_labels].to_vec(),
            ))
        }
    }

    /// Returns the subdomain of this `Name` with the single label
    /// `label` in front of it.
    pub fn child(&self, label: &[u8]) -> Result<Name, Error> {
        let mut builder = NameBuilder::new();
        builder.try_push_slice(label)?;
        builder.finish_with_suffix(self)
    }

    /// Tries to parse a compressed name present at index `start` of the
    /// provided buffer. Pointers are followed; indices given in
    /// pointers are treated as indices in `octets`, so generally one
    /// will pass an entire DNS message. On success, the `Name` is
    /// returned together with the number of contiguous octets read at
    /// `start` (that is, the number of octets to skip to reach the next
    /// field of the message).
    pub fn try_from_compressed(octets: &[u8], start: usize) -> Result<(Self, usize), Error> {
        wire::parse_compressed_name(octets, start)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            f.write_str(".")
        } else {
            for (i, label) in self.labels().enumerate() {
                if label.is_null() {
                    f.write_str(".")?;
                } else if i == 0 {
                    label.fmt(f)?;
                } else {
                    write!(f, ".{}", label)?;
                }
            }
            Ok(())
        }
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.labels().zip(other.labels()).all(|(a, b)| a == b)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for label in self.labels() {
            label.hash(state);
        }
    }
}

/// Parses a fully qualified domain name. The text must be strictly
/// ASCII and end with `.`; escape sequences as defined by
/// [RFC 4343 § 2.1] are supported.
///
/// [RFC 4343 § 2.1]: https://datatracker.ietf.org/doc/html/rfc4343#section-2.1
impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "." {
            Ok(Self::root())
        } else {
            parse_str(s)?.finish()
        }
    }
}

////////////////////////////////////////////////////////////////////////
// RELATIVE NAMES                                                     //
////////////////////////////////////////////////////////////////////////

/// A domain name that is not fully qualified: a sequence of non-null
/// labels that still needs an origin to become a [`Name`].
///
/// Unlike a [`Name`], a `RelativeName` may be empty, in which case it
/// denotes the origin itself. The empty `RelativeName` displays as `@`,
/// following the zone file convention.
#[derive(Clone)]
pub struct RelativeName {
    wire_repr: Vec<u8>,
    label_offsets: Vec<u8>,
}

impl RelativeName {
    fn from_parts(wire_repr: Vec<u8>, label_offsets: Vec<u8>) -> Self {
        Self {
            wire_repr,
            label_offsets,
        }
    }

    /// Returns the empty `RelativeName`.
    pub fn empty() -> Self {
        Self::from_parts(Vec::new(), Vec::new())
    }

    /// Returns whether this `RelativeName` has no labels.
    pub fn is_empty(&self) -> bool {
        self.label_offsets.is_empty()
    }

    /// Returns the number of labels in this `RelativeName`.
    pub fn len(&self) -> usize {
        self.label_offsets.len()
    }

    /// Returns an iterator over labels in this `RelativeName`.
    pub fn labels(&self) -> Labels {
        Labels::new(&self.wire_repr, &self.label_offsets)
    }

    /// Appends `origin`, producing a fully qualified [`Name`].
    pub fn join(&self, origin: &Name) -> Result<Name, Error> {
        let base = self.wire_repr.len();
        if base + origin.wire_repr().len() > MAX_WIRE_LEN {
            return Err(Error::NameTooLong);
        }
        let mut wire_repr = Vec::with_capacity(base + origin.wire_repr().len());
        wire_repr.extend_from_slice(&self.wire_repr);
        wire_repr.extend_from_slice(origin.wire_repr());
        let mut label_offsets = self.label_offsets.clone();
        label_offsets.extend(origin.label_offsets().iter().map(|o| o + base as u8));
        Ok(Name::from_parts(wire_repr, label_offsets))
    }
}

impl fmt::Display for RelativeName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut labels = self.labels();
        match labels.next() {
            None => f.write_str("@"),
            Some(first) => {
                first.fmt(f)?;
                for label in labels {
                    write!(f, ".{}", label)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for RelativeName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

impl PartialEq for RelativeName {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.labels().zip(other.labels()).all(|(a, b)| a == b)
    }
}

impl Eq for RelativeName {}

/// Parses a relative domain name. Text ending with `.` is rejected
/// with [`Error::FullyQualified`].
impl FromStr for RelativeName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "." {
            Err(Error::FullyQualified)
        } else {
            parse_str(s)?.finish_relative()
        }
    }
}

////////////////////////////////////////////////////////////////////////
// NAMES AS WRITTEN                                                   //
////////////////////////////////////////////////////////////////////////

/// A domain name as a user or a record wrote it: fully qualified if it
/// ends with `.`, and relative otherwise.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Domain {
    Absolute(Name),
    Relative(RelativeName),
}

impl Domain {
    /// Returns the number of dots that separate labels, as counted by
    /// the `ndots` resolver option.
    pub fn ndots(&self) -> usize {
        match self {
            Self::Absolute(name) => name.len().saturating_sub(1),
            Self::Relative(name) => name.len().saturating_sub(1),
        }
    }
}

impl FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "." {
            return Ok(Self::Absolute(Name::root()));
        }
        let builder = parse_str(s)?;
        if builder.is_fully_qualified() {
            builder.finish().map(Self::Absolute)
        } else {
            builder.finish_relative().map(Self::Relative)
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Absolute(name) => name.fmt(f),
            Self::Relative(name) => name.fmt(f),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ITERATION OVER LABELS                                              //
////////////////////////////////////////////////////////////////////////

/// An iterator over the [`Label`]s of a [`Name`] or [`RelativeName`].
#[derive(Clone, Debug)]
pub struct Labels<'a> {
    wire_repr: &'a [u8],
    label_offsets: &'a [u8],
    front: usize,
    back: usize,
}

impl<'a> Labels<'a> {
    fn new(wire_repr: &'a [u8], label_offsets: &'a [u8]) -> Self {
        Self {
            wire_repr,
            label_offsets,
            front: 0,
            back: label_offsets.len(),
        }
    }

    fn label(&self, index: usize) -> &'a Label {
        let offset = self.label_offsets[index] as usize;
        let len = self.wire_repr[offset] as usize;
        Label::from_unchecked(&self.wire_repr[offset + 1..offset + 1 + len])
    }
}

impl<'a> Iterator for Labels<'a> {
    type Item = &'a Label;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front < self.back {
            self.front += 1;
            Some(self.label(self.front - 1))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.back - self.front;
        (len, Some(len))
    }
}

impl DoubleEndedIterator for Labels<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.back > self.front {
            self.back -= 1;
            Some(self.label(self.back))
        } else {
            None
        }
    }
}

impl ExactSizeIterator for Labels<'_> {}

impl FusedIterator for Labels<'_> {}

////////////////////////////////////////////////////////////////////////
// PARSING OF NAMES FROM RUST STRINGS                                 //
////////////////////////////////////////////////////////////////////////

/// Feeds the text `s` into a new [`NameBuilder`]. The caller decides
/// how the builder is finished.
fn parse_str(s: &str) -> Result<NameBuilder, Error> {
    if s.is_empty() {
        return Err(Error::StrEmpty);
    }

    let mut remaining_octets = s.as_bytes();
    let mut builder = NameBuilder::new();

    // Checking each octet for ASCII suffices: every multi-byte UTF-8
    // character starts with a non-ASCII octet.
    while let Some(&octet) = remaining_octets.first() {
        if octet == b'\\' {
            let (value, consumed) = parse_escape(&remaining_octets[1..])?;
            builder.try_push(value)?;
            remaining_octets = &remaining_octets[consumed + 1..];
        } else if octet == b'.' {
            builder.next_label()?;
            remaining_octets = &remaining_octets[1..];
        } else if !octet.is_ascii() {
            return Err(Error::StrNotAscii);
        } else {
            builder.try_push(octet)?;
            remaining_octets = &remaining_octets[1..];
        }
    }
    Ok(builder)
}

/// Parses an escape sequence. `remaining_octets` starts with the octet
/// immediately *after* the backslash.
fn parse_escape(remaining_octets: &[u8]) -> Result<(u8, usize), Error> {
    match remaining_octets {
        [] => Err(Error::InvalidEscape),
        [d, ..] if d.is_ascii_digit() => {
            let digits = remaining_octets
                .get(0..3)
                .filter(|digits| digits.iter().all(u8::is_ascii_digit))
                .ok_or(Error::InvalidEscape)?;
            let value = digits
                .iter()
                .fold(0usize, |acc, digit| acc * 10 + (digit - b'0') as usize);
            u8::try_from(value)
                .map(|value| (value, 3))
                .or(Err(Error::InvalidEscape))
        }
        [other, ..] => Ok((*other, 1)),
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
