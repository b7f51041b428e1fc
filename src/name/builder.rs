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

//! Implementation of the [`NameBuilder`] structure.

use arrayvec::ArrayVec;

use super::{Error, Name, RelativeName, MAX_LABEL_LEN, MAX_N_LABELS, MAX_WIRE_LEN};

/// A facility to build [`Name`]s and [`RelativeName`]s label by label.
///
/// The `NameBuilder` keeps the on-the-wire representation and the label
/// offsets in fixed-size buffers that can hold any valid name, so
/// invalid input is rejected as soon as it is pushed.
///
/// A new `NameBuilder` starts with a single null label. Octets are added
/// to the current label with [`NameBuilder::try_push`] and
/// [`NameBuilder::try_push_slice`], and [`NameBuilder::next_label`]
/// starts a new label. The result is obtained with one of:
///
/// * [`NameBuilder::finish`], which requires the name to end with the
///   null label;
/// * [`NameBuilder::finish_relative`], which requires that it does not;
///   and
/// * [`NameBuilder::finish_with_suffix`], which completes the name with
///   the labels of another, fully qualified name.
///
/// ```
/// use infradb::name::{Name, NameBuilder};
/// let mut builder = NameBuilder::new();
/// builder.try_push_slice(b"example").unwrap();
/// builder.next_label().unwrap();
/// builder.try_push_slice(b"test").unwrap();
/// builder.next_label().unwrap(); // start the null label
/// assert_eq!(builder.finish().unwrap(), "example.test.".parse().unwrap());
/// ```
pub struct NameBuilder {
    wire_repr: ArrayVec<u8, MAX_WIRE_LEN>,
    label_offsets: ArrayVec<u8, MAX_N_LABELS>,
    label_start: usize,
    label_len: u8,
}

impl NameBuilder {
    /// Constructs a new `NameBuilder`, which initially contains a
    /// single null label.
    pub fn new() -> Self {
        let mut wire_repr = ArrayVec::new();
        wire_repr.push(0);
        let mut label_offsets = ArrayVec::new();
        label_offsets.push(0);
        Self {
            wire_repr,
            label_offsets,
            label_start: 0,
            label_len: 0,
        }
    }

    /// Determines whether the name currently stored in the
    /// `NameBuilder` ends with the null label.
    pub fn is_fully_qualified(&self) -> bool {
        self.label_len == 0
    }

    /// Tries to add the given octet to the current label. In the error
    /// case, the `NameBuilder`'s state remains unchanged.
    pub fn try_push(&mut self, octet: u8) -> Result<(), Error> {
        if self.label_len as usize >= MAX_LABEL_LEN {
            Err(Error::LabelTooLong)
        } else if self.wire_repr.try_push(octet).is_ok() {
            self.label_len += 1;
            Ok(())
        } else {
            Err(Error::NameTooLong)
        }
    }

    /// Tries to add the given octets to the current label. In the error
    /// case, the `NameBuilder`'s state remains unchanged.
    pub fn try_push_slice(&mut self, octets: &[u8]) -> Result<(), Error> {
        if self.label_len as usize + octets.len() > MAX_LABEL_LEN {
            Err(Error::LabelTooLong)
        } else if self.wire_repr.try_extend_from_slice(octets).is_ok() {
            self.label_len += octets.len() as u8;
            Ok(())
        } else {
            Err(Error::NameTooLong)
        }
    }

    /// Writes out the length of the current label.
    fn update_label_len(&mut self) {
        self.wire_repr[self.label_start] = self.label_len;
    }

    /// Finishes the current label and starts a new one. This fails if
    /// the current label is null, since only the last label of a name
    /// may be null, or if the name would become too long.
    pub fn next_label(&mut self) -> Result<(), Error> {
        if self.is_fully_qualified() {
            Err(Error::NullNonTerminal)
        } else if self.wire_repr.is_full() {
            Err(Error::NameTooLong)
        } else {
            self.update_label_len();
            self.label_start = self.wire_repr.len();
            self.label_len = 0;

            // Neither push can fail: wire_repr is not full, and a name
            // short enough for wire_repr has few enough labels.
            self.wire_repr.push(0);
            self.label_offsets.push(self.label_start as u8);
            Ok(())
        }
    }

    /// Finishes the construction of a fully qualified [`Name`].
    pub fn finish(self) -> Result<Name, Error> {
        if self.is_fully_qualified() {
            Ok(Name::from_parts(
                self.wire_repr.to_vec(),
                self.label_offsets.to_vec(),
            ))
        } else {
            Err(Error::NonNullTerminal)
        }
    }

    /// Finishes the construction of a [`RelativeName`]. A builder to
    /// which nothing was pushed produces the empty relative name.
    pub fn finish_relative(mut self) -> Result<RelativeName, Error> {
        if self.is_fully_qualified() {
            if self.wire_repr.len() == 1 {
                Ok(RelativeName::empty())
            } else {
                Err(Error::FullyQualified)
            }
        } else {
            self.update_label_len();
            Ok(RelativeName::from_parts(
                self.wire_repr.to_vec(),
                self.label_offsets.to_vec(),
            ))
        }
    }

    /// Finishes the current label and then appends the labels of
    /// `suffix`, producing a subdomain of `suffix`. This fails if the
    /// current label is null or if the result would be too long.
    pub fn finish_with_suffix(mut self, suffix: &Name) -> Result<Name, Error> {
        if self.is_fully_qualified() {
            return Err(Error::NullNonTerminal);
        }
        self.update_label_len();
        let base = self.wire_repr.len();
        if base + suffix.wire_repr().len() > MAX_WIRE_LEN {
            return Err(Error::NameTooLong);
        }
        self.wire_repr
            .try_extend_from_slice(suffix.wire_repr())
            .or(Err(Error::NameTooLong))?;
        for offset in suffix.label_offsets() {
            self.label_offsets
                .try_push(*offset + base as u8)
                .or(Err(Error::NameTooLong))?;
        }
        Ok(Name::from_parts(
            self.wire_repr.to_vec(),
            self.label_offsets.to_vec(),
        ))
    }
}

impl Default for NameBuilder {
    fn default() -> Self {
        Self::new()
    }
}
