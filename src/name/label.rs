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

//! Implementation of the [`Label`] type.

use std::fmt;
use std::hash::{Hash, Hasher};

use super::{Error, MAX_LABEL_LEN};

/// A single label of a domain name.
///
/// `Label` is a wrapper over `[u8]` that can only be constructed if the
/// slice is no more than 63 octets long. Following [RFC 1034 § 3.1],
/// comparisons are ASCII-case-insensitive while the original case is
/// preserved.
///
/// [RFC 1034 § 3.1]: https://datatracker.ietf.org/doc/html/rfc1034#section-3.1
#[repr(transparent)]
pub struct Label {
    octets: [u8],
}

#[allow(clippy::len_without_is_empty)] // Following DNS terminology, we have is_null().
impl Label {
    /// Wraps up a `&[u8]` as a `Label` without checking its length. For
    /// use within the parent module only, after checking the length.
    pub(super) fn from_unchecked(octets: &[u8]) -> &Self {
        // SAFETY: Label is a repr(transparent) wrapper over [u8].
        unsafe { &*(octets as *const [u8] as *const Label) }
    }

    /// Tries to wrap up `octets` as a `Label`.
    pub fn new(octets: &[u8]) -> Result<&Self, Error> {
        if octets.len() > MAX_LABEL_LEN {
            Err(Error::LabelTooLong)
        } else {
            Ok(Self::from_unchecked(octets))
        }
    }

    /// Returns whether this `Label` is the null (zero-length) label.
    pub fn is_null(&self) -> bool {
        self.octets.is_empty()
    }

    /// Returns the number of octets in this `Label`.
    pub fn len(&self) -> usize {
        self.octets.len()
    }

    /// Returns the octets of this `Label`.
    pub fn octets(&self) -> &[u8] {
        &self.octets
    }
}

/// Labels are displayed with the escaping of [RFC 4343 § 2.1]: periods
/// and backslashes are backslash-escaped, other ASCII graphic
/// characters are written as they are, and all other octets become
/// `\DDD` decimal escapes.
///
/// [RFC 4343 § 2.1]: https://datatracker.ietf.org/doc/html/rfc4343#section-2.1
impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &octet in self.octets() {
            match octet {
                b'.' => f.write_str("\\.")?,
                b'\\' => f.write_str("\\\\")?,
                o if o.is_ascii_graphic() => write!(f, "{}", o as char)?,
                o => write!(f, "\\{:03}", o)?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "\"{}\"", self)
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.octets.eq_ignore_ascii_case(&other.octets)
    }
}

impl Eq for Label {}

impl Hash for Label {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Case-insensitive, to agree with PartialEq.
        state.write_usize(self.octets.len());
        for octet in self.octets.iter() {
            state.write_u8(octet.to_ascii_lowercase());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_ignores_case() {
        assert_eq!(Label::new(b"Example").unwrap(), Label::new(b"eXAMPLE").unwrap());
        assert_ne!(Label::new(b"example").unwrap(), Label::new(b"examples").unwrap());
    }

    #[test]
    fn display_escapes() {
        let label = Label::new(b"a.b\\c\x00").unwrap();
        assert_eq!(label.to_string(), "a\\.b\\\\c\\000");
    }

    #[test]
    fn rejects_long_label() {
        assert_eq!(Label::new(&[b'x'; 64]).unwrap_err(), Error::LabelTooLong);
    }
}
