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

//! Crate-private utilities.

/// A wrapper around [`str`] references whose [`PartialEq`] and [`Eq`]
/// implementations are ASCII-case-insensitive.
pub struct Caseless<'a>(pub &'a str);

impl PartialEq for Caseless<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(other.0)
    }
}

impl Eq for Caseless<'_> {}

/// Parses the generic [RFC 3597 § 5] form of a 16-bit code, such as
/// `TYPE65280` or `CLASS1`. Returns `None` if `text` does not start
/// with `prefix` (compared case-insensitively).
///
/// [RFC 3597 § 5]: https://datatracker.ietf.org/doc/html/rfc3597#section-5
pub fn parse_generic_code(text: &str, prefix: &str) -> Option<Result<u16, &'static str>> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(
            text[prefix.len()..]
                .parse()
                .or(Err("value is not a valid unsigned 16-bit integer")),
        )
    } else {
        None
    }
}

/// Defines a newtype over [`u16`] for a DNS code space such as RR
/// types, with constants for the named codes and mnemonic-aware
/// [`Display`](std::fmt::Display) and [`FromStr`](std::str::FromStr)
/// implementations. Codes without a mnemonic use the RFC 3597 generic
/// form `<PREFIX><value>`.
macro_rules! mnemonic_code {
    (
        $(#[$attr:meta])*
        pub struct $ty:ident, prefix $prefix:literal {
            $($mnemonic:ident = $value:literal,)*
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, Eq, Hash, PartialEq, PartialOrd, Ord)]
        pub struct $ty(u16);

        impl $ty {
            $(pub const $mnemonic: Self = Self($value);)*
        }

        impl From<u16> for $ty {
            fn from(value: u16) -> Self {
                Self(value)
            }
        }

        impl From<$ty> for u16 {
            fn from(code: $ty) -> Self {
                code.0
            }
        }

        impl std::str::FromStr for $ty {
            type Err = &'static str;

            fn from_str(text: &str) -> Result<Self, Self::Err> {
                use $crate::util::{parse_generic_code, Caseless};
                $(
                    if Caseless(text) == Caseless(stringify!($mnemonic)) {
                        return Ok(Self::$mnemonic);
                    }
                )*
                match parse_generic_code(text, $prefix) {
                    Some(result) => result.map(Self),
                    None => Err(concat!("unknown ", $prefix, " mnemonic")),
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                match *self {
                    $(Self::$mnemonic => f.write_str(stringify!($mnemonic)),)*
                    Self(value) => write!(f, "{}{}", $prefix, value),
                }
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                std::fmt::Display::fmt(self, f)
            }
        }
    };
}

pub(crate) use mnemonic_code;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caseless_works() {
        assert!(Caseless("hInFo") == Caseless("HINFO"));
        assert!(Caseless("TXT") != Caseless("TXT2"));
    }

    #[test]
    fn parse_generic_code_works() {
        assert_eq!(parse_generic_code("type65280", "TYPE"), Some(Ok(65280)));
        assert_eq!(parse_generic_code("CLASS1", "TYPE"), None);
        assert!(matches!(parse_generic_code("TYPE70000", "TYPE"), Some(Err(_))));
        assert_eq!(parse_generic_code("TY", "TYPE"), None);
    }
}
