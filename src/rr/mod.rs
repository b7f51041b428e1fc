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

//! Data structures for the resource records that infrastructure lookups
//! read.

use std::net::Ipv4Addr;

use crate::name::Name;

mod rr_type;
pub use rr_type::Type;

/// A single resource record from the answer to a query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    pub owner: Name,
    pub rdata: Rdata,
}

impl Record {
    pub fn new(owner: Name, rdata: Rdata) -> Self {
        Self { owner, rdata }
    }

    /// Returns the RR type of the record.
    pub fn rr_type(&self) -> Type {
        self.rdata.rr_type()
    }
}

/// The decoded RDATA of a record. Only the types that the naming
/// hierarchy is stored in are represented.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Rdata {
    /// An IN-class host address ([RFC 1035 § 3.4.1]).
    ///
    /// [RFC 1035 § 3.4.1]: https://datatracker.ietf.org/doc/html/rfc1035#section-3.4.1
    A(Ipv4Addr),

    /// An authoritative name server.
    Ns(Name),

    /// The canonical name for an alias.
    Cname(Name),

    /// Host information: a CPU and an OS `<character-string>`.
    Hinfo { cpu: Vec<u8>, os: Vec<u8> },

    /// One or more `<character-string>`s.
    Txt(Vec<Vec<u8>>),
}

impl Rdata {
    /// Returns the RR type whose format this `Rdata` has.
    pub fn rr_type(&self) -> Type {
        match self {
            Self::A(_) => Type::A,
            Self::Ns(_) => Type::NS,
            Self::Cname(_) => Type::CNAME,
            Self::Hinfo { .. } => Type::HINFO,
            Self::Txt(_) => Type::TXT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_follows_rdata() {
        let owner: Name = "alpha.example.test.".parse().unwrap();
        let record = Record::new(owner.clone(), Rdata::A(Ipv4Addr::new(192, 0, 2, 10)));
        assert_eq!(record.rr_type(), Type::A);
        let hinfo = Rdata::Hinfo {
            cpu: b"PowerEdge".to_vec(),
            os: b"Debian 12".to_vec(),
        };
        assert_eq!(Record::new(owner, hinfo).rr_type(), Type::HINFO);
    }
}
