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

//! A blocking stub resolver.
//!
//! The [`StubResolver`] asks the recursive name servers listed in a
//! `resolv.conf` file through [`hickory_resolver`], first over UDP and
//! then, when the UDP answer looks incomplete, over TCP. Name lookups go
//! through the [`Lookup`] trait so that callers can substitute another
//! source of answers.

use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig as ServerConfig};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::lookup::Lookup as RecordLookup;
use hickory_resolver::proto::error::ProtoError;
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::proto::rr::{Name as WireName, RData, Record as WireRecord, RecordType};
use hickory_resolver::proto::serialize::binary::BinEncodable;
use hickory_resolver::{system_conf, Resolver};
use log::{debug, warn};

use crate::name::{self, Label, Name};
use crate::rr::{Rdata, Record, Type};

/// A UDP answer with this many records or more is assumed to have been
/// cut short by the datagram size, and the query is repeated over TCP.
pub const UDP_ANSWER_CEILING: usize = 20;

/// The standard DNS port.
pub const DNS_PORT: u16 = 53;

/// What a missing `resolv.conf` amounts to.
const DEFAULT_RESOLV_CONF: &str = "nameserver 127.0.0.1\n";

////////////////////////////////////////////////////////////////////////
// ANSWERS AND THE LOOKUP TRAIT                                       //
////////////////////////////////////////////////////////////////////////

/// The positive answer to a query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Answer {
    /// The name that was asked about.
    pub qname: Name,

    /// The answer records of the requested type, in message order.
    /// Their owners differ from `qname` when aliases were followed.
    pub records: Vec<Record>,
}

impl Answer {
    /// Iterates over the `<character-string>`s of all TXT records.
    pub fn txt_strings(&self) -> impl Iterator<Item = &[u8]> {
        self.records
            .iter()
            .filter_map(|record| match &record.rdata {
                Rdata::Txt(strings) => Some(strings),
                _ => None,
            })
            .flatten()
            .map(Vec::as_slice)
    }
}

/// A source of DNS answers.
pub trait Lookup {
    /// Looks up records of type `qtype` at `qname`. `Ok(None)` means
    /// that the name does not exist or has no records of that type.
    fn lookup(&self, qname: &Name, qtype: Type) -> Result<Option<Answer>, Error>;
}

impl<L: Lookup + ?Sized> Lookup for &L {
    fn lookup(&self, qname: &Name, qtype: Type) -> Result<Option<Answer>, Error> {
        (**self).lookup(qname, qtype)
    }
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION                                                      //
////////////////////////////////////////////////////////////////////////

/// Where the [`StubResolver`] gets its settings from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolverConfig {
    /// The `resolv.conf` file to read.
    pub resolv_conf: PathBuf,

    /// A port to use instead of 53 when talking to name servers.
    pub port: Option<u16>,
}

impl ResolverConfig {
    /// The environment variable naming an alternate `resolv.conf`.
    pub const RESOLV_CONF_VAR: &'static str = "RUG_RESOLV_CONF";

    /// The environment variable giving an alternate name server port.
    pub const PORT_VAR: &'static str = "RUG_RESOLV_PORT";

    /// Builds the configuration from the environment, falling back to
    /// [`ResolverConfig::default`] for anything unset. An unparseable
    /// port is logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(path) = env::var_os(Self::RESOLV_CONF_VAR) {
            config.resolv_conf = path.into();
        }
        if let Ok(port) = env::var(Self::PORT_VAR) {
            match port.parse() {
                Ok(port) => config.port = Some(port),
                Err(_) => warn!("ignoring invalid {} value {:?}", Self::PORT_VAR, port),
            }
        }
        config
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            port: None,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// STUB RESOLVER                                                      //
////////////////////////////////////////////////////////////////////////

/// A blocking stub resolver. See the [module documentation](self).
pub struct StubResolver {
    udp: Resolver,
    tcp: Resolver,
    search: Vec<Name>,
    ndots: usize,
}

impl StubResolver {
    /// Creates a `StubResolver` from a [`ResolverConfig`], reading the
    /// `resolv.conf` file it names. A missing file means a single name
    /// server on the loopback interface.
    pub fn new(config: &ResolverConfig) -> Result<Self, Error> {
        let data = match fs::read(&config.resolv_conf) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(
                    "{} does not exist; using the local name server",
                    config.resolv_conf.display()
                );
                DEFAULT_RESOLV_CONF.as_bytes().to_vec()
            }
            Err(e) => return Err(Error::Io(e)),
        };
        Self::from_resolv_conf(&data, config.port.unwrap_or(DNS_PORT))
    }

    /// Creates a `StubResolver` from the contents of a `resolv.conf`
    /// file. The name servers it lists are contacted on `port`.
    pub fn from_resolv_conf(data: &[u8], port: u16) -> Result<Self, Error> {
        let (conf, mut opts) = system_conf::parse_resolv_conf(data).map_err(Error::Resolve)?;
        opts.use_hosts_file = false;
        opts.edns0 = false;
        opts.num_concurrent_reqs = 1;

        // As in glibc, a search list overrides the domain.
        let domains: Vec<&WireName> = if conf.search().is_empty() {
            conf.domain().into_iter().collect()
        } else {
            conf.search().iter().collect()
        };
        let mut search = Vec::new();
        for domain in domains {
            match from_wire_name(domain) {
                Ok(name) if !search.contains(&name) => search.push(name),
                Ok(_) => (),
                Err(e) => warn!("ignoring search domain {}: {}", domain, e),
            }
        }

        Ok(Self {
            udp: Resolver::new(over(&conf, port, Protocol::Udp), opts.clone()).map_err(Error::Io)?,
            tcp: Resolver::new(over(&conf, port, Protocol::Tcp), opts.clone()).map_err(Error::Io)?,
            search,
            ndots: opts.ndots,
        })
    }

    /// Returns the default domain: the first entry of the search list.
    pub fn default_domain(&self) -> Option<&Name> {
        self.search.first()
    }

    /// Returns the search list, or the `domain` entry if there is none.
    pub fn search(&self) -> &[Name] {
        &self.search
    }

    /// Returns the `ndots` option.
    pub fn ndots(&self) -> usize {
        self.ndots
    }
}

/// Builds a hickory configuration that reaches each name server listed
/// in `conf` on `port` through `protocol` only.
fn over(conf: &ServerConfig, port: u16, protocol: Protocol) -> ServerConfig {
    let mut addresses: Vec<_> = conf
        .name_servers()
        .iter()
        .map(|server| server.socket_addr.ip())
        .collect();
    addresses.dedup();

    let mut result = ServerConfig::new();
    for address in addresses {
        result.add_name_server(NameServerConfig {
            socket_addr: SocketAddr::new(address, port),
            protocol,
            tls_dns_name: None,
            trust_negative_responses: true,
            bind_addr: None,
        });
    }
    result
}

impl Lookup for StubResolver {
    fn lookup(&self, qname: &Name, qtype: Type) -> Result<Option<Answer>, Error> {
        let name = to_wire_name(qname)?;
        let record_type = RecordType::from(u16::from(qtype));
        debug!("looking up {} {}", qname, qtype);

        let udp = answer_records(self.udp.lookup(name.clone(), record_type), record_type);
        let needs_tcp = match &udp {
            Ok(Some(records)) => records.is_empty() || records.len() >= UDP_ANSWER_CEILING,
            Ok(None) => false,
            Err(e) => {
                debug!("UDP query for {} {} failed: {}", qname, qtype, e);
                true
            }
        };

        let records = if needs_tcp {
            debug!("repeating query for {} {} over TCP", qname, qtype);
            let tcp = answer_records(self.tcp.lookup(name, record_type), record_type);
            match (tcp, udp) {
                (Ok(records), _) => records,
                (Err(e), Ok(records)) => {
                    debug!("TCP query for {} {} failed: {}", qname, qtype, e);
                    records
                }
                (Err(e), Err(_)) => return Err(e),
            }
        } else {
            udp?
        };

        Ok(records
            .filter(|records| !records.is_empty())
            .map(|records| Answer {
                qname: qname.clone(),
                records,
            }))
    }
}

/// Sorts the outcome of a hickory lookup. `Ok(None)` is a nonexistent
/// name; an empty list means that the name exists but has no records of
/// `record_type`.
fn answer_records(
    result: Result<RecordLookup, ResolveError>,
    record_type: RecordType,
) -> Result<Option<Vec<Record>>, Error> {
    let err = match result {
        Ok(lookup) => {
            return Ok(Some(
                lookup
                    .records()
                    .iter()
                    .filter(|record| record.record_type() == record_type)
                    .filter_map(convert_record)
                    .collect(),
            ))
        }
        Err(err) => err,
    };
    let response_code = match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => Some(*response_code),
        _ => None,
    };
    match response_code {
        Some(ResponseCode::NXDomain) => Ok(None),
        Some(ResponseCode::NoError) => Ok(Some(Vec::new())),
        _ => Err(Error::Resolve(err)),
    }
}

/// Converts a hickory record into a [`Record`]. Records of types that
/// [`Rdata`] does not represent are skipped.
fn convert_record(record: &WireRecord) -> Option<Record> {
    let rdata = match record.data()? {
        RData::A(address) => Rdata::A(address.0),
        RData::NS(ns) => Rdata::Ns(from_wire_name(&ns.0).ok()?),
        RData::CNAME(cname) => Rdata::Cname(from_wire_name(&cname.0).ok()?),
        RData::HINFO(hinfo) => Rdata::Hinfo {
            cpu: hinfo.cpu().to_vec(),
            os: hinfo.os().to_vec(),
        },
        RData::TXT(txt) => Rdata::Txt(txt.txt_data().iter().map(|s| s.to_vec()).collect()),
        _ => return None,
    };
    match from_wire_name(record.name()) {
        Ok(owner) => Some(Record::new(owner, rdata)),
        Err(e) => {
            debug!("skipping record owned by {}: {}", record.name(), e);
            None
        }
    }
}

fn to_wire_name(name: &Name) -> Result<WireName, Error> {
    let labels = name.labels().filter(|label| !label.is_null()).map(Label::octets);
    WireName::from_labels(labels).map_err(Error::from)
}

/// Converts a hickory name by way of its uncompressed wire form.
fn from_wire_name(name: &WireName) -> Result<Name, Error> {
    let octets = name.to_bytes()?;
    let (name, _) = Name::try_from_compressed(&octets, 0)?;
    Ok(name)
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a lookup could not be completed.
#[derive(Debug)]
pub enum Error {
    /// The resolver configuration could not be read.
    Io(io::Error),

    /// No name server gave a definitive response.
    Resolve(ResolveError),

    /// A name could not be carried between the resolver and this crate.
    InvalidName(name::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "could not read resolver configuration: {}", err),
            Self::Resolve(err) => write!(f, "no name server could answer the query: {}", err),
            Self::InvalidName(err) => write!(f, "unusable domain name: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Resolve(err) => Some(err),
            Self::InvalidName(err) => Some(err),
        }
    }
}

impl From<ProtoError> for Error {
    fn from(err: ProtoError) -> Self {
        Self::Resolve(err.into())
    }
}

impl From<name::Error> for Error {
    fn from(err: name::Error) -> Self {
        Self::InvalidName(err)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
