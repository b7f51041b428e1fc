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

//! The DNS driver.
//!
//! The naming hierarchy lives in ordinary records below a root domain:
//!
//! * `A <host>` marks a host and gives its canonical name;
//! * `HINFO <host>` gives its hardware and OS tags;
//! * `TXT _service.<host>` lists the services a host belongs to;
//! * `TXT _host.<service>` lists the hosts bound directly to a service;
//! * `TXT _service.<service>` lists its sub-services; and
//! * `TXT _service._services[.<subdomain>]` lists the declared services.
//!
//! TXT records hold whitespace-separated name references. A reference
//! is relative to the domain two labels above the record's name (the
//! domain of the host or service it was found under), and the driver
//! rewrites it relative to the root. A `webserver` reference found at
//! `_service.alpha.dc1.example.com.` with root `example.com.` thus
//! becomes `webserver.dc1`.

use log::debug;

use super::driver::{Driver, HostRecord, ServiceRecord};
use super::Error;
use crate::name::{Domain, Name};
use crate::resolver::{Answer, Lookup, ResolverConfig, StubResolver};
use crate::rr::{Rdata, Type};

/// Settings for a [`DnsDriver`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DnsConfig {
    /// The root of the naming hierarchy. If unset, it is discovered
    /// from the resolver's default domain.
    pub root: Option<Name>,

    pub resolver: ResolverConfig,
}

/// A [`Driver`] that reads the naming hierarchy from the DNS through a
/// [`Lookup`].
#[derive(Debug)]
pub struct DnsDriver<L = StubResolver> {
    lookup: L,
    root: Option<Name>,
    search: Vec<Name>,
    ndots: usize,
}

impl DnsDriver {
    /// Creates a driver using a [`StubResolver`].
    pub fn new(config: DnsConfig) -> Result<Self, Error> {
        let resolver = StubResolver::new(&config.resolver)?;
        let root = match config.root {
            Some(root) => Some(root),
            None => resolver
                .default_domain()
                .and_then(|domain| discover_root(&resolver, domain)),
        };
        let search = resolver.search().to_vec();
        let ndots = resolver.ndots();
        Ok(Self::with_lookup(resolver, root, search, ndots))
    }
}

/// Walks up from `domain` to the first name with NS records, not
/// counting the DNS root.
fn discover_root(lookup: &impl Lookup, domain: &Name) -> Option<Name> {
    for skip in 0..domain.len().saturating_sub(1) {
        let candidate = domain.superdomain(skip)?;
        match lookup.lookup(&candidate, Type::NS) {
            Ok(Some(_)) => {
                debug!("discovered infradb root {}", candidate);
                return Some(candidate);
            }
            Ok(None) => continue,
            Err(e) => {
                debug!("root discovery from {} failed: {}", domain, e);
                return None;
            }
        }
    }
    debug!("no infradb root found above {}; names stay absolute", domain);
    None
}

impl<L: Lookup> DnsDriver<L> {
    /// Creates a driver over an arbitrary [`Lookup`]. Relative names are
    /// tried against `root` and then `search`; names with at least
    /// `ndots` dots are tried as absolute names first.
    pub fn with_lookup(lookup: L, root: Option<Name>, search: Vec<Name>, ndots: usize) -> Self {
        Self {
            lookup,
            root,
            search,
            ndots,
        }
    }

    /// Returns the root domain, if one is known.
    pub fn root(&self) -> Option<&Name> {
        self.root.as_ref()
    }

    /// Lists the absolute names to try for `domain`, in order.
    fn candidates(&self, domain: Domain) -> Vec<Name> {
        let absolute_first = domain.ndots() >= self.ndots;
        let relative = match domain {
            Domain::Absolute(name) => return vec![name],
            Domain::Relative(relative) => relative,
        };

        let mut candidates = Vec::new();
        let absolute = relative.join(&Name::root()).ok();
        if absolute_first {
            candidates.extend(absolute.clone());
        }
        for suffix in self.root.iter().chain(&self.search) {
            if let Ok(name) = relative.join(suffix) {
                if !candidates.contains(&name) {
                    candidates.push(name);
                }
            }
        }
        if !absolute_first {
            if let Some(absolute) = absolute {
                if !candidates.contains(&absolute) {
                    candidates.push(absolute);
                }
            }
        }
        candidates
    }

    /// Looks up `text` using the search rules. Names that cannot be
    /// parsed are treated as nonexistent. A failed lookup moves on to
    /// the next candidate; its error is returned only if no candidate
    /// answered.
    fn query(&self, text: &str, qtype: Type) -> Result<Option<Answer>, Error> {
        let domain: Domain = match text.parse() {
            Ok(domain) => domain,
            Err(e) => {
                debug!("not looking up unusable name {:?}: {}", text, e);
                return Ok(None);
            }
        };
        let mut failure = None;
        for candidate in self.candidates(domain) {
            debug!("querying {} {}", candidate, qtype);
            match self.lookup.lookup(&candidate, qtype) {
                Ok(Some(answer)) => return Ok(Some(answer)),
                Ok(None) => (),
                Err(e) => {
                    debug!("lookup of {} {} failed: {}", candidate, qtype, e);
                    failure = Some(e);
                }
            }
        }
        match failure {
            Some(e) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Reads the name references from the TXT records at `text`.
    fn txt_names(&self, text: &str) -> Result<Option<Vec<String>>, Error> {
        Ok(self
            .query(text, Type::TXT)?
            .map(|answer| self.qualified_names(&answer)))
    }

    /// Splits an answer's TXT strings into name references and
    /// qualifies each relative to the root.
    fn qualified_names(&self, answer: &Answer) -> Vec<String> {
        let suffix = answer
            .qname
            .superdomain(2)
            .and_then(|owner| self.qualifier(&owner));
        answer
            .txt_strings()
            .flat_map(|string| string.split(u8::is_ascii_whitespace))
            .filter(|token| !token.is_empty())
            .map(|token| {
                let token = String::from_utf8_lossy(token);
                match &suffix {
                    Some(suffix) if !token.ends_with('.') => format!("{}.{}", token, suffix),
                    _ => token.into_owned(),
                }
            })
            .collect()
    }

    /// Returns what to append to a reference found under `owner`:
    /// nothing at the root itself, the relative path below the root, or
    /// the absolute owner elsewhere.
    fn qualifier(&self, owner: &Name) -> Option<String> {
        match self.root.as_ref().and_then(|root| owner.relativize(root)) {
            Some(relative) if relative.is_empty() => None,
            Some(relative) => Some(relative.to_string()),
            None if owner.is_root() => Some(String::new()),
            None => Some(owner.to_string()),
        }
    }
}

impl<L: Lookup> Driver for DnsDriver<L> {
    fn lookup_host(&self, name: &str) -> Result<Option<HostRecord>, Error> {
        debug!("looking up host {} in the DNS", name);
        let answer = match self.query(name, Type::A)? {
            Some(answer) => answer,
            None => return Ok(None),
        };
        // Aliases have been followed, so the A record's owner is the
        // canonical name.
        let canonical = match answer.records.first() {
            Some(record) => record.owner.clone(),
            None => return Ok(None),
        };

        let (hardware, os) = match self.lookup.lookup(&canonical, Type::HINFO)? {
            Some(hinfo) => hinfo
                .records
                .iter()
                .find_map(|record| match &record.rdata {
                    Rdata::Hinfo { cpu, os } => Some((
                        Some(String::from_utf8_lossy(cpu).into_owned()),
                        Some(String::from_utf8_lossy(os).into_owned()),
                    )),
                    _ => None,
                })
                .unwrap_or_default(),
            None => (None, None),
        };

        let services = match canonical.child(b"_service") {
            Ok(qname) => match self.lookup.lookup(&qname, Type::TXT)? {
                Some(answer) => self.qualified_names(&answer),
                None => Vec::new(),
            },
            Err(e) => {
                debug!("no _service name under {}: {}", canonical, e);
                Vec::new()
            }
        };

        Ok(Some(HostRecord {
            name: name.to_owned(),
            fqdn: canonical.to_string().trim_end_matches('.').to_owned(),
            hardware,
            os,
            services,
        }))
    }

    fn lookup_service(&self, name: &str) -> Result<Option<ServiceRecord>, Error> {
        debug!("looking up service {} in the DNS", name);
        let hosts = self.txt_names(&format!("_host.{}", name))?;
        let services = self.txt_names(&format!("_service.{}", name))?;
        if hosts.is_none() && services.is_none() {
            return Ok(None);
        }
        Ok(Some(ServiceRecord {
            name: name.to_owned(),
            hosts: hosts.unwrap_or_default(),
            services: services.unwrap_or_default(),
        }))
    }

    fn list_services(&self, subdomain: Option<&str>) -> Result<Vec<String>, Error> {
        let text = match subdomain {
            Some(subdomain) => format!("_service._services.{}", subdomain),
            None => "_service._services".to_owned(),
        };
        Ok(self.txt_names(&text)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    use hickory_resolver::error::ResolveError;

    use super::*;
    use crate::infra::InfraDb;
    use crate::resolver;
    use crate::rr::Record;

    fn n(text: &str) -> Name {
        text.parse().unwrap()
    }

    /// An in-memory zone answering the way a resolver would.
    #[derive(Debug, Default)]
    struct Zone(HashMap<(Name, Type), Vec<Rdata>>);

    impl Zone {
        fn add(&mut self, owner: &str, rdata: Rdata) -> &mut Self {
            let rr_type = rdata.rr_type();
            self.0.entry((n(owner), rr_type)).or_default().push(rdata);
            self
        }

        fn host(&mut self, owner: &str) -> &mut Self {
            self.add(owner, Rdata::A(Ipv4Addr::new(192, 0, 2, 1)))
        }

        fn txt(&mut self, owner: &str, strings: &[&str]) -> &mut Self {
            let strings = strings.iter().map(|s| s.as_bytes().to_vec()).collect();
            self.add(owner, Rdata::Txt(strings))
        }
    }

    impl Lookup for Zone {
        fn lookup(&self, qname: &Name, qtype: Type) -> Result<Option<Answer>, resolver::Error> {
            let mut owner = qname.clone();
            while let Some(Rdata::Cname(target)) = self
                .0
                .get(&(owner.clone(), Type::CNAME))
                .and_then(|rdatas| rdatas.first())
            {
                owner = target.clone();
            }
            Ok(self.0.get(&(owner.clone(), qtype)).map(|rdatas| Answer {
                qname: qname.clone(),
                records: rdatas
                    .iter()
                    .map(|rdata| Record::new(owner.clone(), rdata.clone()))
                    .collect(),
            }))
        }
    }

    fn zone() -> Zone {
        let mut zone = Zone::default();
        zone.host("alpha.dc1.example.com.")
            .add(
                "alpha.dc1.example.com.",
                Rdata::Hinfo {
                    cpu: b"PowerEdge".to_vec(),
                    os: b"Debian 12".to_vec(),
                },
            )
            .txt("_service.alpha.dc1.example.com.", &["webserver mailserver"])
            .host("bravo.dc1.example.com.")
            .add("www.dc1.example.com.", Rdata::Cname(n("alpha.dc1.example.com.")))
            .host("charlie.dc2.example.com.")
            .txt("_service.webserver.example.com.", &["webserver.dc1", "webserver.dc2"])
            .txt("_host.webserver.dc1.example.com.", &["alpha  primary:bravo"])
            .txt("_host.webserver.dc2.example.com.", &["charlie"])
            .txt("_host.mailserver.dc1.example.com.", &["alpha"])
            .txt("_host.partner.example.com.", &["gw.example.net."])
            .txt("_host.mirror.example.org.", &["ftp"])
            .txt("_host.loop.example.com.", &["alpha.dc1"])
            .txt("_service.loop.example.com.", &["loop.inner"])
            .txt("_service.loop.inner.example.com.", &["loop.example.com."])
            .txt("_service._services.example.com.", &["webserver loop partner"])
            .txt("_service._services.dc1.example.com.", &["webserver mailserver"]);
        zone
    }

    fn driver() -> DnsDriver<Zone> {
        DnsDriver::with_lookup(zone(), Some(n("example.com.")), vec![n("example.com.")], 1)
    }

    #[test]
    fn lookup_host_works() {
        let host = driver().lookup_host("alpha.dc1").unwrap().unwrap();
        assert_eq!(host.name, "alpha.dc1");
        assert_eq!(host.fqdn, "alpha.dc1.example.com");
        assert_eq!(host.hardware.as_deref(), Some("PowerEdge"));
        assert_eq!(host.os.as_deref(), Some("Debian 12"));
        assert_eq!(host.services, ["webserver.dc1", "mailserver.dc1"]);
    }

    #[test]
    fn lookup_host_follows_aliases() {
        let host = driver().lookup_host("www.dc1").unwrap().unwrap();
        assert_eq!(host.name, "www.dc1");
        assert_eq!(host.fqdn, "alpha.dc1.example.com");
        let bare = driver().lookup_host("bravo.dc1.example.com.").unwrap().unwrap();
        assert_eq!(bare.hardware, None);
        assert!(bare.services.is_empty());
    }

    #[test]
    fn unusable_names_are_not_found() {
        let driver = driver();
        assert_eq!(driver.lookup_host("a..b").unwrap(), None);
        assert_eq!(driver.lookup_host(&"x".repeat(64)).unwrap(), None);
        assert_eq!(driver.lookup_service("naïve").unwrap(), None);
    }

    #[test]
    fn candidates_follow_ndots() {
        let driver = driver();
        let names = |text: &str| driver.candidates(text.parse().unwrap());
        assert_eq!(names("alpha"), [n("alpha.example.com."), n("alpha.")]);
        assert_eq!(names("alpha.dc1"), [n("alpha.dc1."), n("alpha.dc1.example.com.")]);
        assert_eq!(names("alpha.dc1.example.com."), [n("alpha.dc1.example.com.")]);
    }

    #[test]
    fn references_are_relativized_to_the_root() {
        let record = driver().lookup_service("webserver.dc1").unwrap().unwrap();
        assert_eq!(record.hosts, ["alpha.dc1", "primary:bravo.dc1"]);
        assert!(record.services.is_empty());

        let record = driver().lookup_service("webserver").unwrap().unwrap();
        assert_eq!(record.services, ["webserver.dc1", "webserver.dc2"]);
    }

    #[test]
    fn references_at_the_root_are_unqualified() {
        let driver = DnsDriver::with_lookup(zone(), Some(n("dc1.example.com.")), vec![], 1);
        let record = driver.lookup_service("webserver").unwrap().unwrap();
        assert_eq!(record.hosts, ["alpha", "primary:bravo"]);
    }

    #[test]
    fn references_outside_the_root_stay_absolute() {
        let driver = driver();
        let partner = driver.lookup_service("partner").unwrap().unwrap();
        assert_eq!(partner.hosts, ["gw.example.net."]);
        let mirror = driver.lookup_service("mirror.example.org.").unwrap().unwrap();
        assert_eq!(mirror.hosts, ["ftp.example.org."]);
    }

    #[test]
    fn without_a_root_references_are_absolute() {
        let driver = DnsDriver::with_lookup(zone(), None, vec![n("example.com.")], 1);
        let record = driver.lookup_service("webserver.dc1").unwrap().unwrap();
        assert_eq!(record.hosts, ["alpha.dc1.example.com.", "primary:bravo.dc1.example.com."]);
    }

    #[test]
    fn missing_service_is_absent() {
        assert_eq!(driver().lookup_service("nothing").unwrap(), None);
        assert!(driver().resolve_service("nothing").unwrap().is_empty());
    }

    #[test]
    fn resolve_service_expands_sub_services() {
        assert_eq!(
            driver().resolve_service("webserver").unwrap(),
            ["alpha.dc1", "primary:bravo.dc1", "charlie.dc2"]
        );
    }

    #[test]
    fn resolve_service_terminates_on_cycles() {
        assert_eq!(
            driver().resolve_service("loop").unwrap(),
            ["alpha.dc1", "alpha.dc1"]
        );
    }

    #[test]
    fn list_services_works() {
        let driver = driver();
        assert_eq!(
            driver.list_services(None).unwrap(),
            ["webserver", "loop", "partner"]
        );
        assert_eq!(
            driver.list_services(Some("dc1")).unwrap(),
            ["webserver.dc1", "mailserver.dc1"]
        );
        assert!(driver.list_services(Some("dc9")).unwrap().is_empty());
    }

    #[test]
    fn discover_root_walks_up_to_a_zone() {
        let mut zone = zone();
        zone.add("example.com.", Rdata::Ns(n("ns.example.com.")));
        assert_eq!(
            discover_root(&zone, &n("dc1.example.com.")),
            Some(n("example.com."))
        );
        assert_eq!(discover_root(&zone, &n("example.org.")), None);
    }

    #[test]
    fn facade_over_dns() {
        let db = InfraDb::with_driver(driver());
        let hosts: Vec<String> = db
            .hosts(&["www.dc1", "webserver"])
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(hosts, ["www.dc1", "primary:bravo.dc1", "charlie.dc2"]);
        assert_eq!(db.hosts(&["loop"]).unwrap().len(), 1);
        assert_eq!(
            db.host("nothing").unwrap_err().to_string(),
            "could not locate host 'nothing'"
        );
    }

    fn unreachable() -> resolver::Error {
        resolver::Error::Resolve(ResolveError::from("no connections available"))
    }

    struct Unreachable;

    impl Lookup for Unreachable {
        fn lookup(&self, _: &Name, _: Type) -> Result<Option<Answer>, resolver::Error> {
            Err(unreachable())
        }
    }

    /// A zone whose name servers for `dc1.` cannot be reached.
    struct Dc1Unreachable(Zone);

    impl Lookup for Dc1Unreachable {
        fn lookup(&self, qname: &Name, qtype: Type) -> Result<Option<Answer>, resolver::Error> {
            if qname.eq_or_subdomain_of(&n("dc1.")) {
                Err(unreachable())
            } else {
                self.0.lookup(qname, qtype)
            }
        }
    }

    #[test]
    fn failed_candidates_fall_through() {
        let lookup = Dc1Unreachable(zone());
        let driver = DnsDriver::with_lookup(lookup, Some(n("example.com.")), vec![], 1);
        let host = driver.lookup_host("alpha.dc1").unwrap().unwrap();
        assert_eq!(host.fqdn, "alpha.dc1.example.com");
        assert!(matches!(
            driver.lookup_host("nothing.dc1"),
            Err(crate::infra::Error::Resolver(_))
        ));
    }

    #[test]
    fn resolver_failures_are_errors() {
        let db = InfraDb::with_driver(DnsDriver::with_lookup(Unreachable, None, vec![], 1));
        assert!(matches!(db.host("alpha"), Err(crate::infra::Error::Resolver(_))));
        assert!(matches!(db.hosts(&["alpha"]), Err(crate::infra::Error::Resolver(_))));
    }

    ////// OVER THE NETWORK //////

    mod network {
        use std::env;
        use std::fs;

        use hickory_resolver::proto::op::{Query, ResponseCode};
        use hickory_resolver::proto::rr::rdata::{A, NS, TXT};
        use hickory_resolver::proto::rr::{
            Name as WireName, RData, Record as WireRecord, RecordType,
        };

        use super::super::*;
        use crate::resolver::tests::spawn_server;

        /// Serves `example.test.`, with `_host` TXT records only over TCP.
        fn example_test(query: &Query) -> (ResponseCode, bool, Vec<WireRecord>) {
            let owner = query.name().clone();
            let txt = |text: &str| RData::TXT(TXT::new(vec![text.to_owned()]));
            let rdata = match (owner.to_string().as_str(), query.query_type()) {
                ("example.test.", RecordType::NS) => {
                    Some(RData::NS(NS(WireName::from_ascii("ns.example.test.").unwrap())))
                }
                ("alpha.dc1.example.test.", RecordType::A) => {
                    Some(RData::A(A::new(192, 0, 2, 1)))
                }
                ("_service.alpha.dc1.example.test.", RecordType::TXT) => Some(txt("webserver")),
                ("_host.webserver.dc1.example.test.", RecordType::TXT) => Some(txt("alpha bravo")),
                ("example.test." | "dc1.example.test." | "alpha.dc1.example.test.", _) => None,
                _ => return (ResponseCode::NXDomain, false, Vec::new()),
            };
            let records = rdata
                .map(|rdata| WireRecord::from_rdata(owner, 60, rdata))
                .into_iter()
                .collect();
            (ResponseCode::NoError, false, records)
        }

        fn example_test_udp(query: &Query) -> (ResponseCode, bool, Vec<WireRecord>) {
            if query.name().to_string().starts_with("_host.") {
                (ResponseCode::NoError, true, Vec::new())
            } else {
                example_test(query)
            }
        }

        #[test]
        fn driver_over_stub_resolver() {
            let port = spawn_server(example_test_udp, example_test);
            let resolv_conf = env::temp_dir().join(format!("infradb-resolv-{}.conf", port));
            fs::write(
                &resolv_conf,
                "nameserver 127.0.0.1\ndomain dc1.example.test\noptions timeout:2 attempts:1\n",
            )
            .unwrap();

            let config = DnsConfig {
                root: None,
                resolver: ResolverConfig {
                    resolv_conf: resolv_conf.clone(),
                    port: Some(port),
                },
            };
            let driver = DnsDriver::new(config);
            let _ = fs::remove_file(&resolv_conf);
            let driver = driver.unwrap();
            assert_eq!(driver.root(), Some(&"example.test.".parse().unwrap()));

            let host = driver.lookup_host("alpha").unwrap().unwrap();
            assert_eq!(host.fqdn, "alpha.dc1.example.test");
            assert_eq!(host.hardware, None);
            assert_eq!(host.services, ["webserver.dc1"]);

            // Only the TCP answer carries the hosts.
            let service = driver.lookup_service("webserver.dc1").unwrap().unwrap();
            assert_eq!(service.hosts, ["alpha.dc1", "bravo.dc1"]);
            assert!(service.services.is_empty());
            assert_eq!(driver.lookup_host("nothing").unwrap(), None);
        }
    }
}
