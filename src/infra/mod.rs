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

//! The infrastructure database: resolution of symbolic host and service
//! names against a pluggable backing store.
//!
//! An [`InfraDb`] wraps a [`Driver`] and turns its raw records into
//! [`Host`]s and [`Service`]s. A name may denote a host, a service, or
//! nothing, so [`InfraDb::hosts`] tries each name as a host first and
//! falls back to expanding it as a service. Two drivers are provided:
//! [`DnsDriver`], which reads a naming hierarchy encoded in TXT records,
//! and [`JsonDriver`], which reads a static file.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use log::{debug, warn};

use crate::name::{self, Name};
use crate::resolver::{self, ResolverConfig};
use crate::util::Caseless;

mod dns;
mod driver;
mod json;
mod name_ref;
pub use dns::{DnsConfig, DnsDriver};
pub use driver::{expand_service, Driver, HostRecord, ServiceRecord};
pub use json::JsonDriver;
pub use name_ref::split_label;
use name_ref::identity;

/// The file the JSON driver reads when none is given.
pub const DEFAULT_JSON_FILE: &str = "infradb.json";

////////////////////////////////////////////////////////////////////////
// DRIVER SELECTION                                                   //
////////////////////////////////////////////////////////////////////////

/// The kinds of backing store.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum DriverKind {
    #[default]
    Dns,
    Json,
}

impl FromStr for DriverKind {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if Caseless(text) == Caseless("dns") {
            Ok(Self::Dns)
        } else if Caseless(text) == Caseless("json") {
            Ok(Self::Json)
        } else {
            Err(Error::NoSuchDriver(text.to_owned()))
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Dns => f.write_str("dns"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// Everything needed to construct a driver.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DriverConfig {
    Dns(DnsConfig),
    Json(PathBuf),
}

impl DriverConfig {
    /// Builds a configuration from a driver kind and its one optional
    /// setting: the root domain for `dns`, the file for `json`. The DNS
    /// resolver settings come from the environment.
    pub fn new(kind: DriverKind, confstr: Option<&str>) -> Result<Self, Error> {
        match kind {
            DriverKind::Dns => Ok(Self::Dns(DnsConfig {
                root: confstr.map(parse_domain).transpose()?,
                resolver: ResolverConfig::from_env(),
            })),
            DriverKind::Json => Ok(Self::Json(
                confstr.unwrap_or(DEFAULT_JSON_FILE).into(),
            )),
        }
    }
}

/// Parses a domain given in configuration, where the trailing dot is
/// optional.
pub fn parse_domain(text: &str) -> Result<Name, Error> {
    let result = if text.ends_with('.') {
        text.parse()
    } else {
        format!("{}.", text).parse()
    };
    result.map_err(|e| Error::InvalidDomain(text.to_owned(), e))
}

////////////////////////////////////////////////////////////////////////
// THE FACADE                                                         //
////////////////////////////////////////////////////////////////////////

/// The infrastructure database. See the [module documentation](self).
pub struct InfraDb {
    driver: Box<dyn Driver>,
}

impl InfraDb {
    /// Constructs the driver described by `config`.
    pub fn new(config: DriverConfig) -> Result<Self, Error> {
        debug!("initializing infradb driver: {:?}", config);
        match config {
            DriverConfig::Dns(config) => Ok(Self::with_driver(DnsDriver::new(config)?)),
            DriverConfig::Json(path) => Ok(Self::with_driver(JsonDriver::open(&path))),
        }
    }

    /// Constructs a driver named by a string, failing with
    /// [`Error::NoSuchDriver`] if the name is not recognized.
    pub fn open(kind: &str, confstr: Option<&str>) -> Result<Self, Error> {
        Self::new(DriverConfig::new(kind.parse()?, confstr)?)
    }

    /// Wraps an existing driver.
    pub fn with_driver(driver: impl Driver + 'static) -> Self {
        Self {
            driver: Box::new(driver),
        }
    }

    /// Looks up a single host. A `label:` prefix on `name` is split off
    /// before the lookup and kept on the result.
    pub fn host(&self, name: &str) -> Result<Host, Error> {
        debug!("looking up host {}", name);
        let (label, bare) = split_label(name);
        match self.driver.lookup_host(bare)? {
            Some(record) => Ok(Host::new(record, label)),
            None => Err(Error::HostNotFound(name.to_owned())),
        }
    }

    /// Resolves each of `names` to hosts, expanding names that are not
    /// hosts as services. The result holds each host once, in order of
    /// first appearance. A name that is neither a host nor a service
    /// with hosts fails the whole call.
    pub fn hosts<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Host>, Error> {
        let mut found = Vec::new();
        let mut path = Vec::new();
        for name in names {
            self.collect_hosts(name.as_ref(), &mut path, &mut found)?;
        }
        Ok(dedup_by_key(found, Host::identity))
    }

    fn collect_hosts(
        &self,
        name: &str,
        path: &mut Vec<String>,
        found: &mut Vec<Host>,
    ) -> Result<(), Error> {
        let not_found = match self.host(name) {
            Ok(host) => {
                found.push(host);
                return Ok(());
            }
            Err(err @ Error::HostNotFound(_)) => err,
            Err(err) => return Err(err),
        };

        let key = identity(name);
        if path.contains(&key) {
            warn!("{} expands back into itself; skipping", name);
            return Ok(());
        }
        let (_, service) = split_label(name);
        let members = self.driver.resolve_service(service)?;
        let before = found.len();
        path.push(key);
        for member in &members {
            self.collect_hosts(member, path, found)?;
        }
        path.pop();

        if found.len() > before {
            Ok(())
        } else {
            Err(not_found)
        }
    }

    /// Looks up a single service.
    pub fn service(&self, name: &str) -> Result<Service, Error> {
        debug!("looking up service {}", name);
        let (_, bare) = split_label(name);
        match self.driver.lookup_service(bare)? {
            Some(record) => Ok(Service::from(record)),
            None => Err(Error::ServiceNotFound(name.to_owned())),
        }
    }

    /// Looks up several services; the first failure aborts.
    pub fn services<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Service>, Error> {
        names.iter().map(|name| self.service(name.as_ref())).collect()
    }

    /// Expands a service into the names of all its hosts, labels
    /// removed, each once, in order of first appearance.
    pub fn service_hosts(&self, name: &str) -> Result<Vec<String>, Error> {
        let service = self.service(name)?;
        let hosts = self
            .driver
            .resolve_service(service.name())?
            .iter()
            .map(|reference| split_label(reference).1.to_owned())
            .collect();
        Ok(dedup_by_key(hosts, |host| identity(host)))
    }

    /// Lists services at the top level when `subdomains` is empty, and
    /// otherwise the services directly under each subdomain, one
    /// subdomain after another.
    pub fn list_services<S: AsRef<str>>(&self, subdomains: &[S]) -> Result<Vec<String>, Error> {
        if subdomains.is_empty() {
            return self.driver.list_services(None);
        }
        let mut services = Vec::new();
        for subdomain in subdomains {
            services.extend(self.driver.list_services(Some(subdomain.as_ref()))?);
        }
        Ok(services)
    }
}

impl fmt::Debug for InfraDb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("InfraDb").finish_non_exhaustive()
    }
}

/// Keeps the first item for each key, preserving order.
fn dedup_by_key<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + std::hash::Hash,
    F: Fn(&T) -> K,
{
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

////////////////////////////////////////////////////////////////////////
// HOSTS AND SERVICES                                                 //
////////////////////////////////////////////////////////////////////////

/// A resolved host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Host {
    name: String,
    fqdn: String,
    hardware: Option<String>,
    os: Option<String>,
    services: Vec<String>,
    label: Option<String>,
}

/// The package format a host installs.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PackageType {
    Deb,
    Rpm,
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Deb => f.write_str("deb"),
            Self::Rpm => f.write_str("rpm"),
        }
    }
}

impl Host {
    fn new(record: HostRecord, label: Option<&str>) -> Self {
        Self {
            name: record.name,
            fqdn: record.fqdn,
            hardware: record.hardware,
            os: record.os,
            services: record.services,
            label: label.map(str::to_owned),
        }
    }

    /// The name the host was looked up by, without its label.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }

    pub fn hardware(&self) -> Option<&str> {
        self.hardware.as_deref()
    }

    pub fn os(&self) -> Option<&str> {
        self.os.as_deref()
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Two `Host`s with the same identity are the same machine.
    pub fn identity(&self) -> String {
        identity(&self.fqdn)
    }

    /// Guesses the package format from the OS tag.
    pub fn package_type(&self) -> Option<PackageType> {
        let os = self.os.as_deref()?.to_ascii_lowercase();
        const DEB: &[&str] = &["debian", "ubuntu", "mint"];
        const RPM: &[&str] = &[
            "red hat", "redhat", "rhel", "centos", "fedora", "suse", "rocky", "alma",
        ];
        if DEB.iter().any(|tag| os.contains(tag)) {
            Some(PackageType::Deb)
        } else if RPM.iter().any(|tag| os.contains(tag)) {
            Some(PackageType::Rpm)
        } else {
            None
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{}:{}", label, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A service at one level of the hierarchy.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Service {
    name: String,
    hosts: Vec<String>,
    services: Vec<String>,
}

impl Service {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hosts bound directly to this service.
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Sub-services of this service.
    pub fn services(&self) -> &[String] {
        &self.services
    }
}

impl From<ServiceRecord> for Service {
    fn from(record: ServiceRecord) -> Self {
        Self {
            name: record.name,
            hosts: record.hosts,
            services: record.services,
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error from the infrastructure database.
#[derive(Debug)]
pub enum Error {
    /// The name is not a host (nor, where that was tried, a service).
    HostNotFound(String),

    /// The name is not a service.
    ServiceNotFound(String),

    /// The driver kind is not recognized.
    NoSuchDriver(String),

    /// A configured domain is not a valid domain name.
    InvalidDomain(String, name::Error),

    /// The DNS could not be consulted.
    Resolver(resolver::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::HostNotFound(name) => write!(f, "could not locate host '{}'", name),
            Self::ServiceNotFound(name) => write!(f, "could not locate service '{}'", name),
            Self::NoSuchDriver(name) => write!(f, "no such driver: {}", name),
            Self::InvalidDomain(text, err) => write!(f, "invalid domain '{}': {}", text, err),
            Self::Resolver(err) => write!(f, "resolver failure: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidDomain(_, err) => Some(err),
            Self::Resolver(err) => Some(err),
            _ => None,
        }
    }
}

impl From<resolver::Error> for Error {
    fn from(err: resolver::Error) -> Self {
        Self::Resolver(err)
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/infradb.json");

    fn db() -> InfraDb {
        InfraDb::open("json", Some(FIXTURE)).unwrap()
    }

    fn names(hosts: &[Host]) -> Vec<String> {
        hosts.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn unknown_driver_fails_loudly() {
        let err = InfraDb::open("ldap", None).unwrap_err();
        assert!(matches!(err, Error::NoSuchDriver(ref name) if name == "ldap"));
        assert_eq!(err.to_string(), "no such driver: ldap");
        assert_eq!("JSON".parse::<DriverKind>().unwrap(), DriverKind::Json);
    }

    #[test]
    fn driver_config_defaults() {
        assert_eq!(
            DriverConfig::new(DriverKind::Json, None).unwrap(),
            DriverConfig::Json(PathBuf::from(DEFAULT_JSON_FILE))
        );
        match DriverConfig::new(DriverKind::Dns, Some("example.com")).unwrap() {
            DriverConfig::Dns(config) => {
                assert_eq!(config.root, Some("example.com.".parse().unwrap()))
            }
            other => panic!("unexpected config {:?}", other),
        }
        assert!(matches!(
            DriverConfig::new(DriverKind::Dns, Some("a..b")),
            Err(Error::InvalidDomain(..))
        ));
    }

    #[test]
    fn host_works() {
        let host = db().host("alpha.dc1").unwrap();
        assert_eq!(host.to_string(), "alpha.dc1");
        assert_eq!(host.fqdn(), "alpha.dc1.example.com");
        assert_eq!(host.services(), ["webserver", "mailserver"]);
        assert_eq!(host.package_type(), Some(PackageType::Deb));
    }

    #[test]
    fn host_not_found_names_the_input() {
        let err = db().host("bogus").unwrap_err();
        assert_eq!(err.to_string(), "could not locate host 'bogus'");
    }

    #[test]
    fn label_is_stripped_and_kept() {
        let labelled = db().host("primary:alpha.dc1").unwrap();
        let plain = db().host("alpha.dc1").unwrap();
        assert_eq!(labelled.identity(), plain.identity());
        assert_eq!(labelled.label(), Some("primary"));
        assert_eq!(labelled.to_string(), "primary:alpha.dc1");
    }

    #[test]
    fn hosts_of_hosts() {
        let hosts = db().hosts(&["alpha.dc1", "charlie.dc2"]).unwrap();
        assert_eq!(names(&hosts), ["alpha.dc1", "charlie.dc2"]);
    }

    #[test]
    fn hosts_deduplicates_same_name() {
        assert_eq!(db().hosts(&["alpha.dc1", "alpha.dc1"]).unwrap().len(), 1);
    }

    #[test]
    fn hosts_expands_services_in_first_seen_order() {
        let hosts = db().hosts(&["alpha.dc1", "webserver.dc2"]).unwrap();
        assert_eq!(names(&hosts), ["alpha.dc1", "charlie.dc2"]);
        let hosts = db().hosts(&["alpha.dc1", "webserver"]).unwrap();
        assert_eq!(
            names(&hosts),
            ["alpha.dc1", "bravo.dc1", "charlie.dc2", "delta.dc3"]
        );
    }

    #[test]
    fn hosts_deduplicates_across_services() {
        let hosts = db().hosts(&["frontend"]).unwrap();
        assert_eq!(
            names(&hosts),
            ["alpha.dc1", "bravo.dc1", "charlie.dc2", "delta.dc3"]
        );
    }

    #[test]
    fn hosts_fails_on_unknown_or_empty_names() {
        let err = db().hosts(&["alpha.dc1", "bogus"]).unwrap_err();
        assert_eq!(err.to_string(), "could not locate host 'bogus'");
        let err = db().hosts(&["alpha.dc1", "broken"]).unwrap_err();
        assert_eq!(err.to_string(), "could not locate host 'broken'");
    }

    #[test]
    fn hosts_survives_cycles() {
        let hosts = db().hosts(&["loop"]).unwrap();
        assert_eq!(names(&hosts), ["echo.dc3"]);
    }

    #[test]
    fn service_works() {
        let service = db().service("webserver.dc1").unwrap();
        assert_eq!(service.to_string(), "webserver.dc1");
        assert_eq!(service.hosts(), ["alpha.dc1", "bravo.dc1"]);
        let err = db().service("broken").unwrap_err();
        assert_eq!(err.to_string(), "could not locate service 'broken'");
    }

    #[test]
    fn services_aborts_on_first_failure() {
        let services = db().services(&["webserver.dc2", "webserver.dc3"]).unwrap();
        assert_eq!(services.len(), 2);
        let err = db().services(&["webserver.dc1", "broken"]).unwrap_err();
        assert!(matches!(err, Error::ServiceNotFound(ref name) if name == "broken"));
    }

    #[test]
    fn service_hosts_expands_and_deduplicates() {
        assert_eq!(
            db().service_hosts("webserver").unwrap(),
            ["alpha.dc1", "bravo.dc1", "charlie.dc2", "delta.dc3"]
        );
        assert_eq!(db().service_hosts("mailserver.dc1").unwrap(), ["alpha.dc1"]);
    }

    #[test]
    fn list_services_per_subdomain() {
        let db = db();
        let none: &[&str] = &[];
        assert_eq!(
            db.list_services(none).unwrap(),
            ["dbserver", "frontend", "loop", "webserver"]
        );
        assert_eq!(
            db.list_services(&["dc1"]).unwrap(),
            ["mailserver.dc1", "webserver.dc1"]
        );
        assert_eq!(
            db.list_services(&["dc1", "dc2"]).unwrap(),
            ["mailserver.dc1", "webserver.dc1", "legacy.dc2", "webserver.dc2"]
        );
    }

    #[test]
    fn package_type_from_os() {
        let host = |os: &str| {
            Host::new(
                HostRecord {
                    os: Some(os.to_owned()),
                    ..HostRecord::default()
                },
                None,
            )
        };
        assert_eq!(host("Ubuntu 22.04").package_type(), Some(PackageType::Deb));
        assert_eq!(host("CentOS 7").package_type(), Some(PackageType::Rpm));
        assert_eq!(host("OpenBSD").package_type(), None);
        assert_eq!(PackageType::Rpm.to_string(), "rpm");
    }
}
