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

//! The [`Driver`] trait implemented by every backing store.

use log::warn;

use super::name_ref::{identity, split_label};
use super::Error;

/// The raw attributes of a host as a backing store knows them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HostRecord {
    /// The name that was looked up.
    pub name: String,

    /// The canonical, fully qualified name (without a trailing dot).
    pub fqdn: String,

    pub hardware: Option<String>,
    pub os: Option<String>,

    /// The services the host says it belongs to.
    pub services: Vec<String>,
}

/// The raw attributes of a service at one level of the hierarchy.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServiceRecord {
    pub name: String,

    /// Name references of hosts bound directly to the service.
    pub hosts: Vec<String>,

    /// Names of sub-services that expand further.
    pub services: Vec<String>,
}

/// A backing store for infrastructure names.
///
/// "Not found" is an ordinary outcome here and is reported as `None` or
/// as an empty list; an `Err` means the store itself could not be
/// consulted.
pub trait Driver {
    /// Looks up a single host, without recursion.
    fn lookup_host(&self, name: &str) -> Result<Option<HostRecord>, Error>;

    /// Looks up a single service, without recursion.
    fn lookup_service(&self, name: &str) -> Result<Option<ServiceRecord>, Error>;

    /// Expands a service into the name references of all hosts reachable
    /// through its sub-services, in the order found and without
    /// deduplication. An unknown or empty service yields an empty list.
    fn resolve_service(&self, name: &str) -> Result<Vec<String>, Error> {
        expand_service(self, name)
    }

    /// Lists the service names declared at the top level, or directly
    /// under `subdomain`.
    fn list_services(&self, subdomain: Option<&str>) -> Result<Vec<String>, Error>;
}

impl<D: Driver + ?Sized> Driver for Box<D> {
    fn lookup_host(&self, name: &str) -> Result<Option<HostRecord>, Error> {
        (**self).lookup_host(name)
    }

    fn lookup_service(&self, name: &str) -> Result<Option<ServiceRecord>, Error> {
        (**self).lookup_service(name)
    }

    fn resolve_service(&self, name: &str) -> Result<Vec<String>, Error> {
        (**self).resolve_service(name)
    }

    fn list_services(&self, subdomain: Option<&str>) -> Result<Vec<String>, Error> {
        (**self).list_services(subdomain)
    }
}

/// Depth-first expansion of a service through [`Driver::lookup_service`].
/// A service that is reached again while it is still being expanded
/// contributes nothing the second time.
pub fn expand_service<D: Driver + ?Sized>(driver: &D, name: &str) -> Result<Vec<String>, Error> {
    let mut hosts = Vec::new();
    let mut path = Vec::new();
    expand_into(driver, name, &mut path, &mut hosts)?;
    Ok(hosts)
}

fn expand_into<D: Driver + ?Sized>(
    driver: &D,
    name: &str,
    path: &mut Vec<String>,
    hosts: &mut Vec<String>,
) -> Result<(), Error> {
    let key = identity(name);
    if path.contains(&key) {
        warn!(
            "service {} refers back to itself ({} -> {})",
            name,
            path.join(" -> "),
            key
        );
        return Ok(());
    }
    let record = match driver.lookup_service(name)? {
        Some(record) => record,
        None => return Ok(()),
    };

    path.push(key);
    hosts.extend(record.hosts);
    for service in &record.services {
        let (_, service) = split_label(service);
        expand_into(driver, service, path, hosts)?;
    }
    path.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// A driver over a fixed service table.
    struct Table(HashMap<&'static str, (Vec<&'static str>, Vec<&'static str>)>);

    impl Driver for Table {
        fn lookup_host(&self, _: &str) -> Result<Option<HostRecord>, Error> {
            Ok(None)
        }

        fn lookup_service(&self, name: &str) -> Result<Option<ServiceRecord>, Error> {
            Ok(self.0.get(name).map(|(hosts, services)| ServiceRecord {
                name: name.to_owned(),
                hosts: hosts.iter().map(|s| s.to_string()).collect(),
                services: services.iter().map(|s| s.to_string()).collect(),
            }))
        }

        fn list_services(&self, _: Option<&str>) -> Result<Vec<String>, Error> {
            Ok(self.0.keys().map(|s| s.to_string()).collect())
        }
    }

    fn table(entries: &[(&'static str, &[&'static str], &[&'static str])]) -> Table {
        Table(
            entries
                .iter()
                .map(|(name, hosts, services)| (*name, (hosts.to_vec(), services.to_vec())))
                .collect(),
        )
    }

    #[test]
    fn expands_depth_first_in_order() {
        let driver = table(&[
            ("web", &["a"], &["web.dc1", "web.dc2"]),
            ("web.dc1", &["b", "c"], &[]),
            ("web.dc2", &["a", "d"], &[]),
        ]);
        assert_eq!(driver.resolve_service("web").unwrap(), ["a", "b", "c", "a", "d"]);
    }

    #[test]
    fn unknown_and_empty_services_expand_to_nothing() {
        let driver = table(&[("empty", &[], &["missing"])]);
        assert!(driver.resolve_service("empty").unwrap().is_empty());
        assert!(driver.resolve_service("bogus").unwrap().is_empty());
    }

    #[test]
    fn cycles_terminate_with_partial_results() {
        let driver = table(&[
            ("loop", &["a"], &["loop.inner"]),
            ("loop.inner", &["b"], &["LOOP", "other"]),
            ("other", &["c"], &["loop.inner"]),
        ]);
        assert_eq!(driver.resolve_service("loop").unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn diamonds_are_not_cycles() {
        let driver = table(&[
            ("top", &[], &["left", "right"]),
            ("left", &[], &["shared"]),
            ("right", &[], &["shared"]),
            ("shared", &["x"], &[]),
        ]);
        assert_eq!(driver.resolve_service("top").unwrap(), ["x", "x"]);
    }

    #[test]
    fn labels_on_sub_services_are_ignored() {
        let driver = table(&[("top", &[], &["tag:inner"]), ("inner", &["x"], &[])]);
        assert_eq!(driver.resolve_service("top").unwrap(), ["x"]);
    }
}
