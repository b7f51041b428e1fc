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

//! The JSON driver, which reads hosts and services from a static file.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use log::{debug, warn};
use serde::Deserialize;

use super::driver::{Driver, HostRecord, ServiceRecord};
use super::name_ref::split_label;
use super::Error;

/// The file's top-level document. Every table is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Document {
    hosts: BTreeMap<String, HostEntry>,
    services: BTreeMap<String, ServiceEntry>,
    roles: BTreeMap<String, Vec<String>>,
}

/// A host is either just its FQDN (the older form) or a table of
/// attributes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HostEntry {
    Fqdn(String),
    Full(HostAttributes),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HostAttributes {
    fqdn: Option<String>,
    hardware: Option<String>,
    os: Option<String>,
    services: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServiceEntry {
    hosts: Option<Vec<String>>,
    services: Option<Vec<String>>,
}

impl ServiceEntry {
    fn is_absent(&self) -> bool {
        self.hosts.is_none() && self.services.is_none()
    }
}

/// A [`Driver`] over a JSON document loaded once at construction.
#[derive(Debug, Default)]
pub struct JsonDriver {
    document: Document,
}

impl JsonDriver {
    /// Loads the document at `path`. This never fails: a missing,
    /// unreadable, or malformed file leaves the driver with empty
    /// tables.
    pub fn open(path: &Path) -> Self {
        debug!("loading infradb JSON file {}", path.display());
        match fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text).unwrap_or_else(|err| {
                warn!("ignoring malformed infradb file {}: {}", path.display(), err);
                Self::default()
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("{} does not exist; starting with empty tables", path.display());
                Self::default()
            }
            Err(err) => {
                warn!("could not read infradb file {}: {}", path.display(), err);
                Self::default()
            }
        }
    }

    /// Parses a document from a string.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        Ok(Self {
            document: serde_json::from_str(text)?,
        })
    }

    fn is_host(&self, reference: &str) -> bool {
        let (_, name) = split_label(reference);
        self.document.hosts.contains_key(name)
    }
}

impl Driver for JsonDriver {
    fn lookup_host(&self, name: &str) -> Result<Option<HostRecord>, Error> {
        debug!("looking up host {} in JSON tables", name);
        let record = match self.document.hosts.get(name.trim_end_matches('.')) {
            Some(HostEntry::Fqdn(fqdn)) => HostRecord {
                name: name.to_owned(),
                fqdn: fqdn.trim_end_matches('.').to_owned(),
                ..HostRecord::default()
            },
            Some(HostEntry::Full(attributes)) => HostRecord {
                name: name.to_owned(),
                fqdn: attributes
                    .fqdn
                    .as_deref()
                    .unwrap_or(name)
                    .trim_end_matches('.')
                    .to_owned(),
                hardware: attributes.hardware.clone(),
                os: attributes.os.clone(),
                services: attributes.services.clone(),
            },
            None => return Ok(None),
        };
        Ok(Some(record))
    }

    fn lookup_service(&self, name: &str) -> Result<Option<ServiceRecord>, Error> {
        debug!("looking up service {} in JSON tables", name);
        let key = name.trim_end_matches('.');
        if let Some(entry) = self.document.services.get(key).filter(|e| !e.is_absent()) {
            return Ok(Some(ServiceRecord {
                name: name.to_owned(),
                hosts: entry.hosts.clone().unwrap_or_default(),
                services: entry.services.clone().unwrap_or_default(),
            }));
        }

        // Roles mix hosts and further roles in one list.
        Ok(self.document.roles.get(key).map(|members| {
            let (hosts, services) = members.iter().cloned().partition(|m| self.is_host(m));
            ServiceRecord {
                name: name.to_owned(),
                hosts,
                services,
            }
        }))
    }

    fn list_services(&self, subdomain: Option<&str>) -> Result<Vec<String>, Error> {
        let declared = self
            .document
            .services
            .iter()
            .filter(|(_, entry)| !entry.is_absent())
            .map(|(name, _)| name)
            .chain(self.document.roles.keys());
        let names: BTreeSet<&String> = match subdomain {
            None => declared.filter(|name| !name.contains('.')).collect(),
            Some(subdomain) => {
                let subdomain = subdomain.trim_end_matches('.');
                declared
                    .filter(|name| {
                        name.strip_suffix(subdomain)
                            .and_then(|rest| rest.strip_suffix('.'))
                            .map_or(false, |label| !label.is_empty() && !label.contains('.'))
                    })
                    .collect()
            }
        };
        Ok(names.into_iter().cloned().collect())
    }
}
