// Copyright 2022 Matthew Ingwersen.
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

//! Implements the configuration file and the merging of settings.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::Level::Debug;
use log::{debug, log_enabled};
use paste::paste;
use serde::{de, Deserialize};

use infradb::infra::{self, DnsConfig, DriverConfig, DriverKind, DEFAULT_JSON_FILE};
use infradb::name::Name;
use infradb::resolver::ResolverConfig;

use crate::args::Args;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the configuration file at `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Settings> {
    let raw_config =
        fs::read_to_string(path.as_ref()).context("failed to read the configuration file")?;
    let config: Config =
        toml::from_str(&raw_config).context("failed to parse the configuration file")?;
    Ok(config.infradb)
}

/// Chooses the driver configuration. Command-line arguments take
/// precedence over the configuration file, which takes precedence over
/// the environment.
pub fn merge(args: &Args, file: Settings) -> DriverConfig {
    let mut resolver = ResolverConfig::from_env();
    if let Some(path) = args.resolv_conf.clone().or(file.resolv_conf) {
        resolver.resolv_conf = path;
    }
    if let Some(port) = args.port.or(file.port) {
        resolver.port = Some(port);
    }

    let kind = args.driver.or(file.driver.map(|d| d.0)).unwrap_or_default();
    let config = match kind {
        DriverKind::Dns => DriverConfig::Dns(DnsConfig {
            root: args.domain.clone().or(file.domain.map(|d| d.0)),
            resolver,
        }),
        DriverKind::Json => DriverConfig::Json(
            args.json_file
                .clone()
                .or(file.jsonfile)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_JSON_FILE)),
        ),
    };
    log_config_summary(&config);
    config
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &DriverConfig) {
    if !log_enabled!(Debug) {
        return;
    }
    let message = match config {
        DriverConfig::Dns(dns) => format!(
            "Configuration loaded:\n\
             Driver:      dns\n\
             Root:        {}\n\
             resolv.conf: {}\n\
             Port:        {}",
            dns.root
                .as_ref()
                .map_or_else(|| String::from("(discover)"), ToString::to_string),
            dns.resolver.resolv_conf.display(),
            dns.resolver
                .port
                .map_or_else(|| String::from("default"), |p| p.to_string()),
        ),
        DriverConfig::Json(path) => format!(
            "Configuration loaded:\n\
             Driver:      json\n\
             File:        {}",
            path.display()
        ),
    };
    debug!("{}", message);
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub infradb: Settings,
}

/// The `[infradb]` table. Every setting is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub driver: Option<ConfigDriver>,
    pub domain: Option<ConfigName>,
    pub jsonfile: Option<PathBuf>,
    pub resolv_conf: Option<PathBuf>,
    pub port: Option<u16>,
}

////////////////////////////////////////////////////////////////////////
// WRAPPERS OVER INFRADB TYPES FOR SERDE                              //
////////////////////////////////////////////////////////////////////////

/// Generates a deserializable `ConfigX` structure wrapping an `X` type
/// from [`infradb`], parsing strings with `$parse`.
macro_rules! make_serde_wrapper {
    ($wrapper:ident, $over:ty, $parse:path, $description:literal) => {
        /// A macro-generated deserializable wrapper over an [`infradb`]
        /// type.
        #[derive(Clone, Debug)]
        pub struct $wrapper(pub $over);

        impl<'de> Deserialize<'de> for $wrapper {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: de::Deserializer<'de>,
            {
                deserializer.deserialize_str(paste! { [<$wrapper Visitor>] })
            }
        }

        paste! {
            /// A macro-generated [`Visitor`](de::Visitor).
            #[derive(Debug)]
            struct [<$wrapper Visitor>];
        }

        impl<'de> de::Visitor<'de> for paste! { [<$wrapper Visitor>] } {
            type Value = $wrapper;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str($description)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                $parse(value)
                    .map($wrapper)
                    .map_err(|e| E::custom(format!("invalid {}: {}", $description, e)))
            }
        }
    };
}

make_serde_wrapper!(ConfigName, Name, infra::parse_domain, "domain name");
make_serde_wrapper!(ConfigDriver, DriverKind, str::parse, "driver");

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn settings(text: &str) -> Settings {
        toml::from_str::<Config>(text).unwrap().infradb
    }

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["infradb"];
        argv.extend_from_slice(extra);
        argv.push("services");
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn file_settings_parse() {
        let settings = settings(
            r#"
            [infradb]
            driver = "dns"
            domain = "example.com"
            resolv_conf = "/tmp/resolv.conf"
            port = 5353
            "#,
        );
        assert_eq!(settings.driver.unwrap().0, DriverKind::Dns);
        assert_eq!(settings.domain.unwrap().0, "example.com.".parse().unwrap());
        assert_eq!(settings.port, Some(5353));
    }

    #[test]
    fn bad_files_are_rejected() {
        assert!(toml::from_str::<Config>("[infradb]\nbogus = 1").is_err());
        assert!(toml::from_str::<Config>("[infradb]\ndriver = \"ldap\"").is_err());
        assert!(toml::from_str::<Config>("[infradb]\ndomain = \"a..b\"").is_err());
    }

    #[test]
    fn empty_file_means_defaults() {
        let config = merge(&args(&[]), settings(""));
        assert!(matches!(config, DriverConfig::Dns(DnsConfig { root: None, .. })));
    }

    #[test]
    fn command_line_beats_file() {
        let file = r#"
            [infradb]
            driver = "dns"
            jsonfile = "from-file.json"
            "#;
        let config = merge(&args(&["--driver", "json"]), settings(file));
        assert_eq!(config, DriverConfig::Json(PathBuf::from("from-file.json")));

        let config = merge(
            &args(&["--json-file", "cli.json"]),
            settings("[infradb]\ndriver = \"json\""),
        );
        assert_eq!(config, DriverConfig::Json(PathBuf::from("cli.json")));

        let config = merge(
            &args(&["--port", "5300"]),
            settings("[infradb]\nport = 5353\nresolv_conf = \"/tmp/r.conf\""),
        );
        match config {
            DriverConfig::Dns(dns) => {
                assert_eq!(dns.resolver.port, Some(5300));
                assert_eq!(dns.resolver.resolv_conf, PathBuf::from("/tmp/r.conf"));
            }
            other => panic!("unexpected config {:?}", other),
        }
    }
}
