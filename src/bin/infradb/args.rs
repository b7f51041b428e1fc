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

//! Implements command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use infradb::infra::{self, DriverKind};
use infradb::name::Name;

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// Looks up hosts and services in the infrastructure database
#[derive(Debug, Parser)]
#[command(author, version)]
pub struct Args {
    /// Read settings from a TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Select the backing store (dns or json)
    #[arg(long, value_name = "KIND")]
    pub driver: Option<DriverKind>,

    /// Set the root domain of the DNS naming hierarchy
    #[arg(long, value_name = "NAME", value_parser = infra::parse_domain)]
    pub domain: Option<Name>,

    /// Set the file read by the JSON driver
    #[arg(long, value_name = "FILE")]
    pub json_file: Option<PathBuf>,

    /// Use an alternate resolv.conf for DNS lookups
    #[arg(long, value_name = "FILE")]
    pub resolv_conf: Option<PathBuf>,

    /// Send DNS queries to this port instead of 53
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the details of hosts
    Host {
        #[arg(required = true, value_name = "NAME")]
        names: Vec<String>,
    },

    /// Expand host and service names into a list of hosts
    Hosts {
        #[arg(required = true, value_name = "NAME")]
        names: Vec<String>,
    },

    /// Show the direct hosts and sub-services of services
    Service {
        #[arg(required = true, value_name = "NAME")]
        names: Vec<String>,
    },

    /// List every host that runs each service
    Resolve {
        #[arg(required = true, value_name = "SERVICE")]
        services: Vec<String>,
    },

    /// List the declared services, optionally under sub-domains
    Services {
        #[arg(value_name = "DOMAIN")]
        domains: Vec<String>,
    },
}
