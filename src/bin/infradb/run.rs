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

//! Runs a command against the infrastructure database.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::process;

use anyhow::{Context, Result};
use env_logger::Env;
use log::info;

use infradb::infra::{Host, InfraDb, Service};

use crate::args::{Args, Command};
use crate::config::{self, Settings};

/// Runs the command given in `args`, exiting with failure on error.
pub fn run(args: Args) {
    env_logger::init_from_env(Env::new().default_filter_or("warn"));

    if let Err(e) = try_running(args) {
        let mut message = String::from("infradb:");
        for (i, cause) in e.chain().enumerate() {
            // Writing to a String cannot fail.
            let _ = write!(message, "\n[{}] {}", i + 1, cause);
        }
        eprintln!("{}", message);
        process::exit(1);
    }
}

fn try_running(args: Args) -> Result<()> {
    let settings = match args.config {
        Some(ref path) => {
            info!("Loading the configuration from {}.", path.display());
            config::load_from_path(path).context("failed to load the configuration")?
        }
        None => Settings::default(),
    };
    let driver_config = config::merge(&args, settings);
    let db = InfraDb::new(driver_config).context("failed to open the infrastructure database")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(&db, args.command, &mut out)?;
    out.flush().context("failed to write output")
}

/// Executes one command, writing its results to `out`.
fn execute(db: &InfraDb, command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Host { names } => {
            for name in names {
                write_host(out, &db.host(&name)?)?;
            }
        }
        Command::Hosts { names } => {
            for host in db.hosts(&names)? {
                writeln!(out, "{}", host)?;
            }
        }
        Command::Service { names } => {
            for service in db.services(&names)? {
                write_service(out, &service)?;
            }
        }
        Command::Resolve { services } => {
            for service in services {
                let mut hosts = db.service_hosts(&service)?;
                hosts.sort();
                for host in hosts {
                    writeln!(out, "{}", host)?;
                }
            }
        }
        Command::Services { domains } => {
            for service in db.list_services(&domains)? {
                writeln!(out, "{}", service)?;
            }
        }
    }
    Ok(())
}

fn write_host(out: &mut impl Write, host: &Host) -> io::Result<()> {
    writeln!(out, "{}", host)?;
    writeln!(out, "  fqdn:     {}", host.fqdn())?;
    if let Some(hardware) = host.hardware() {
        writeln!(out, "  hardware: {}", hardware)?;
    }
    if let Some(os) = host.os() {
        writeln!(out, "  os:       {}", os)?;
    }
    if let Some(package_type) = host.package_type() {
        writeln!(out, "  packages: {}", package_type)?;
    }
    writeln!(out, "  services: {}", host.services().join(" "))
}

fn write_service(out: &mut impl Write, service: &Service) -> io::Result<()> {
    writeln!(out, "{}", service)?;
    writeln!(out, "  hosts:    {}", service.hosts().join(" "))?;
    writeln!(out, "  services: {}", service.services().join(" "))
}
