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

//! Resolution of symbolic infrastructure names.
//!
//! The [`infra`] module is the entry point: an [`InfraDb`](infra::InfraDb)
//! answers "which machine is `alpha.dc1`?" and "which machines run
//! `webserver`?" from either the DNS or a JSON file. The remaining
//! modules support the DNS driver: domain names that can be taken apart
//! label by label, the resource records the hierarchy is stored in, and
//! a blocking stub resolver.

pub mod infra;
pub mod name;
pub mod resolver;
pub mod rr;
mod util;
