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

//! Handling of name references, the host and service names that appear
//! in TXT records and JSON tables.

/// Splits an optional `label:` prefix off a name reference. Only the
/// rightmost `:` separates, so `a:b:alpha.dc1` has label `a:b`. An
/// empty label counts as none.
///
/// ```
/// use infradb::infra::split_label;
/// assert_eq!(split_label("primary:alpha.dc1"), (Some("primary"), "alpha.dc1"));
/// assert_eq!(split_label("alpha.dc1"), (None, "alpha.dc1"));
/// ```
pub fn split_label(reference: &str) -> (Option<&str>, &str) {
    match reference.rsplit_once(':') {
        Some(("", name)) => (None, name),
        Some((label, name)) => (Some(label), name),
        None => (None, reference),
    }
}

/// Returns the key under which a name is compared for deduplication and
/// cycle detection: the name without its label, lower-cased, without a
/// trailing dot.
pub(super) fn identity(reference: &str) -> String {
    let (_, name) = split_label(reference);
    name.trim_end_matches('.').to_ascii_lowercase()
}
