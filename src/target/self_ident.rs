//! Live identifiers of the machine the engine runs on.
//!
//! The set is computed once from system state (hostname and every locally
//! bound interface address) and never from stored target records.

use std::collections::HashSet;

use sysinfo::{Networks, System};
use tracing::{debug, info};

use super::normalize_host;

const LOOPBACK_IDENTIFIERS: &[&str] = &["localhost", "127.0.0.1", "::1", "0.0.0.0"];

/// Immutable set of strings that identify this system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelfIdentifierSet {
    identifiers: HashSet<String>,
}

impl SelfIdentifierSet {
    /// Detect identifiers from the running system.
    pub fn detect() -> Self {
        let mut identifiers: Vec<String> = LOOPBACK_IDENTIFIERS
            .iter()
            .map(|s| s.to_string())
            .collect();

        if let Some(hostname) = System::host_name() {
            identifiers.push(hostname);
        }

        let networks = Networks::new_with_refreshed_list();
        for (interface, data) in networks.list() {
            for network in data.ip_networks() {
                debug!(interface = %interface, addr = %network.addr, "self identifier");
                identifiers.push(network.addr.to_string());
            }
        }

        let set = Self::from_identifiers(identifiers);
        info!(count = set.len(), "Self-identifiers detected");
        set
    }

    /// Build a set from explicit identifiers. Loopback identifiers are always included.
    pub fn from_identifiers<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set: HashSet<String> = LOOPBACK_IDENTIFIERS
            .iter()
            .map(|s| s.to_string())
            .collect();
        for id in identifiers {
            let id = id.as_ref().trim();
            if id.is_empty() {
                continue;
            }
            set.insert(id.to_string());
            set.insert(normalize_host(id));
        }
        Self { identifiers: set }
    }

    /// True when the normalized host is one of this system's identifiers.
    pub fn contains(&self, host: &str) -> bool {
        self.identifiers.contains(&normalize_host(host))
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// Sorted copy of every identifier, for diagnostics.
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.identifiers.iter().cloned().collect();
        ids.sort();
        ids
    }
}
