//! Durable preferences stored alongside the peer state.

use serde::{Deserialize, Serialize};

/// Domain accepted when nothing else is configured.
pub const DEFAULT_LOCAL_DOMAIN: &str = "local.";

/// Operator preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefs {
    /// Hostname suffixes accepted from descriptors.
    pub local_domains: Vec<String>,
    /// Pin newly admitted, non-ephemeral peers.
    pub pin_new_peers: bool,
    /// Append every committed event to the event log.
    pub record_events: bool,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            local_domains: vec![DEFAULT_LOCAL_DOMAIN.to_string()],
            pin_new_peers: false,
            record_events: false,
        }
    }
}

impl Prefs {
    /// Whether `hostname` lies under one of the local domains.
    ///
    /// Trailing dots are ignored on both sides and the suffix must start at a
    /// label boundary, so `alocal.` is not under `local.`.
    #[must_use]
    pub fn is_local(&self, hostname: &str) -> bool {
        self.local_domains
            .iter()
            .any(|domain| under_domain(hostname, domain))
    }
}

fn under_domain(hostname: &str, domain: &str) -> bool {
    let host = hostname.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.trim_matches('.').to_ascii_lowercase();
    if domain.is_empty() || host.len() <= domain.len() {
        return false;
    }
    host.strip_suffix(&domain)
        .is_some_and(|prefix| prefix.ends_with('.'))
}
