//! Snapshot of the local network context.

use std::collections::BTreeMap;
use std::net::IpAddr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::keys::TunnelKey;

/// Local subnets, default gateways and our own tunnel key.
///
/// Replaced wholesale on every change; never partially mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    /// Attached subnets and the local addresses inside each.
    #[serde(default)]
    pub current_subnets: BTreeMap<IpNet, Vec<IpAddr>>,
    /// Default gateway candidates in preference order.
    #[serde(default)]
    pub gateways: Vec<IpAddr>,
    /// This host's tunnel public key.
    #[serde(default)]
    pub our_pk: TunnelKey,
}

impl SystemState {
    /// Every locally assigned address.
    #[must_use]
    pub fn current_ips(&self) -> Vec<IpAddr> {
        self.current_subnets.values().flatten().copied().collect()
    }

    /// Whether `addr` falls inside an attached subnet.
    #[must_use]
    pub fn in_subnets(&self, addr: &IpAddr) -> bool {
        self.current_subnets.keys().any(|net| net.contains(addr))
    }

    /// Whether any of `addrs` falls inside an attached subnet.
    #[must_use]
    pub fn any_in_subnets<'a>(&self, addrs: impl IntoIterator<Item = &'a IpAddr>) -> bool {
        addrs.into_iter().any(|a| self.in_subnets(a))
    }

    /// Whether `addr` is a gateway candidate.
    #[must_use]
    pub fn is_gateway(&self, addr: &IpAddr) -> bool {
        self.gateways.contains(addr)
    }
}
