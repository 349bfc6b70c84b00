//! The peer store and its derived indices.
//!
//! Indices are computed on demand from the enabled peers and never persisted.
//! The committed-state precondition is `conflicts() == ""`.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::descriptor::Descriptor;
use crate::error::{OrganizeError, Result};
use crate::keys::{PeerId, TunnelKey};
use crate::peer::Peer;

/// Selector for [`PeerStore::ids`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Which {
    /// Every peer.
    #[default]
    All,
    /// Enabled peers only.
    Enabled,
    /// Disabled peers only.
    Disabled,
}

/// Peers keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerStore {
    peers: BTreeMap<PeerId, Peer>,
}

impl PeerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a peer by id.
    #[must_use]
    pub fn get(&self, id: &PeerId) -> Option<&Peer> {
        self.peers.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(id)
    }

    /// Whether a peer with this id exists.
    #[must_use]
    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    pub(crate) fn insert(&mut self, peer: Peer) -> Option<Peer> {
        self.peers.insert(peer.id(), peer)
    }

    pub(crate) fn remove(&mut self, id: &PeerId) -> Option<Peer> {
        self.peers.remove(id)
    }

    /// Number of peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// All `(id, peer)` entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, &Peer)> {
        self.peers.iter()
    }

    /// All peers in id order.
    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    /// Enabled peers in id order.
    pub fn enabled(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values().filter(|p| p.enabled)
    }

    /// Ids of the selected peers.
    #[must_use]
    pub fn ids(&self, which: Which) -> Vec<PeerId> {
        self.peers
            .values()
            .filter(|p| match which {
                Which::All => true,
                Which::Enabled => p.enabled,
                Which::Disabled => !p.enabled,
            })
            .map(Peer::id)
            .collect()
    }

    /// Enabled peers that list `name` as an enabled nickname, ignoring case.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Vec<&Peer> {
        self.enabled().filter(|p| p.has_enabled_name(name)).collect()
    }

    /// Enabled peers that list `addr` as an enabled address.
    #[must_use]
    pub fn by_address(&self, addr: &IpAddr) -> Vec<&Peer> {
        self.enabled()
            .filter(|p| p.has_enabled_address(addr))
            .collect()
    }

    /// Enabled peers whose current descriptor carries `pk`.
    #[must_use]
    pub fn by_tunnel_key(&self, pk: &TunnelKey) -> Vec<&Peer> {
        self.enabled().filter(|p| p.tunnel_key() == pk).collect()
    }

    /// The enabled peer with this enabled nickname.
    ///
    /// More than one match means the store is inconsistent.
    pub fn with_hostname(&self, name: &str) -> Result<Option<&Peer>> {
        single(self.by_name(name), || format!("hostname {name}"))
    }

    /// The enabled peer with this enabled address.
    pub fn with_ip(&self, addr: &IpAddr) -> Result<Option<&Peer>> {
        single(self.by_address(addr), || format!("address {addr}"))
    }

    /// Resolves a user query: a peer id, else an enabled name, else an enabled
    /// address.
    pub fn query(&self, query: &str) -> Result<Option<&Peer>> {
        if let Ok(id) = query.parse::<PeerId>() {
            if let Some(peer) = self.get(&id) {
                return Ok(Some(peer));
            }
        }
        if let Some(peer) = self.with_hostname(query)? {
            return Ok(Some(peer));
        }
        match query.parse::<IpAddr>() {
            Ok(addr) => self.with_ip(&addr),
            Err(_) => Ok(None),
        }
    }

    /// The enabled gateway peer, if any.
    #[must_use]
    pub fn gateway(&self) -> Option<&Peer> {
        self.enabled().find(|p| p.use_as_gateway)
    }

    /// Ids of the enabled peers, other than the descriptor's own identity,
    /// that share its hostname, tunnel key or any of its addresses.
    #[must_use]
    pub fn conflicts_for(&self, descriptor: &Descriptor) -> Vec<PeerId> {
        let id = descriptor.id();
        let mut found = BTreeSet::new();
        for peer in self.enabled().filter(|p| p.id() != id) {
            let name_clash = peer.has_enabled_name(descriptor.hostname());
            let key_clash = peer.tunnel_key() == descriptor.pk();
            let addr_clash = descriptor
                .addrs()
                .iter()
                .any(|a| peer.has_enabled_address(a));
            if name_clash || key_clash || addr_clash {
                found.insert(peer.id());
            }
        }
        found.into_iter().collect()
    }

    /// Comma-joined ids of every enabled peer involved in a conflict, plus all
    /// enabled gateway peers when there is more than one. Empty when the
    /// store is consistent.
    #[must_use]
    pub fn conflicts(&self) -> String {
        let mut bad = BTreeSet::new();
        for peer in self.enabled() {
            if !self.conflicts_for(&peer.descriptor).is_empty() {
                bad.insert(peer.id());
            }
        }

        let mut names: BTreeMap<String, BTreeSet<PeerId>> = BTreeMap::new();
        let mut addrs: BTreeMap<IpAddr, BTreeSet<PeerId>> = BTreeMap::new();
        for peer in self.enabled() {
            for name in peer.enabled_names() {
                names
                    .entry(name.to_ascii_lowercase())
                    .or_default()
                    .insert(peer.id());
            }
            for addr in peer.enabled_addresses() {
                addrs.entry(addr).or_default().insert(peer.id());
            }
        }
        names
            .into_values()
            .chain(addrs.into_values())
            .filter(|ids| ids.len() > 1)
            .for_each(|ids| bad.extend(ids));

        let gateways: Vec<PeerId> = self
            .enabled()
            .filter(|p| p.use_as_gateway)
            .map(Peer::id)
            .collect();
        if gateways.len() > 1 {
            bad.extend(gateways);
        }

        bad.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// `(address, name)` pairs for every enabled name of every enabled peer.
    #[must_use]
    pub fn hosts_entries(&self) -> Vec<(IpAddr, String)> {
        self.enabled()
            .filter_map(|p| p.descriptor.addrs().first().map(|addr| (*addr, p)))
            .flat_map(|(addr, p)| p.enabled_names().map(move |n| (addr, n.to_string())))
            .collect()
    }

    /// The hosts entries rendered as `/etc/hosts` lines.
    #[must_use]
    pub fn render_hosts(&self) -> String {
        self.hosts_entries()
            .iter()
            .map(|(addr, name)| format!("{addr} {name}\n"))
            .collect()
    }
}

fn single<'a>(
    matches: Vec<&'a Peer>,
    what: impl FnOnce() -> String,
) -> Result<Option<&'a Peer>> {
    match matches.as_slice() {
        [] => Ok(None),
        [peer] => Ok(Some(*peer)),
        many => Err(OrganizeError::Consistency(format!(
            "{} enabled peers have {}",
            many.len(),
            what()
        ))),
    }
}
