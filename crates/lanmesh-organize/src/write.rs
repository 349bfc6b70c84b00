//! Typed primitive writes against [`OrganizeState`].
//!
//! Each write knows its primitive operation and the dotted path it targets,
//! which is what a transition result reports.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use lanmesh_engine::{Mutation, MutationError, WriteOp};
use serde::Serialize;

use crate::descriptor::Descriptor;
use crate::keys::PeerId;
use crate::peer::Peer;
use crate::state::OrganizeState;
use crate::system::SystemState;

/// Boolean peer fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerFlag {
    /// `pinned`
    Pinned,
    /// `verified`
    Verified,
    /// `enabled`
    Enabled,
    /// `use_as_gateway`
    UseAsGateway,
}

impl PeerFlag {
    /// Field name in the persisted state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pinned => "pinned",
            Self::Verified => "verified",
            Self::Enabled => "enabled",
            Self::UseAsGateway => "use_as_gateway",
        }
    }

    fn slot(self, peer: &mut Peer) -> &mut bool {
        match self {
            Self::Pinned => &mut peer.pinned,
            Self::Verified => &mut peer.verified,
            Self::Enabled => &mut peer.enabled,
            Self::UseAsGateway => &mut peer.use_as_gateway,
        }
    }
}

impl fmt::Display for PeerFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeerFlag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pinned" => Ok(Self::Pinned),
            "verified" => Ok(Self::Verified),
            "enabled" => Ok(Self::Enabled),
            "use_as_gateway" => Ok(Self::UseAsGateway),
            _ => Err(()),
        }
    }
}

/// One primitive change to the organize state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateWrite {
    /// Adds a new peer.
    InsertPeer(Box<Peer>),
    /// Deletes a peer.
    RemovePeer(PeerId),
    /// Replaces a peer's descriptor. The id must not change.
    SetDescriptor {
        /// Target peer.
        id: PeerId,
        /// New descriptor.
        descriptor: Box<Descriptor>,
    },
    /// Sets a nickname's enabled bit, adding it if absent.
    SetNickname {
        /// Target peer.
        id: PeerId,
        /// Hostname.
        name: String,
        /// Enabled bit.
        enabled: bool,
    },
    /// Forgets a nickname.
    RemoveNickname {
        /// Target peer.
        id: PeerId,
        /// Hostname.
        name: String,
    },
    /// Sets an address's enabled bit, adding it if absent.
    SetAddress {
        /// Target peer.
        id: PeerId,
        /// Address.
        addr: IpAddr,
        /// Enabled bit.
        enabled: bool,
    },
    /// Forgets an address.
    RemoveAddress {
        /// Target peer.
        id: PeerId,
        /// Address.
        addr: IpAddr,
    },
    /// Sets a boolean peer field.
    SetFlag {
        /// Target peer.
        id: PeerId,
        /// Which field.
        flag: PeerFlag,
        /// New value.
        value: bool,
    },
    /// Sets or clears the petname.
    SetPetname {
        /// Target peer.
        id: PeerId,
        /// New petname; empty clears.
        petname: String,
    },
    /// Replaces the system state snapshot.
    SetSystemState(Box<SystemState>),
    /// `prefs.pin_new_peers`
    SetPinNewPeers(bool),
    /// `prefs.record_events`
    SetRecordEvents(bool),
    /// Replaces `prefs.local_domains`.
    SetLocalDomains(Vec<String>),
    /// Appends a local domain if absent.
    AddLocalDomain(String),
    /// Removes a local domain.
    RemoveLocalDomain(String),
}

fn family(addr: &IpAddr) -> &'static str {
    match addr {
        IpAddr::V4(_) => "IPv4addrs",
        IpAddr::V6(_) => "IPv6addrs",
    }
}

impl StateWrite {
    fn target(&self) -> Option<&PeerId> {
        match self {
            Self::RemovePeer(id)
            | Self::SetDescriptor { id, .. }
            | Self::SetNickname { id, .. }
            | Self::RemoveNickname { id, .. }
            | Self::SetAddress { id, .. }
            | Self::RemoveAddress { id, .. }
            | Self::SetFlag { id, .. }
            | Self::SetPetname { id, .. } => Some(id),
            _ => None,
        }
    }

    fn peer_mut<'a>(&self, state: &'a mut OrganizeState) -> Result<&'a mut Peer, MutationError> {
        let path = self.path();
        let id = self
            .target()
            .ok_or_else(|| MutationError::new(path.as_str(), "not a peer write"))?;
        state
            .peers
            .get_mut(id)
            .ok_or_else(|| MutationError::new(path, "no such peer"))
    }
}

impl Mutation<OrganizeState> for StateWrite {
    fn apply(&self, state: &mut OrganizeState) -> Result<(), MutationError> {
        match self {
            Self::InsertPeer(peer) => {
                if state.peers.contains(&peer.id()) {
                    return Err(MutationError::new(self.path(), "peer already exists"));
                }
                state.peers.insert((**peer).clone());
            }
            Self::RemovePeer(id) => {
                state
                    .peers
                    .remove(id)
                    .ok_or_else(|| MutationError::new(self.path(), "no such peer"))?;
            }
            Self::SetDescriptor { id, descriptor } => {
                if descriptor.id() != *id {
                    return Err(MutationError::new(self.path(), "descriptor belongs to another peer"));
                }
                self.peer_mut(state)?.descriptor = (**descriptor).clone();
            }
            Self::SetNickname { name, enabled, .. } => {
                self.peer_mut(state)?.nicknames.insert(name.clone(), *enabled);
            }
            Self::RemoveNickname { name, .. } => {
                let path = self.path();
                self.peer_mut(state)?
                    .nicknames
                    .remove(name)
                    .ok_or_else(|| MutationError::new(path, "no such nickname"))?;
            }
            Self::SetAddress { addr, enabled, .. } => {
                let peer = self.peer_mut(state)?;
                match addr {
                    IpAddr::V4(a) => peer.ipv4_addrs.insert(*a, *enabled),
                    IpAddr::V6(a) => peer.ipv6_addrs.insert(*a, *enabled),
                };
            }
            Self::RemoveAddress { addr, .. } => {
                let path = self.path();
                let peer = self.peer_mut(state)?;
                let removed = match addr {
                    IpAddr::V4(a) => peer.ipv4_addrs.remove(a),
                    IpAddr::V6(a) => peer.ipv6_addrs.remove(a),
                };
                removed.ok_or_else(|| MutationError::new(path, "no such address"))?;
            }
            Self::SetFlag { flag, value, .. } => {
                *flag.slot(self.peer_mut(state)?) = *value;
            }
            Self::SetPetname { petname, .. } => {
                self.peer_mut(state)?.petname.clone_from(petname);
            }
            Self::SetSystemState(system) => state.system_state = (**system).clone(),
            Self::SetPinNewPeers(value) => state.prefs.pin_new_peers = *value,
            Self::SetRecordEvents(value) => state.prefs.record_events = *value,
            Self::SetLocalDomains(domains) => state.prefs.local_domains.clone_from(domains),
            Self::AddLocalDomain(domain) => {
                if !state.prefs.local_domains.contains(domain) {
                    state.prefs.local_domains.push(domain.clone());
                }
            }
            Self::RemoveLocalDomain(domain) => {
                let before = state.prefs.local_domains.len();
                state.prefs.local_domains.retain(|d| d != domain);
                if state.prefs.local_domains.len() == before {
                    return Err(MutationError::new(self.path(), format!("{domain:?} not present")));
                }
            }
        }
        Ok(())
    }

    fn op(&self) -> WriteOp {
        match self {
            Self::InsertPeer(_) | Self::AddLocalDomain(_) => WriteOp::Add,
            Self::RemovePeer(_)
            | Self::RemoveNickname { .. }
            | Self::RemoveAddress { .. }
            | Self::RemoveLocalDomain(_) => WriteOp::Remove,
            _ => WriteOp::Set,
        }
    }

    fn path(&self) -> String {
        match self {
            Self::InsertPeer(peer) => format!("peers.{}", peer.id()),
            Self::RemovePeer(id) => format!("peers.{id}"),
            Self::SetDescriptor { id, .. } => format!("peers.{id}.descriptor"),
            Self::SetNickname { id, name, .. } | Self::RemoveNickname { id, name } => {
                format!("peers.{id}.nicknames.{name}")
            }
            Self::SetAddress { id, addr, .. } | Self::RemoveAddress { id, addr } => {
                format!("peers.{id}.{}.{addr}", family(addr))
            }
            Self::SetFlag { id, flag, .. } => format!("peers.{id}.{flag}"),
            Self::SetPetname { id, .. } => format!("peers.{id}.petname"),
            Self::SetSystemState(_) => "system_state".to_string(),
            Self::SetPinNewPeers(_) => "prefs.pin_new_peers".to_string(),
            Self::SetRecordEvents(_) => "prefs.record_events".to_string(),
            Self::SetLocalDomains(_) | Self::AddLocalDomain(_) | Self::RemoveLocalDomain(_) => {
                "prefs.local_domains".to_string()
            }
        }
    }
}
