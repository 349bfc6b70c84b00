//! The organize state machine: events, actions, triggers and handlers.
//!
//! Every handler works on the transaction's working copy through typed
//! [`StateWrite`]s. Untrusted input that should not change anything ends in
//! an `IGNORE` or `REJECT` action on a successful transaction; only
//! operator mistakes and broken invariants fail the transaction.

use std::net::IpAddr;

use ipnet::IpNet;
use lanmesh_engine::{Action, Event, Machine, Transaction, TransitionResult, Trigger, Violation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::descriptor::Descriptor;
use crate::edit::{EditPlan, UserEdit};
use crate::error::{OrganizeError, Result};
use crate::freshness::{AcceptAll, FreshnessPolicy};
use crate::keys::{PeerId, TunnelKey, VerifyKey};
use crate::peer::{gateway_routes, Peer};
use crate::state::{EventRecord, OrganizeState};
use crate::system::SystemState;
use crate::write::{PeerFlag, StateWrite};

/// Events the organizer accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrganizeEvent {
    /// The local network context changed.
    NewSystemState(SystemState),
    /// A verified descriptor arrived from discovery.
    IncomingDescriptor(Box<Descriptor>),
    /// An operator edit.
    UserEdit(UserEdit),
    /// Remove the peer matching an id, name or address.
    UserRemovePeer {
        /// Id, enabled name or enabled address.
        query: String,
    },
    /// Confirm that `hostname` belongs to `vk` and pin it.
    VerifyAndPinPeer {
        /// Expected peer id.
        vk: VerifyKey,
        /// Hostname to resolve.
        hostname: String,
    },
}

impl OrganizeEvent {
    /// Wraps a descriptor.
    #[must_use]
    pub fn incoming(descriptor: Descriptor) -> Self {
        Self::IncomingDescriptor(Box::new(descriptor))
    }
}

impl Event for OrganizeEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::NewSystemState(_) => "NEW_SYSTEM_STATE",
            Self::IncomingDescriptor(_) => "INCOMING_DESCRIPTOR",
            Self::UserEdit(_) => "USER_EDIT",
            Self::UserRemovePeer { .. } => "USER_REMOVE_PEER",
            Self::VerifyAndPinPeer { .. } => "VERIFY_AND_PIN_PEER",
        }
    }
}

/// Steps a handler took.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrganizeAction {
    /// Input dropped without complaint.
    Ignore {
        /// Why.
        reason: String,
    },
    /// Input refused.
    Reject {
        /// Why.
        reason: String,
    },
    /// A new peer was admitted.
    AcceptNewPeer {
        /// The peer.
        id: PeerId,
    },
    /// A known peer announced a newer descriptor.
    UpdatePeerDescriptor {
        /// The peer.
        id: PeerId,
    },
    /// A peer was removed.
    RemovePeer {
        /// The peer.
        id: PeerId,
    },
    /// An operator edit was applied.
    AcceptUserEdit,
    /// Gateway and subnet membership were re-evaluated.
    AdjustToNewSystemState,
    /// A peer was verified and pinned.
    VerifyAndPinPeer {
        /// The peer.
        id: PeerId,
    },
}

impl Action for OrganizeAction {
    fn name(&self) -> &'static str {
        match self {
            Self::Ignore { .. } => "IGNORE",
            Self::Reject { .. } => "REJECT",
            Self::AcceptNewPeer { .. } => "ACCEPT_NEW_PEER",
            Self::UpdatePeerDescriptor { .. } => "UPDATE_PEER_DESCRIPTOR",
            Self::RemovePeer { .. } => "REMOVE_PEER",
            Self::AcceptUserEdit => "ACCEPT_USER_EDIT",
            Self::AdjustToNewSystemState => "ADJUST_TO_NEW_SYSTEM_STATE",
            Self::VerifyAndPinPeer { .. } => "VERIFY_AND_PIN_PEER",
        }
    }
}

/// Side effects for the network-configuration collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OrganizeTrigger {
    /// Reconcile this peer's tunnel entry and routes.
    SyncPeer(PeerId),
    /// Remove the tunnel entry with this key.
    RemoveTunnelPeer(TunnelKey),
    /// Remove these routes.
    RemoveRoutes(Vec<IpNet>),
}

impl Trigger for OrganizeTrigger {
    fn name(&self) -> &'static str {
        match self {
            Self::SyncPeer(_) => "sync_peer",
            Self::RemoveTunnelPeer(_) => "remove_wg_peer",
            Self::RemoveRoutes(_) => "remove_routes",
        }
    }
}

type Tx = Transaction<OrganizeMachine>;

/// The organize machine. Holds policy only; all state lives in the engine.
#[derive(Debug)]
pub struct OrganizeMachine {
    freshness: Box<dyn FreshnessPolicy>,
}

impl Default for OrganizeMachine {
    fn default() -> Self {
        Self {
            freshness: Box::new(AcceptAll),
        }
    }
}

impl OrganizeMachine {
    /// Creates a machine with the accept-all freshness policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the freshness policy.
    #[must_use]
    pub fn with_freshness(mut self, policy: impl FreshnessPolicy + 'static) -> Self {
        self.freshness = Box::new(policy);
        self
    }

    fn ignore(tx: &mut Tx, reason: impl Into<String>) {
        let reason = reason.into();
        info!(reason = %reason, "ignoring");
        tx.action(OrganizeAction::Ignore { reason });
    }

    fn reject(tx: &mut Tx, reason: impl Into<String>) {
        let reason = reason.into();
        info!(reason = %reason, "rejecting");
        tx.action(OrganizeAction::Reject { reason });
    }

    fn incoming_descriptor(&self, descriptor: &Descriptor, tx: &mut Tx) -> Result<()> {
        let id = descriptor.id();
        let state = tx.state();

        if descriptor.pk() == &state.system_state.our_pk {
            Self::ignore(tx, "has our own key");
            return Ok(());
        }
        if !self.freshness.is_fresh(descriptor) {
            Self::reject(tx, format!("descriptor for {id} is not fresh"));
            return Ok(());
        }
        let existing = state.peers.get(&id).cloned();
        if let Some(peer) = &existing {
            if descriptor.vf() <= peer.descriptor.vf() {
                Self::ignore(
                    tx,
                    format!(
                        "replay: vf {} is not newer than {} for {}",
                        descriptor.vf(),
                        peer.descriptor.vf(),
                        peer.name_and_id()
                    ),
                );
                return Ok(());
            }
        }
        if !state.system_state.any_in_subnets(descriptor.addrs()) {
            Self::reject(tx, format!("wrong subnet for {}", descriptor.hostname()));
            return Ok(());
        }
        if !state.prefs.is_local(descriptor.hostname()) {
            Self::reject(tx, format!("invalid domain {}", descriptor.hostname()));
            return Ok(());
        }

        let conflicts = state.peers.conflicts_for(descriptor);
        if let Some(pinned) = conflicts
            .iter()
            .filter_map(|c| state.peers.get(c))
            .find(|p| p.pinned)
        {
            let reason = format!(
                "conflict with pinned peer {} for {}",
                pinned.name_and_id(),
                descriptor.hostname()
            );
            Self::reject(tx, reason);
            return Ok(());
        }
        for conflict in &conflicts {
            info!(peer = %conflict, incoming = %id, "removing conflicting peer");
            Self::remove_peer(conflict, tx)?;
        }

        let gateway_candidate = descriptor
            .addrs()
            .iter()
            .any(|a| tx.state().system_state.is_gateway(a));
        let gateway_free = tx
            .state()
            .peers
            .gateway()
            .is_none_or(|gw| gw.id() == id);
        let want_gateway = gateway_candidate && gateway_free;

        match existing {
            Some(peer) => {
                tx.action(OrganizeAction::UpdatePeerDescriptor { id });
                tx.write(StateWrite::SetDescriptor {
                    id,
                    descriptor: Box::new(descriptor.clone()),
                })?;
                for addr in descriptor.addrs() {
                    let known = match addr {
                        IpAddr::V4(a) => peer.ipv4_addrs.contains_key(a),
                        IpAddr::V6(a) => peer.ipv6_addrs.contains_key(a),
                    };
                    if !known {
                        tx.write(StateWrite::SetAddress {
                            id,
                            addr: *addr,
                            enabled: true,
                        })?;
                    }
                }
                if !peer.nicknames.contains_key(descriptor.hostname()) {
                    tx.write(StateWrite::SetNickname {
                        id,
                        name: descriptor.hostname().to_string(),
                        enabled: true,
                    })?;
                }
                if want_gateway && !peer.use_as_gateway {
                    tx.write(StateWrite::SetFlag {
                        id,
                        flag: PeerFlag::UseAsGateway,
                        value: true,
                    })?;
                }
                if peer.tunnel_key() != descriptor.pk() {
                    tx.trigger(OrganizeTrigger::RemoveTunnelPeer(*peer.tunnel_key()));
                }
                info!(peer = %peer.name_and_id(), vf = descriptor.vf(), "updated peer descriptor");
            }
            None => {
                let pinned = tx.state().prefs.pin_new_peers && !descriptor.is_ephemeral();
                let mut peer = Peer::from_descriptor(descriptor.clone(), pinned);
                peer.use_as_gateway = want_gateway;
                info!(peer = %peer.name_and_id(), pinned, gateway = want_gateway, "accepted new peer");
                tx.action(OrganizeAction::AcceptNewPeer { id });
                tx.write(StateWrite::InsertPeer(Box::new(peer)))?;
            }
        }
        tx.trigger(OrganizeTrigger::SyncPeer(id));
        Ok(())
    }

    /// Deletes a peer and asks for its tunnel entry and routes to go.
    fn remove_peer(id: &PeerId, tx: &mut Tx) -> Result<()> {
        let peer = tx
            .state()
            .peers
            .get(id)
            .cloned()
            .ok_or_else(|| OrganizeError::Consistency(format!("peer {id} vanished mid-transaction")))?;
        tx.action(OrganizeAction::RemovePeer { id: *id });
        tx.write(StateWrite::RemovePeer(*id))?;
        tx.trigger(OrganizeTrigger::RemoveTunnelPeer(*peer.tunnel_key()));
        tx.trigger(OrganizeTrigger::RemoveRoutes(peer.routes()));
        if peer.use_as_gateway {
            tx.trigger(OrganizeTrigger::RemoveRoutes(gateway_routes().to_vec()));
        }
        info!(peer = %peer.name_and_id(), "removed peer");
        Ok(())
    }

    fn new_system_state(new: &SystemState, tx: &mut Tx) -> Result<()> {
        tx.action(OrganizeAction::AdjustToNewSystemState);

        let current = tx.state().peers.gateway().cloned();
        let mut gateway_pinned = false;
        if let Some(gw) = &current {
            gateway_pinned = gw.pinned;
            let still_offered = gw.enabled_addresses().iter().any(|a| new.is_gateway(a));
            if !gw.pinned && !still_offered {
                Self::set_gateway(gw.id(), false, tx)?;
            }
        }

        if !gateway_pinned {
            for addr in &new.gateways {
                let Some(candidate) = tx.state().peers.with_ip(addr)?.map(Peer::id) else {
                    continue;
                };
                if let Some(old) = tx.state().peers.gateway().map(Peer::id) {
                    if old != candidate {
                        Self::set_gateway(old, false, tx)?;
                    }
                }
                let already = tx
                    .state()
                    .peers
                    .get(&candidate)
                    .is_some_and(|p| p.use_as_gateway);
                if !already {
                    Self::set_gateway(candidate, true, tx)?;
                }
                break;
            }
        }

        let departed: Vec<PeerId> = tx
            .state()
            .peers
            .peers()
            .filter(|p| !p.pinned)
            .filter(|p| !new.any_in_subnets(p.enabled_addresses().iter()))
            .map(Peer::id)
            .collect();
        for id in &departed {
            Self::remove_peer(id, tx)?;
        }

        if tx.state().system_state != *new {
            tx.write(StateWrite::SetSystemState(Box::new(new.clone())))?;
        }
        Ok(())
    }

    fn set_gateway(id: PeerId, value: bool, tx: &mut Tx) -> Result<()> {
        debug!(peer = %id, value, "setting gateway flag");
        tx.write(StateWrite::SetFlag {
            id,
            flag: PeerFlag::UseAsGateway,
            value,
        })?;
        tx.trigger(OrganizeTrigger::SyncPeer(id));
        Ok(())
    }

    fn user_edit(edit: &UserEdit, tx: &mut Tx) -> Result<()> {
        let plan = edit.plan(tx.state())?;
        tx.action(OrganizeAction::AcceptUserEdit);
        match plan {
            EditPlan::RemovePeer(id) => Self::remove_peer(&id, tx)?,
            EditPlan::Write { write, peer } => {
                tx.write(write)?;
                if let Some(id) = peer {
                    tx.trigger(OrganizeTrigger::SyncPeer(id));
                }
            }
        }
        info!(edit = %edit, "applied user edit");
        Ok(())
    }

    fn user_remove_peer(query: &str, tx: &mut Tx) -> Result<()> {
        match tx.state().peers.query(query)?.map(Peer::id) {
            Some(id) => Self::remove_peer(&id, tx),
            None => {
                Self::ignore(tx, format!("no peer matches {query:?}"));
                Ok(())
            }
        }
    }

    fn verify_and_pin(vk: &VerifyKey, hostname: &str, tx: &mut Tx) -> Result<()> {
        let peer = tx
            .state()
            .peers
            .with_hostname(hostname)?
            .ok_or_else(|| OrganizeError::HostnameNotFound(hostname.to_string()))?;
        let id = peer.id();
        if id != *vk {
            return Err(OrganizeError::KeyMismatch {
                hostname: hostname.to_string(),
                expected: vk.to_string(),
                actual: id.to_string(),
            });
        }
        tx.action(OrganizeAction::VerifyAndPinPeer { id });
        for flag in [PeerFlag::Verified, PeerFlag::Pinned] {
            tx.write(StateWrite::SetFlag {
                id,
                flag,
                value: true,
            })?;
        }
        tx.trigger(OrganizeTrigger::SyncPeer(id));
        info!(peer = %id, hostname, "verified and pinned peer");
        Ok(())
    }
}

impl Machine for OrganizeMachine {
    type State = OrganizeState;
    type Event = OrganizeEvent;
    type Action = OrganizeAction;
    type Mutation = StateWrite;
    type Trigger = OrganizeTrigger;
    type Error = OrganizeError;

    fn handle(&self, event: &OrganizeEvent, tx: &mut Tx) -> Result<()> {
        match event {
            OrganizeEvent::NewSystemState(new) => Self::new_system_state(new, tx),
            OrganizeEvent::IncomingDescriptor(descriptor) => self.incoming_descriptor(descriptor, tx),
            OrganizeEvent::UserEdit(edit) => Self::user_edit(edit, tx),
            OrganizeEvent::UserRemovePeer { query } => Self::user_remove_peer(query, tx),
            OrganizeEvent::VerifyAndPinPeer { vk, hostname } => Self::verify_and_pin(vk, hostname, tx),
        }
    }

    fn validate(&self, state: &OrganizeState) -> Vec<Violation> {
        state.validate()
    }

    fn record(&self, state: &mut OrganizeState, result: &TransitionResult<Self>) {
        if !state.prefs.record_events {
            return;
        }
        state.event_log.push(EventRecord {
            event: result.event.clone(),
            actions: result.action_names().into_iter().map(String::from).collect(),
            writes: result
                .write_paths()
                .into_iter()
                .map(|(op, path)| format!("{op} {path}"))
                .collect(),
            triggers: result.triggers.names().map(String::from).collect(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freshness::ValidityWindow;
    use crate::peer::tests::descriptor;
    use lanmesh_engine::{Engine, Failure, WriteOp};
    use std::collections::BTreeMap;

    fn lan() -> SystemState {
        SystemState {
            current_subnets: BTreeMap::from([(
                "10.0.0.0/24".parse().unwrap(),
                vec!["10.0.0.2".parse().unwrap()],
            )]),
            gateways: vec!["10.0.0.1".parse().unwrap()],
            our_pk: TunnelKey::from_bytes_array([0xEE; 32]),
        }
    }

    fn engine() -> Engine<OrganizeMachine> {
        let state = OrganizeState {
            system_state: lan(),
            ..OrganizeState::default()
        };
        Engine::new(OrganizeMachine::new(), state)
    }

    fn id(n: u8) -> PeerId {
        PeerId::from_bytes_array([n; 32])
    }

    fn admit(engine: &mut Engine<OrganizeMachine>, d: Descriptor) -> TransitionResult<OrganizeMachine> {
        engine.handle(OrganizeEvent::incoming(d))
    }

    #[test]
    fn accepts_new_peer() {
        let mut e = engine();
        let r = admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5"]));
        assert!(r.ok());
        assert_eq!(r.action_names(), vec!["ACCEPT_NEW_PEER"]);
        assert_eq!(r.triggers.get("sync_peer"), &[OrganizeTrigger::SyncPeer(id(1))]);
        assert!(e.state().peers.contains(&id(1)));
    }

    #[test]
    fn own_key_is_ignored() {
        let mut e = engine();
        let d = Descriptor::new(
            id(1),
            TunnelKey::from_bytes_array([0xEE; 32]),
            crate::keys::PqKey::from_bytes_array([1; 64]),
            "me.local.",
            5354,
            vec!["10.0.0.2".parse().unwrap()],
        )
        .unwrap();
        let r = admit(&mut e, d);
        assert!(r.ok());
        assert_eq!(r.action_names(), vec!["IGNORE"]);
        assert!(e.state().peers.is_empty());
    }

    #[test]
    fn wrong_subnet_and_domain_rejected() {
        let mut e = engine();
        let r = admit(&mut e, descriptor(1, "a.local.", &["192.168.1.5"]));
        assert_eq!(r.actions, vec![OrganizeAction::Reject { reason: "wrong subnet for a.local.".into() }]);
        let r = admit(&mut e, descriptor(1, "a.example.", &["10.0.0.5"]));
        assert_eq!(r.actions, vec![OrganizeAction::Reject { reason: "invalid domain a.example.".into() }]);
        assert!(e.state().peers.is_empty());
    }

    #[test]
    fn newer_descriptor_updates_and_merges() {
        let mut e = engine();
        admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5"]));
        let r = admit(&mut e, descriptor(1, "b.local.", &["10.0.0.6"]).with_vf(200));
        assert!(r.ok());
        assert_eq!(r.action_names(), vec!["UPDATE_PEER_DESCRIPTOR"]);
        let peer = e.state().peers.get(&id(1)).unwrap();
        assert_eq!(peer.descriptor.vf(), 200);
        assert_eq!(peer.enabled_addresses().len(), 2);
        assert_eq!(peer.nicknames.len(), 2);
        assert_eq!(peer.name(), "b.local.");
    }

    #[test]
    fn updated_tunnel_key_removes_old_entry() {
        let mut e = engine();
        admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5"]));
        let rotated = Descriptor::new(
            id(1),
            TunnelKey::from_bytes_array([42; 32]),
            crate::keys::PqKey::from_bytes_array([1; 64]),
            "a.local.",
            5354,
            vec!["10.0.0.5".parse().unwrap()],
        )
        .unwrap()
        .with_vf(300);
        let r = admit(&mut e, rotated);
        assert_eq!(
            r.triggers.get("remove_wg_peer"),
            &[OrganizeTrigger::RemoveTunnelPeer(TunnelKey::from_bytes_array([101; 32]))]
        );
    }

    #[test]
    fn gateway_address_sets_flag_on_admission() {
        let mut e = engine();
        admit(&mut e, descriptor(1, "gw.local.", &["10.0.0.1"]));
        assert!(e.state().peers.get(&id(1)).unwrap().use_as_gateway);
    }

    #[test]
    fn stale_descriptor_is_rejected() {
        let state = OrganizeState {
            system_state: lan(),
            ..OrganizeState::default()
        };
        let machine = OrganizeMachine::new().with_freshness(ValidityWindow::new(10));
        let mut e = Engine::new(machine, state);

        let r = admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5"]));
        assert!(r.ok());
        assert_eq!(r.action_names(), vec!["REJECT"]);
        assert!(r.writes.is_empty());
        assert!(r.triggers.is_empty());
        assert!(e.state().peers.is_empty());

        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap();
        let r = admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5"]).with_vf(now));
        assert_eq!(r.action_names(), vec!["ACCEPT_NEW_PEER"]);
    }

    #[test]
    fn gateway_address_sets_flag_on_update() {
        let mut e = engine();
        admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5"]));
        assert!(!e.state().peers.get(&id(1)).unwrap().use_as_gateway);

        let r = admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5", "10.0.0.1"]).with_vf(200));
        assert!(r.ok());
        assert_eq!(r.action_names(), vec!["UPDATE_PEER_DESCRIPTOR"]);
        assert!(e.state().peers.get(&id(1)).unwrap().use_as_gateway);
        assert_eq!(e.state().peers.conflicts(), "");
    }

    #[test]
    fn second_gateway_candidate_is_not_flagged() {
        let mut e = engine();
        let mut two = lan();
        two.gateways.push("10.0.0.7".parse().unwrap());
        e.handle(OrganizeEvent::NewSystemState(two));
        admit(&mut e, descriptor(1, "a.local.", &["10.0.0.1"]));
        e.handle(OrganizeEvent::VerifyAndPinPeer { vk: id(1), hostname: "a.local.".into() });

        let r = admit(&mut e, descriptor(2, "b.local.", &["10.0.0.7"]));
        assert_eq!(r.action_names(), vec!["ACCEPT_NEW_PEER"]);
        let r = admit(&mut e, descriptor(2, "b.local.", &["10.0.0.7"]).with_vf(200));
        assert_eq!(r.action_names(), vec!["UPDATE_PEER_DESCRIPTOR"]);
        assert!(e.state().peers.get(&id(1)).unwrap().use_as_gateway);
        assert!(!e.state().peers.get(&id(2)).unwrap().use_as_gateway);
        assert_eq!(e.state().peers.conflicts(), "");
    }

    #[test]
    fn gateway_follows_offer_order() {
        let mut e = engine();
        admit(&mut e, descriptor(1, "a.local.", &["10.0.0.1"]));
        admit(&mut e, descriptor(2, "b.local.", &["10.0.0.7"]));

        let mut reordered = lan();
        reordered.gateways = vec!["10.0.0.7".parse().unwrap(), "10.0.0.1".parse().unwrap()];
        let r = e.handle(OrganizeEvent::NewSystemState(reordered));
        assert!(r.ok());
        assert_eq!(
            r.triggers.get("sync_peer"),
            &[OrganizeTrigger::SyncPeer(id(1)), OrganizeTrigger::SyncPeer(id(2))]
        );
        assert!(!e.state().peers.get(&id(1)).unwrap().use_as_gateway);
        assert!(e.state().peers.get(&id(2)).unwrap().use_as_gateway);
    }

    #[test]
    fn hostname_conflict_ignores_case() {
        let mut e = engine();
        admit(&mut e, descriptor(1, "A.local.", &["10.0.0.5"]));
        let r = admit(&mut e, descriptor(2, "a.local.", &["10.0.0.6"]));
        assert_eq!(r.action_names(), vec!["REMOVE_PEER", "ACCEPT_NEW_PEER"]);
        assert!(!e.state().peers.contains(&id(1)));
        assert!(e.state().peers.contains(&id(2)));
    }

    #[test]
    fn pin_new_peers_respects_ephemeral() {
        let mut e = engine();
        e.handle(OrganizeEvent::UserEdit(UserEdit::new(WriteOp::Set, "prefs.pin_new_peers", "true")));
        admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5"]));
        admit(&mut e, descriptor(2, "b.local.", &["10.0.0.6"]).with_ephemeral(true));
        assert!(e.state().peers.get(&id(1)).unwrap().pinned);
        assert!(!e.state().peers.get(&id(2)).unwrap().pinned);
    }

    #[test]
    fn conflict_removes_unpinned_peer_with_triggers() {
        let mut e = engine();
        admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5"]));
        let r = admit(&mut e, descriptor(2, "b.local.", &["10.0.0.5"]));
        assert_eq!(r.action_names(), vec!["REMOVE_PEER", "ACCEPT_NEW_PEER"]);
        assert_eq!(r.triggers.names().collect::<Vec<_>>(), vec!["remove_wg_peer", "remove_routes", "sync_peer"]);
        assert!(!e.state().peers.contains(&id(1)));
        assert!(e.state().peers.contains(&id(2)));
    }

    #[test]
    fn verify_and_pin_matches_key() {
        let mut e = engine();
        admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5"]));
        let r = e.handle(OrganizeEvent::VerifyAndPinPeer { vk: id(1), hostname: "a.local.".into() });
        assert!(r.ok());
        let peer = e.state().peers.get(&id(1)).unwrap();
        assert!(peer.pinned && peer.verified);
    }

    #[test]
    fn verify_and_pin_mismatch_is_hard_failure() {
        let mut e = engine();
        admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5"]));
        let r = e.handle(OrganizeEvent::VerifyAndPinPeer { vk: id(2), hostname: "a.local.".into() });
        assert!(matches!(r.error, Some(Failure::Handler(_))));
        assert!(!e.state().peers.get(&id(1)).unwrap().pinned);
    }

    #[test]
    fn verify_and_pin_unknown_hostname_fails() {
        let mut e = engine();
        let r = e.handle(OrganizeEvent::VerifyAndPinPeer { vk: id(1), hostname: "x.local.".into() });
        assert!(!r.ok());
    }

    #[test]
    fn user_remove_peer_by_name() {
        let mut e = engine();
        admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5"]));
        let r = e.handle(OrganizeEvent::UserRemovePeer { query: "a.local.".into() });
        assert_eq!(r.action_names(), vec!["REMOVE_PEER"]);
        let r = e.handle(OrganizeEvent::UserRemovePeer { query: "a.local.".into() });
        assert_eq!(r.action_names(), vec!["IGNORE"]);
    }

    #[test]
    fn user_edit_that_breaks_invariants_is_discarded() {
        let mut e = engine();
        admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5"]));
        admit(&mut e, descriptor(2, "b.local.", &["10.0.0.6"]));
        let edit = UserEdit::new(WriteOp::Set, format!("peers.{}.nicknames.a.local.", id(2)), "on");
        let r = e.handle(OrganizeEvent::UserEdit(edit));
        assert!(matches!(r.error, Some(Failure::Invalid(_))));
        assert!(r.triggers.is_empty());
        assert_eq!(e.state().peers.get(&id(2)).unwrap().nicknames.len(), 1);
    }

    #[test]
    fn user_edit_remove_peer_runs_removal() {
        let mut e = engine();
        admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5"]));
        let edit = UserEdit::new(WriteOp::Remove, format!("peers.{}", id(1)), "");
        let r = e.handle(OrganizeEvent::UserEdit(edit));
        assert_eq!(r.action_names(), vec!["ACCEPT_USER_EDIT", "REMOVE_PEER"]);
        assert!(r.triggers.get("remove_wg_peer").len() == 1);
    }

    #[test]
    fn removal_without_routes_still_asks_for_route_removal() {
        let mut e = engine();
        admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5"]));
        let off = UserEdit::new(WriteOp::Set, format!("peers.{}.IPv4addrs.10.0.0.5", id(1)), "off");
        assert!(e.handle(OrganizeEvent::UserEdit(off)).ok());

        let r = e.handle(OrganizeEvent::UserRemovePeer { query: id(1).to_string() });
        assert_eq!(r.action_names(), vec!["REMOVE_PEER"]);
        assert_eq!(r.triggers.get("remove_routes"), &[OrganizeTrigger::RemoveRoutes(vec![])]);
    }

    #[test]
    fn gateway_moves_with_system_state() {
        let mut e = engine();
        admit(&mut e, descriptor(1, "a.local.", &["10.0.0.1"]));
        admit(&mut e, descriptor(2, "b.local.", &["10.0.0.7"]));
        assert!(e.state().peers.get(&id(1)).unwrap().use_as_gateway);

        let mut moved = lan();
        moved.gateways = vec!["10.0.0.7".parse().unwrap()];
        let r = e.handle(OrganizeEvent::NewSystemState(moved.clone()));
        assert!(r.ok());
        assert!(!e.state().peers.get(&id(1)).unwrap().use_as_gateway);
        assert!(e.state().peers.get(&id(2)).unwrap().use_as_gateway);
        assert_eq!(e.state().system_state, moved);
    }

    #[test]
    fn pinned_gateway_survives_system_state() {
        let mut e = engine();
        admit(&mut e, descriptor(1, "a.local.", &["10.0.0.1"]));
        admit(&mut e, descriptor(2, "b.local.", &["10.0.0.7"]));
        e.handle(OrganizeEvent::VerifyAndPinPeer { vk: id(1), hostname: "a.local.".into() });
        let mut moved = lan();
        moved.gateways = vec!["10.0.0.7".parse().unwrap()];
        e.handle(OrganizeEvent::NewSystemState(moved));
        assert!(e.state().peers.get(&id(1)).unwrap().use_as_gateway);
        assert!(!e.state().peers.get(&id(2)).unwrap().use_as_gateway);
    }

    #[test]
    fn records_events_when_enabled() {
        let mut e = engine();
        admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5"]));
        assert!(e.state().event_log.is_empty());
        e.handle(OrganizeEvent::UserEdit(UserEdit::new(WriteOp::Set, "prefs.record_events", "yes")));
        admit(&mut e, descriptor(2, "b.local.", &["10.0.0.6"]));
        let log: Vec<String> = e.state().event_log.iter().map(ToString::to_string).collect();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], "USER_EDIT: [ACCEPT_USER_EDIT] [SET prefs.record_events] []");
        assert!(log[1].starts_with("INCOMING_DESCRIPTOR: [ACCEPT_NEW_PEER] [ADD peers."));
        assert!(log[1].ends_with("[sync_peer]"));
    }

    #[test]
    fn result_serializes_with_engine_shape() {
        let mut e = engine();
        let r = admit(&mut e, descriptor(1, "a.local.", &["10.0.0.5"]));
        let value = serde_json::to_value(&r).unwrap();
        assert_eq!(value["event"], "INCOMING_DESCRIPTOR");
        assert_eq!(value["ok"], true);
        assert_eq!(value["actions"][0]["action"], "ACCEPT_NEW_PEER");
        assert_eq!(value["writes"][0]["op"], "ADD");
        assert_eq!(value["triggers"]["sync_peer"][0], id(1).to_string());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn gateway_election_ignores_admission_order(order in Just((1u8..=4).collect::<Vec<_>>()).prop_shuffle()) {
                let mut e = engine();
                for n in &order {
                    let addr = format!("10.0.0.{}", 10 + n);
                    admit(&mut e, descriptor(*n, &format!("p{n}.local."), &[addr.as_str()]));
                }
                let mut snapshot = lan();
                snapshot.gateways = vec![
                    "10.0.0.99".parse().unwrap(),
                    "10.0.0.13".parse().unwrap(),
                    "10.0.0.12".parse().unwrap(),
                ];
                let r = e.handle(OrganizeEvent::NewSystemState(snapshot));
                prop_assert!(r.ok());
                let gateways: Vec<PeerId> = e.state().peers.peers().filter(|p| p.use_as_gateway).map(Peer::id).collect();
                prop_assert_eq!(gateways, vec![id(3)]);
            }

            #[test]
            fn committed_state_never_conflicts(
                announcements in prop::collection::vec((1u8..=5, 5u8..=8, 1u64..50), 1..20)
            ) {
                let mut e = engine();
                for (n, host, vf) in announcements {
                    let hostname = format!("h{host}.local.");
                    let addr = format!("10.0.0.{host}");
                    admit(&mut e, descriptor(n, &hostname, &[addr.as_str()]).with_vf(vf));
                    prop_assert_eq!(e.state().peers.conflicts(), "");
                }
            }
        }
    }
}
