//! The top-level organize state and its invariants.

use std::fmt;

use lanmesh_engine::{Event, Violation};
use serde::{Deserialize, Serialize};

use crate::organize::OrganizeEvent;
use crate::prefs::Prefs;
use crate::store::PeerStore;
use crate::system::SystemState;

/// Everything the organizer persists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizeState {
    /// Operator preferences.
    pub prefs: Prefs,
    /// Known peers keyed by id.
    pub peers: PeerStore,
    /// Latest local network snapshot.
    pub system_state: SystemState,
    /// Committed events, recorded when `prefs.record_events` is set.
    pub event_log: Vec<EventRecord>,
}

impl OrganizeState {
    /// Checks every invariant a committed state must hold.
    #[must_use]
    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (key, peer) in self.peers.iter() {
            if *key != peer.id() {
                violations.push(Violation::new(
                    "peer_key",
                    format!("entry {key} holds descriptor for {}", peer.id()),
                ));
            }
        }
        let conflicts = self.peers.conflicts();
        if !conflicts.is_empty() {
            violations.push(Violation::new("conflicts", conflicts));
        }
        let gateways = self.peers.enabled().filter(|p| p.use_as_gateway).count();
        if gateways > 1 {
            violations.push(Violation::new(
                "single_gateway",
                format!("{gateways} enabled peers flagged as gateway"),
            ));
        }
        violations
    }
}

/// A committed event and the names of what it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// The event as delivered.
    pub event: OrganizeEvent,
    /// Action names in order.
    pub actions: Vec<String>,
    /// `OP path` for each write.
    pub writes: Vec<String>,
    /// Trigger names.
    pub triggers: Vec<String>,
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: [{}] [{}] [{}]",
            self.event.name(),
            self.actions.join(", "),
            self.writes.join(", "),
            self.triggers.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::tests::descriptor;
    use crate::peer::Peer;
    use crate::keys::PeerId;

    #[test]
    fn default_state_is_valid() {
        assert!(OrganizeState::default().validate().is_empty());
    }

    #[test]
    fn shared_address_is_a_violation() {
        let mut state = OrganizeState::default();
        state.peers.insert(Peer::from_descriptor(descriptor(1, "a.local.", &["10.0.0.5"]), false));
        state.peers.insert(Peer::from_descriptor(descriptor(2, "b.local.", &["10.0.0.5"]), false));
        let violations = state.validate();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].invariant, "conflicts");
    }

    #[test]
    fn two_gateways_violate_both_checks() {
        let mut state = OrganizeState::default();
        for (id, host, addr) in [(1, "a.local.", "10.0.0.5"), (2, "b.local.", "10.0.0.6")] {
            let mut peer = Peer::from_descriptor(descriptor(id, host, &[addr]), false);
            peer.use_as_gateway = true;
            state.peers.insert(peer);
        }
        let names: Vec<String> = state.validate().into_iter().map(|v| v.invariant).collect();
        assert_eq!(names, vec!["conflicts", "single_gateway"]);
    }

    #[test]
    fn mismatched_key_detected_after_load() {
        let peer = Peer::from_descriptor(descriptor(1, "a.local.", &["10.0.0.5"]), false);
        let wrong = PeerId::from_bytes_array([7; 32]);
        let json = serde_json::json!({ "peers": { wrong.to_string(): peer } });
        let state: OrganizeState = serde_json::from_value(json).unwrap();
        assert_eq!(state.validate()[0].invariant, "peer_key");
    }

    #[test]
    fn top_level_shape() {
        let value = serde_json::to_value(OrganizeState::default()).unwrap();
        for key in ["prefs", "peers", "system_state", "event_log"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }
}
