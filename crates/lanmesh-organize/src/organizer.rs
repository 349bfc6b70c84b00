//! Single-writer front end over the organize engine.
//!
//! Discovery listeners, control surfaces and system watchers all deliver
//! events through one [`Organizer`]. The engine sits behind a mutex, so each
//! event runs to completion before the next begins. Persistence and cache
//! maintenance happen after commit, while the lock is still held.

use lanmesh_engine::{Engine, Failure, TransitionResult};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::descriptor::Descriptor;
use crate::error::{OrganizeError, Result};
use crate::keys::PeerId;
use crate::organize::{OrganizeEvent, OrganizeMachine};
use crate::peer::TunnelPeerConfig;
use crate::persist::StateFile;
use crate::psk::{KeyAgreement, PskCache};
use crate::state::OrganizeState;

/// Result type produced by the organize engine.
pub type OrganizeResult = TransitionResult<OrganizeMachine>;

/// Thread-safe organizer.
pub struct Organizer {
    engine: Mutex<Engine<OrganizeMachine>>,
    psk: Mutex<PskCache>,
    state_file: Option<StateFile>,
    key_agreement: Option<Box<dyn KeyAgreement>>,
}

impl Organizer {
    /// Creates an organizer over an in-memory state.
    ///
    /// Fails if `state` does not satisfy the committed-state invariants.
    pub fn new(machine: OrganizeMachine, state: OrganizeState) -> Result<Self> {
        let violations = state.validate();
        if !violations.is_empty() {
            let detail = violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(OrganizeError::InvalidState(detail));
        }
        Ok(Self {
            engine: Mutex::new(Engine::new(machine, state)),
            psk: Mutex::new(PskCache::new()),
            state_file: None,
            key_agreement: None,
        })
    }

    /// Loads state from `file` and saves back to it after every change.
    pub fn open(machine: OrganizeMachine, file: StateFile) -> Result<Self> {
        let state = file.load()?;
        let mut organizer = Self::new(machine, state)?;
        organizer.state_file = Some(file);
        Ok(organizer)
    }

    /// Uses `agreement` to derive tunnel preshared keys.
    #[must_use]
    pub fn with_key_agreement(mut self, agreement: impl KeyAgreement + 'static) -> Self {
        self.key_agreement = Some(Box::new(agreement));
        self
    }

    /// Processes one event.
    ///
    /// Consistency failures are returned as `Err`; every other outcome,
    /// including a discarded transaction, is an `Ok` result.
    pub fn handle(&self, event: OrganizeEvent) -> Result<OrganizeResult> {
        let mut engine = self.engine.lock();
        let result = engine.handle(event);
        if let Some(Failure::Fatal(detail)) = &result.error {
            return Err(OrganizeError::Consistency(detail.clone()));
        }
        if !result.ok() {
            return Ok(result);
        }

        self.psk.lock().evict_missing(&engine.state().peers);
        let logged = engine.state().prefs.record_events;
        if result.changed() || logged {
            if let Some(file) = &self.state_file {
                file.save(engine.state())?;
            }
        }
        Ok(result)
    }

    /// Parses, verifies and admits a descriptor received as a string.
    ///
    /// Returns `None` when the string is malformed or the signature does not
    /// verify; such input never reaches the engine.
    pub fn process_descriptor_string(&self, input: &str) -> Result<Option<OrganizeResult>> {
        let descriptor = match Descriptor::parse(input) {
            Ok(d) => d,
            Err(e) => {
                info!(error = %e, "dropping unparsable descriptor");
                return Ok(None);
            }
        };
        if !descriptor.verify() {
            info!(
                hostname = descriptor.hostname(),
                vk = %descriptor.vk(),
                "dropping descriptor with invalid signature"
            );
            return Ok(None);
        }
        debug!(hostname = descriptor.hostname(), vf = descriptor.vf(), "descriptor verified");
        self.handle(OrganizeEvent::incoming(descriptor)).map(Some)
    }

    /// Runs `f` against the committed state under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&OrganizeState) -> R) -> R {
        f(self.engine.lock().state())
    }

    /// A copy of the committed state.
    #[must_use]
    pub fn snapshot(&self) -> OrganizeState {
        self.read(OrganizeState::clone)
    }

    /// Tunnel entry for a peer, with the cached preshared key when a key
    /// agreement is configured.
    #[must_use]
    pub fn tunnel_config(&self, id: &PeerId) -> Option<TunnelPeerConfig> {
        let peer = self.read(|state| state.peers.get(id).cloned())?;
        let psk = self.key_agreement.as_deref().and_then(|agreement| {
            self.psk
                .lock()
                .get_or_derive(*id, peer.descriptor.c(), agreement)
        });
        Some(peer.tunnel_config(psk))
    }

    /// The state file, if any.
    #[must_use]
    pub fn state_file(&self) -> Option<&StateFile> {
        self.state_file.as_ref()
    }
}

impl std::fmt::Debug for Organizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Organizer")
            .field("state_file", &self.state_file)
            .field("key_agreement", &self.key_agreement.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::tests::descriptor;
    use crate::psk::tests::XorAgreement;
    use crate::system::SystemState;
    use ed25519_dalek::SigningKey;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn lan() -> SystemState {
        SystemState {
            current_subnets: BTreeMap::from([("10.0.0.0/24".parse().unwrap(), vec![])]),
            ..SystemState::default()
        }
    }

    fn organizer() -> Organizer {
        let state = OrganizeState {
            system_state: lan(),
            ..OrganizeState::default()
        };
        Organizer::new(OrganizeMachine::new(), state).unwrap()
    }

    fn signed(seed: u8, hostname: &str, addr: &str) -> Descriptor {
        let key = SigningKey::from_bytes(&[seed; 32]);
        Descriptor::new(
            key.verifying_key().into(),
            crate::keys::TunnelKey::from_bytes_array([seed; 32]),
            crate::keys::PqKey::from_bytes_array([seed; 64]),
            hostname,
            5354,
            vec![addr.parse().unwrap()],
        )
        .unwrap()
        .with_vf(10)
        .sign(&key)
    }

    #[test]
    fn rejects_invalid_initial_state() {
        let mut state = OrganizeState::default();
        state.peers.insert(crate::peer::Peer::from_descriptor(descriptor(1, "a.local.", &["10.0.0.5"]), false));
        state.peers.insert(crate::peer::Peer::from_descriptor(descriptor(2, "a.local.", &["10.0.0.6"]), false));
        assert!(matches!(
            Organizer::new(OrganizeMachine::new(), state),
            Err(OrganizeError::InvalidState(_))
        ));
    }

    #[test]
    fn ambiguous_state_surfaces_as_consistency_error() {
        let mut state = OrganizeState::default();
        state.peers.insert(crate::peer::Peer::from_descriptor(descriptor(1, "a.local.", &["10.0.0.5"]), false));
        state.peers.insert(crate::peer::Peer::from_descriptor(descriptor(2, "a.local.", &["10.0.0.6"]), false));
        let before = state.clone();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let org = Organizer {
            engine: Mutex::new(Engine::new(OrganizeMachine::new(), state)),
            psk: Mutex::new(PskCache::new()),
            state_file: Some(StateFile::new(&path)),
            key_agreement: None,
        };

        let err = org
            .handle(OrganizeEvent::VerifyAndPinPeer {
                vk: PeerId::from_bytes_array([1; 32]),
                hostname: "a.local.".into(),
            })
            .unwrap_err();
        assert!(matches!(err, OrganizeError::Consistency(_)), "{err}");
        assert_eq!(org.snapshot(), before);
        assert!(!path.exists());
    }

    #[test]
    fn descriptor_string_pipeline() {
        let org = organizer();
        let d = signed(1, "a.local.", "10.0.0.5");
        let result = org.process_descriptor_string(&d.to_string()).unwrap().unwrap();
        assert!(result.ok());
        assert_eq!(org.read(|s| s.peers.len()), 1);
    }

    #[test]
    fn garbage_and_bad_signatures_never_reach_engine() {
        let org = organizer();
        assert!(org.process_descriptor_string("hostname=x;").unwrap().is_none());
        let text = signed(1, "a.local.", "10.0.0.5").to_string().replace("port=5354", "port=1");
        assert!(org.process_descriptor_string(&text).unwrap().is_none());
        assert_eq!(org.read(|s| s.peers.len()), 0);
    }

    #[test]
    fn saves_after_change_only() {
        let dir = TempDir::new().unwrap();
        let file = StateFile::new(dir.path().join("state.json"));
        let org = Organizer::open(OrganizeMachine::new(), file.clone()).unwrap();
        org.handle(OrganizeEvent::NewSystemState(lan())).unwrap();
        assert!(file.path().exists());

        std::fs::remove_file(file.path()).unwrap();
        let replay = org.handle(OrganizeEvent::NewSystemState(lan())).unwrap();
        assert!(replay.ok());
        assert!(!file.path().exists());

        let d = signed(1, "a.local.", "10.0.0.5");
        org.process_descriptor_string(&d.to_string()).unwrap();
        let reloaded = file.load().unwrap();
        assert_eq!(reloaded, org.snapshot());
    }

    #[test]
    fn tunnel_config_uses_cached_psk() {
        let org = organizer().with_key_agreement(XorAgreement::default());
        let d = signed(1, "a.local.", "10.0.0.5");
        let id = d.id();
        org.handle(OrganizeEvent::incoming(d)).unwrap();
        let first = org.tunnel_config(&id).unwrap();
        let second = org.tunnel_config(&id).unwrap();
        assert!(first.preshared_key.is_some());
        assert_eq!(first, second);

        org.handle(OrganizeEvent::UserRemovePeer { query: id.to_string() }).unwrap();
        assert!(org.tunnel_config(&id).is_none());
        assert!(org.psk.lock().is_empty());
    }

    #[test]
    fn concurrent_events_do_not_interleave() {
        let org = Arc::new(organizer());
        let handles: Vec<_> = (1u8..=8)
            .map(|n| {
                let org = Arc::clone(&org);
                std::thread::spawn(move || {
                    let d = signed(n, &format!("p{n}.local."), &format!("10.0.0.{}", 10 + n));
                    org.handle(OrganizeEvent::incoming(d)).unwrap().ok()
                })
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
        assert_eq!(org.read(|s| s.peers.len()), 8);
        assert_eq!(org.read(|s| s.peers.conflicts()), "");
    }
}
