//! Operator edits addressed by dotted path.
//!
//! Only a fixed subset of the state tree is editable:
//!
//! | path | ops |
//! |---|---|
//! | `peers.<id>` | REMOVE |
//! | `peers.<id>.pinned` / `verified` / `enabled` / `use_as_gateway` | SET |
//! | `peers.<id>.petname` | SET |
//! | `peers.<id>.nicknames.<name>` | SET, REMOVE |
//! | `peers.<id>.IPv4addrs` / `IPv6addrs` | ADD |
//! | `peers.<id>.IPv4addrs.<ip>` / `IPv6addrs.<ip>` | SET, REMOVE |
//! | `prefs.pin_new_peers` / `prefs.record_events` | SET |
//! | `prefs.local_domains` | SET, ADD, REMOVE |
//!
//! Descriptors and the system state are never editable.

use std::fmt;
use std::net::IpAddr;

use lanmesh_engine::WriteOp;
use serde::{Deserialize, Serialize};

use crate::descriptor::parse_flag;
use crate::error::EditError;
use crate::keys::PeerId;
use crate::state::OrganizeState;
use crate::write::{PeerFlag, StateWrite};

/// A raw operator edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEdit {
    /// Primitive operation.
    pub op: WriteOp,
    /// Dotted path into the state tree.
    pub path: String,
    /// Value to write. Ignored for whole-peer REMOVE.
    #[serde(default)]
    pub value: String,
}

impl UserEdit {
    /// Creates an edit.
    pub fn new(op: WriteOp, path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            op,
            path: path.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for UserEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {:?}", self.op, self.path, self.value)
    }
}

/// What an accepted edit turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EditPlan {
    /// A single write, optionally scoped to one peer.
    Write {
        write: StateWrite,
        peer: Option<PeerId>,
    },
    /// Remove a whole peer through the regular removal action.
    RemovePeer(PeerId),
}

impl UserEdit {
    /// Validates the edit against the editable subset and the current state.
    pub(crate) fn plan(&self, state: &OrganizeState) -> Result<EditPlan, EditError> {
        if let Some(rest) = self.path.strip_prefix("prefs.") {
            return self.plan_prefs(rest).map(|write| EditPlan::Write { write, peer: None });
        }
        let Some(rest) = self.path.strip_prefix("peers.") else {
            return Err(self.not_editable());
        };
        let (id_str, field) = match rest.split_once('.') {
            Some((id, field)) => (id, Some(field)),
            None => (rest, None),
        };
        let id = id_str
            .parse::<PeerId>()
            .map_err(|_| EditError::NoSuchPeer(id_str.to_string()))?;
        if !state.peers.contains(&id) {
            return Err(EditError::NoSuchPeer(id_str.to_string()));
        }

        let Some(field) = field else {
            return match self.op {
                WriteOp::Remove => Ok(EditPlan::RemovePeer(id)),
                _ => Err(self.not_editable()),
            };
        };
        let write = self.plan_peer(id, field)?;
        Ok(EditPlan::Write {
            write,
            peer: Some(id),
        })
    }

    fn plan_prefs(&self, field: &str) -> Result<StateWrite, EditError> {
        match (field, self.op) {
            ("pin_new_peers", WriteOp::Set) => self.flag().map(StateWrite::SetPinNewPeers),
            ("record_events", WriteOp::Set) => self.flag().map(StateWrite::SetRecordEvents),
            ("local_domains", WriteOp::Set) => Ok(StateWrite::SetLocalDomains(
                self.value
                    .split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(String::from)
                    .collect(),
            )),
            ("local_domains", WriteOp::Add) => self.domain().map(StateWrite::AddLocalDomain),
            ("local_domains", WriteOp::Remove) => self.domain().map(StateWrite::RemoveLocalDomain),
            _ => Err(self.not_editable()),
        }
    }

    fn plan_peer(&self, id: PeerId, field: &str) -> Result<StateWrite, EditError> {
        if let Ok(flag) = field.parse::<PeerFlag>() {
            return match self.op {
                WriteOp::Set => Ok(StateWrite::SetFlag {
                    id,
                    flag,
                    value: self.flag()?,
                }),
                _ => Err(self.not_editable()),
            };
        }
        if field == "petname" {
            return match self.op {
                WriteOp::Set => Ok(StateWrite::SetPetname {
                    id,
                    petname: self.value.trim().to_string(),
                }),
                _ => Err(self.not_editable()),
            };
        }
        if let Some(name) = field.strip_prefix("nicknames.") {
            if name.is_empty() {
                return Err(self.not_editable());
            }
            let name = name.to_string();
            return match self.op {
                WriteOp::Set => Ok(StateWrite::SetNickname {
                    id,
                    name,
                    enabled: self.flag()?,
                }),
                WriteOp::Remove => Ok(StateWrite::RemoveNickname { id, name }),
                WriteOp::Add => Err(self.not_editable()),
            };
        }

        let (family, key) = match field.split_once('.') {
            Some((family, key)) => (family, Some(key)),
            None => (field, None),
        };
        let v4 = match family {
            "IPv4addrs" => true,
            "IPv6addrs" => false,
            _ => return Err(self.not_editable()),
        };
        match (key, self.op) {
            (None, WriteOp::Add) => Ok(StateWrite::SetAddress {
                id,
                addr: self.address(self.value.trim(), v4)?,
                enabled: true,
            }),
            (Some(key), WriteOp::Set) => Ok(StateWrite::SetAddress {
                id,
                addr: self.address(key, v4)?,
                enabled: self.flag()?,
            }),
            (Some(key), WriteOp::Remove) => Ok(StateWrite::RemoveAddress {
                id,
                addr: self.address(key, v4)?,
            }),
            _ => Err(self.not_editable()),
        }
    }

    fn not_editable(&self) -> EditError {
        EditError::NotEditable {
            op: self.op.to_string(),
            path: self.path.clone(),
        }
    }

    fn invalid(&self, value: &str, reason: impl Into<String>) -> EditError {
        EditError::InvalidValue {
            path: self.path.clone(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    fn flag(&self) -> Result<bool, EditError> {
        parse_flag(&self.value).ok_or_else(|| self.invalid(&self.value, "expected a boolean"))
    }

    fn domain(&self) -> Result<String, EditError> {
        let domain = self.value.trim();
        if domain.is_empty() {
            return Err(self.invalid(&self.value, "empty domain"));
        }
        Ok(domain.to_string())
    }

    fn address(&self, raw: &str, v4: bool) -> Result<IpAddr, EditError> {
        let addr = raw
            .parse::<IpAddr>()
            .map_err(|e| self.invalid(raw, e.to_string()))?;
        if addr.is_ipv4() != v4 {
            return Err(self.invalid(raw, "wrong address family"));
        }
        Ok(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::tests::descriptor;
    use crate::peer::Peer;
    use test_case::test_case;

    fn state() -> (OrganizeState, PeerId) {
        let mut state = OrganizeState::default();
        let peer = Peer::from_descriptor(descriptor(1, "a.local.", &["10.0.0.5"]), false);
        let id = peer.id();
        state.peers.insert(peer);
        (state, id)
    }

    fn plan(op: WriteOp, path: &str, value: &str) -> Result<EditPlan, EditError> {
        let (state, _) = state();
        UserEdit::new(op, path, value).plan(&state)
    }

    #[test]
    fn pinned_set() {
        let (state, id) = state();
        let edit = UserEdit::new(WriteOp::Set, format!("peers.{id}.pinned"), "yes");
        assert_eq!(
            edit.plan(&state).unwrap(),
            EditPlan::Write {
                write: StateWrite::SetFlag { id, flag: PeerFlag::Pinned, value: true },
                peer: Some(id),
            }
        );
    }

    #[test]
    fn nickname_with_dots() {
        let (state, id) = state();
        let edit = UserEdit::new(WriteOp::Set, format!("peers.{id}.nicknames.b.local."), "1");
        assert_eq!(
            edit.plan(&state).unwrap(),
            EditPlan::Write {
                write: StateWrite::SetNickname { id, name: "b.local.".into(), enabled: true },
                peer: Some(id),
            }
        );
    }

    #[test]
    fn address_add_and_toggle() {
        let (state, id) = state();
        let add = UserEdit::new(WriteOp::Add, format!("peers.{id}.IPv4addrs"), "10.0.0.9");
        assert!(matches!(
            add.plan(&state).unwrap(),
            EditPlan::Write { write: StateWrite::SetAddress { enabled: true, .. }, .. }
        ));
        let off = UserEdit::new(WriteOp::Set, format!("peers.{id}.IPv4addrs.10.0.0.5"), "off");
        assert!(matches!(
            off.plan(&state).unwrap(),
            EditPlan::Write { write: StateWrite::SetAddress { enabled: false, .. }, .. }
        ));
    }

    #[test]
    fn wrong_family_rejected() {
        let (state, id) = state();
        let edit = UserEdit::new(WriteOp::Add, format!("peers.{id}.IPv6addrs"), "10.0.0.9");
        assert!(matches!(edit.plan(&state), Err(EditError::InvalidValue { .. })));
    }

    #[test]
    fn whole_peer_remove() {
        let (state, id) = state();
        let edit = UserEdit::new(WriteOp::Remove, format!("peers.{id}"), "");
        assert_eq!(edit.plan(&state).unwrap(), EditPlan::RemovePeer(id));
    }

    #[test]
    fn unknown_peer() {
        let id = PeerId::from_bytes_array([9; 32]);
        assert!(matches!(
            plan(WriteOp::Set, &format!("peers.{id}.pinned"), "1"),
            Err(EditError::NoSuchPeer(_))
        ));
    }

    #[test]
    fn descriptor_not_editable() {
        let (state, id) = state();
        let edit = UserEdit::new(WriteOp::Set, format!("peers.{id}.descriptor"), "x");
        assert!(matches!(edit.plan(&state), Err(EditError::NotEditable { .. })));
    }

    #[test_case(WriteOp::Set, "system_state", "{}" ; "system state")]
    #[test_case(WriteOp::Set, "event_log", "[]" ; "event log")]
    #[test_case(WriteOp::Add, "prefs.pin_new_peers", "1" ; "add to bool pref")]
    #[test_case(WriteOp::Set, "prefs.nope", "1" ; "unknown pref")]
    fn not_editable(op: WriteOp, path: &str, value: &str) {
        assert!(matches!(plan(op, path, value), Err(EditError::NotEditable { .. })));
    }

    #[test]
    fn bad_bool_value() {
        assert!(matches!(
            plan(WriteOp::Set, "prefs.record_events", "sometimes"),
            Err(EditError::InvalidValue { .. })
        ));
    }

    #[test]
    fn local_domains_comma_list() {
        assert_eq!(
            plan(WriteOp::Set, "prefs.local_domains", "local., lan.").unwrap(),
            EditPlan::Write {
                write: StateWrite::SetLocalDomains(vec!["local.".into(), "lan.".into()]),
                peer: None,
            }
        );
    }
}
