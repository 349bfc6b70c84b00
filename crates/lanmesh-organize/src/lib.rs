//! Peer organization for a lanmesh host.
//!
//! This crate decides which peers of a local encrypted mesh are trusted and
//! enabled, resolves identity and address conflicts, elects the gateway peer
//! and tells the network-configuration layer what to change.
//!
//! # Architecture
//!
//! - [`Descriptor`]: a peer's signed self-description, with its wire format.
//! - [`Peer`] / [`PeerStore`]: locally held trust state and derived indices.
//! - [`SystemState`]: local subnets, gateways and our own tunnel key.
//! - [`OrganizeMachine`]: the event handlers, run by a
//!   [`lanmesh_engine::Engine`] as all-or-nothing transactions.
//! - [`Organizer`]: the mutex-guarded front end that persists state and
//!   caches preshared keys.
//!
//! # Example
//!
//! ```rust,ignore
//! use lanmesh_organize::{OrganizeMachine, Organizer, StateFile};
//!
//! let organizer = Organizer::open(OrganizeMachine::new(), StateFile::new("state.json"))?;
//! if let Some(result) = organizer.process_descriptor_string(&announcement)? {
//!     for trigger in result.triggers.iter() {
//!         apply(trigger);
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod descriptor;
pub mod edit;
pub mod error;
pub mod freshness;
pub mod keys;
pub mod organize;
pub mod organizer;
pub mod peer;
pub mod persist;
pub mod prefs;
pub mod psk;
pub mod state;
pub mod store;
pub mod system;
pub mod write;

pub use descriptor::Descriptor;
pub use edit::UserEdit;
pub use error::{DescriptorError, EditError, KeyError, OrganizeError, Result};
pub use freshness::{AcceptAll, FreshnessPolicy, ValidityWindow};
pub use keys::{PeerId, PqKey, PresharedKey, SignatureBytes, TunnelKey, VerifyKey};
pub use organize::{OrganizeAction, OrganizeEvent, OrganizeMachine, OrganizeTrigger};
pub use organizer::{OrganizeResult, Organizer};
pub use peer::{Peer, TunnelPeerConfig};
pub use persist::StateFile;
pub use prefs::Prefs;
pub use psk::{KeyAgreement, PskCache};
pub use state::{EventRecord, OrganizeState};
pub use store::{PeerStore, Which};
pub use system::SystemState;
pub use write::{PeerFlag, StateWrite};
