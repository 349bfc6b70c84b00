//! Preshared keys from post-quantum key agreement, cached per peer.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::keys::{PeerId, PqKey, PresharedKey};
use crate::store::PeerStore;

/// Derives a preshared key from a peer's post-quantum public key material.
pub trait KeyAgreement: fmt::Debug + Send + Sync {
    /// Runs the agreement. `None` if the material is unusable.
    fn derive(&self, peer_key: &PqKey) -> Option<PresharedKey>;
}

#[derive(Clone)]
struct Entry {
    material: PqKey,
    psk: PresharedKey,
}

/// Per-peer preshared key cache.
///
/// An entry is reused while the peer's announced material stays the same and
/// dropped once the peer leaves the store.
#[derive(Default)]
pub struct PskCache {
    entries: HashMap<PeerId, Entry>,
}

impl PskCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached key for `id`, deriving it if missing or stale.
    pub fn get_or_derive(
        &mut self,
        id: PeerId,
        material: &PqKey,
        agreement: &dyn KeyAgreement,
    ) -> Option<PresharedKey> {
        if let Some(entry) = self.entries.get(&id) {
            if entry.material == *material {
                return Some(entry.psk.clone());
            }
        }
        let psk = agreement.derive(material)?;
        debug!(peer = %id, "derived preshared key");
        self.entries.insert(
            id,
            Entry {
                material: *material,
                psk: psk.clone(),
            },
        );
        Some(psk)
    }

    /// Drops entries for peers no longer in `store`.
    pub fn evict_missing(&mut self, store: &PeerStore) {
        let before = self.entries.len();
        self.entries.retain(|id, _| store.contains(id));
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!(evicted, "evicted preshared keys");
        }
    }

    /// Number of cached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for PskCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PskCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}
