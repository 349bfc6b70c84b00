//! Fixed-size key material carried in descriptors.
//!
//! Every key is rendered as standard base64 on the wire and in the state
//! file. A 32-byte key is 44 characters, which is also the length of a peer id.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;

use crate::error::KeyError;

/// Size of tunnel and identity keys in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of the post-quantum public key material in bytes.
pub const PQ_KEY_SIZE: usize = 64;

/// Size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], KeyError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(s.trim())
        .map_err(|e| KeyError::InvalidBase64(e.to_string()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| KeyError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        })
}

macro_rules! base64_key {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Wraps raw bytes.
            #[must_use]
            pub const fn from_bytes_array(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Creates the key from a byte slice of exactly the right length.
            pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
                bytes
                    .try_into()
                    .map(Self)
                    .map_err(|_| KeyError::InvalidLength {
                        expected: $len,
                        actual: bytes.len(),
                    })
            }

            /// Returns the raw bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Encodes the key as standard base64.
            #[must_use]
            pub fn to_base64(&self) -> String {
                base64::engine::general_purpose::STANDARD.encode(self.0)
            }

            /// Decodes the key from standard base64.
            pub fn from_base64(s: &str) -> Result<Self, KeyError> {
                decode_fixed::<$len>(s).map(Self)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let b64 = self.to_base64();
                let short = &b64[..8.min(b64.len())];
                write!(f, "{}({short}...)", stringify!($name))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_base64())
            }
        }

        impl FromStr for $name {
            type Err = KeyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_base64(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.to_base64())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::from_base64(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

base64_key!(
    /// A peer's Ed25519 verification key. It doubles as the peer's permanent id.
    VerifyKey,
    KEY_SIZE
);

base64_key!(
    /// A tunnel (Curve25519) public key.
    TunnelKey,
    KEY_SIZE
);

base64_key!(
    /// Opaque post-quantum public key material announced by a peer.
    PqKey,
    PQ_KEY_SIZE
);

base64_key!(
    /// A detached Ed25519 signature over a descriptor.
    SignatureBytes,
    SIGNATURE_SIZE
);

/// Peer ids are verification keys.
pub type PeerId = VerifyKey;

impl VerifyKey {
    /// Returns the Ed25519 verifying key, if these bytes encode a valid point.
    #[must_use]
    pub fn verifying_key(&self) -> Option<ed25519_dalek::VerifyingKey> {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0).ok()
    }
}

impl From<ed25519_dalek::VerifyingKey> for VerifyKey {
    fn from(key: ed25519_dalek::VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl Default for TunnelKey {
    fn default() -> Self {
        Self([0u8; KEY_SIZE])
    }
}

/// A tunnel preshared key derived from post-quantum key agreement.
#[derive(Clone)]
pub struct PresharedKey([u8; KEY_SIZE]);

impl PresharedKey {
    /// Wraps raw bytes.
    #[must_use]
    pub const fn from_bytes_array(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Encodes the key as base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }
}

impl fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresharedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for PresharedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PresharedKey {}
