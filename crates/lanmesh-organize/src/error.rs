//! Error types for lanmesh-organize.

use lanmesh_engine::{HandlerError, MutationError};
use thiserror::Error;

/// Errors decoding fixed-size key material.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// Invalid base64 encoding.
    #[error("invalid base64 encoding: {0}")]
    InvalidBase64(String),

    /// Decoded to the wrong number of bytes.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Required length.
        expected: usize,
        /// Decoded length.
        actual: usize,
    },
}

/// A descriptor string or field map could not be turned into a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// A `;`-separated chunk had no `=`.
    #[error("malformed field pair: {0:?}")]
    MalformedPair(String),

    /// A pair had an empty field name.
    #[error("empty field name in {0:?}")]
    EmptyFieldName(String),

    /// A field appeared twice.
    #[error("duplicate field: {0}")]
    DuplicateField(String),

    /// A field not in the descriptor schema.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// A required field was absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field value failed coercion.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl DescriptorError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// A user edit named a path or value outside the editable subset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// Path is not editable with this operation.
    #[error("{op} is not allowed on {path}")]
    NotEditable {
        /// Operation name.
        op: String,
        /// Dotted path.
        path: String,
    },

    /// Value could not be parsed for the target field.
    #[error("invalid value {value:?} for {path}: {reason}")]
    InvalidValue {
        /// Dotted path.
        path: String,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Edit referenced a peer that is not in the store.
    #[error("no such peer: {0}")]
    NoSuchPeer(String),
}

/// Errors raised by the organizer and its event handlers.
#[derive(Debug, Error)]
pub enum OrganizeError {
    /// Descriptor parse or coercion failure.
    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// Descriptor signature did not verify.
    #[error("invalid descriptor signature for {0}")]
    InvalidSignature(String),

    /// Key decoding failure.
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// Rejected user edit.
    #[error("edit rejected: {0}")]
    Edit(#[from] EditError),

    /// A write could not be applied to the working copy.
    #[error(transparent)]
    Mutation(#[from] MutationError),

    /// No enabled peer carries this hostname.
    #[error("hostname {0:?} not found")]
    HostnameNotFound(String),

    /// No enabled peer carries this address.
    #[error("no peer with address {0}")]
    AddressNotFound(String),

    /// Verify-and-pin was given a key that does not own the hostname.
    #[error("expected {hostname} to be {expected}, have {actual}")]
    KeyMismatch {
        /// Hostname that was looked up.
        hostname: String,
        /// Key supplied by the user.
        expected: String,
        /// Id of the peer that owns the hostname.
        actual: String,
    },

    /// The state holds something its invariants rule out.
    #[error("consistency violation: {0}")]
    Consistency(String),

    /// Persisted state is unusable.
    #[error("invalid state file: {0}")]
    InvalidState(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HandlerError for OrganizeError {
    fn is_fatal(&self) -> bool {
        matches!(self, Self::Consistency(_))
    }
}

/// Result alias for organize operations.
pub type Result<T> = std::result::Result<T, OrganizeError>;
