//! CLI error types.

use lanmesh_organize::{DescriptorError, KeyError, OrganizeError};
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Organizer failure.
    #[error(transparent)]
    Organize(#[from] OrganizeError),

    /// Descriptor could not be parsed.
    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    /// Key could not be decoded.
    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// The engine discarded the transaction.
    #[error("transition failed: {0}")]
    Transition(String),

    /// Peer not found.
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// Input could not be decoded as JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
