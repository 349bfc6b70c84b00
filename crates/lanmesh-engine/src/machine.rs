//! Traits a concrete state machine implements to run on the [`Engine`].
//!
//! [`Engine`]: crate::Engine

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::TransitionResult;
use crate::transaction::Transaction;

/// The three primitive write operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WriteOp {
    /// Replace the value at a path.
    Set,
    /// Merge a mapping (or list entry) into the value at a path.
    Add,
    /// Remove a key from the mapping at a path.
    Remove,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => write!(f, "SET"),
            Self::Add => write!(f, "ADD"),
            Self::Remove => write!(f, "REMOVE"),
        }
    }
}

impl FromStr for WriteOp {
    type Err = MutationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SET" => Ok(Self::Set),
            "ADD" => Ok(Self::Add),
            "REMOVE" => Ok(Self::Remove),
            _ => Err(MutationError::new(s, "unknown write operation")),
        }
    }
}

/// A write could not be applied to the working copy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot write {path}: {reason}")]
pub struct MutationError {
    /// Path the write targeted.
    pub path: String,
    /// Why it failed.
    pub reason: String,
}

impl MutationError {
    /// Creates a new mutation error.
    #[must_use]
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A violated state invariant, reported by [`Machine::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Short name of the invariant.
    pub invariant: String,
    /// Human-readable detail.
    pub detail: String,
}

impl Violation {
    /// Creates a new violation.
    #[must_use]
    pub fn new(invariant: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            invariant: invariant.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.invariant, self.detail)
    }
}

/// An event delivered to the engine.
pub trait Event: Clone + fmt::Debug + Serialize {
    /// Stable event name, e.g. `INCOMING_DESCRIPTOR`.
    fn name(&self) -> &'static str;
}

/// A named step a handler took, recorded in order.
pub trait Action: Clone + fmt::Debug + Serialize {
    /// Stable action name, e.g. `REMOVE_PEER`.
    fn name(&self) -> &'static str;
}

/// A named request for an external side effect.
///
/// Triggers with the same name accumulate; equal triggers are emitted once.
pub trait Trigger: Clone + PartialEq + fmt::Debug + Serialize {
    /// Stable trigger name, e.g. `sync_peer`.
    fn name(&self) -> &'static str;
}

/// A typed primitive mutation against the state `S`.
pub trait Mutation<S>: Clone + fmt::Debug + Serialize {
    /// Applies the mutation to the working copy.
    fn apply(&self, state: &mut S) -> Result<(), MutationError>;

    /// The primitive operation this mutation performs.
    fn op(&self) -> WriteOp;

    /// Dotted path of the state field this mutation targets.
    fn path(&self) -> String;
}

/// Errors returned by event handlers.
pub trait HandlerError: std::error::Error {
    /// Whether this error signals broken internal consistency.
    ///
    /// Fatal errors abort the transaction like any other handler error but are
    /// reported as [`Failure::Fatal`](crate::Failure::Fatal).
    fn is_fatal(&self) -> bool {
        false
    }
}

/// A state machine driven by the [`Engine`](crate::Engine).
pub trait Machine: Sized {
    /// Committed state; cloned at the start of every transaction.
    type State: Clone;
    /// Events this machine accepts.
    type Event: Event;
    /// Actions its handlers record.
    type Action: Action;
    /// Typed writes its handlers issue.
    type Mutation: Mutation<Self::State>;
    /// Side-effect requests its handlers emit.
    type Trigger: Trigger;
    /// Handler failure type.
    type Error: HandlerError + From<MutationError>;

    /// Runs the handler for `event` against the transaction's working copy.
    fn handle(&self, event: &Self::Event, tx: &mut Transaction<Self>) -> Result<(), Self::Error>;

    /// Checks every invariant of a complete state.
    fn validate(&self, state: &Self::State) -> Vec<Violation>;

    /// Called with the freshly committed state after a successful transaction.
    fn record(&self, _state: &mut Self::State, _result: &TransitionResult<Self>) {}
}
