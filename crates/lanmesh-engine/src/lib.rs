//! Event-sourced transition engine for lanmesh.
//!
//! A [`Machine`] describes a state type, the events it accepts and the typed
//! mutations its handlers may issue. The [`Engine`] applies each event to a
//! working copy of the committed state inside a [`Transaction`], validates the
//! complete result and either commits it or discards it. Every call yields a
//! [`TransitionResult`] carrying the actions taken, the writes applied and the
//! merged set of side-effect requests ([`TriggerSet`]).
//!
//! ```text
//!   event ──► handler ──► actions ──► writes (working copy)
//!                                        │
//!                               validate(working)
//!                              ┌─────────┴─────────┐
//!                           violations           clean
//!                              │                   │
//!                    discard, ok = false    commit, record, triggers
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod machine;
mod transaction;
mod trigger;

pub use engine::{Engine, Failure, TransitionResult, WriteRecord};
pub use machine::{
    Action, Event, HandlerError, Machine, Mutation, MutationError, Trigger, Violation, WriteOp,
};
pub use transaction::Transaction;
pub use trigger::TriggerSet;
