//! The working copy a handler mutates.

use tracing::debug;

use crate::machine::{Machine, Mutation, MutationError};
use crate::trigger::TriggerSet;

/// An in-flight transaction: a private copy of the committed state plus the
/// log of everything the handler did to it.
///
/// Handlers never see the committed state. The engine publishes the working
/// copy only if the whole handler succeeds and the result validates.
pub struct Transaction<M: Machine> {
    state: M::State,
    actions: Vec<M::Action>,
    writes: Vec<M::Mutation>,
    triggers: TriggerSet<M::Trigger>,
}

impl<M: Machine> Transaction<M> {
    pub(crate) fn begin(state: M::State) -> Self {
        Self {
            state,
            actions: Vec::new(),
            writes: Vec::new(),
            triggers: TriggerSet::new(),
        }
    }

    /// The working copy, including every write applied so far.
    #[must_use]
    pub fn state(&self) -> &M::State {
        &self.state
    }

    /// Records that the handler took `action`.
    pub fn action(&mut self, action: M::Action) {
        self.actions.push(action);
    }

    /// Applies a write to the working copy and logs it.
    pub fn write(&mut self, mutation: M::Mutation) -> Result<(), MutationError> {
        mutation.apply(&mut self.state)?;
        debug!(op = %mutation.op(), path = %mutation.path(), "applied write");
        self.writes.push(mutation);
        Ok(())
    }

    /// Requests a side effect, merged with any equal request already made.
    pub fn trigger(&mut self, trigger: M::Trigger) {
        self.triggers.add(trigger);
    }

    /// Actions recorded so far.
    #[must_use]
    pub fn actions(&self) -> &[M::Action] {
        &self.actions
    }

    /// Writes applied so far.
    #[must_use]
    pub fn writes(&self) -> &[M::Mutation] {
        &self.writes
    }

    /// Triggers requested so far.
    #[must_use]
    pub fn triggers(&self) -> &TriggerSet<M::Trigger> {
        &self.triggers
    }

    #[allow(clippy::type_complexity)]
    pub(crate) fn into_parts(
        self,
    ) -> (
        M::State,
        Vec<M::Action>,
        Vec<M::Mutation>,
        TriggerSet<M::Trigger>,
    ) {
        (self.state, self.actions, self.writes, self.triggers)
    }
}
