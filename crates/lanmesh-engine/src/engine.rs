//! Transaction driver: clone, handle, validate, commit or discard.

use std::fmt;

use serde::ser::{Serialize, SerializeStruct, Serializer};
use tracing::{debug, error, warn};

use crate::machine::{Action, Event, HandlerError, Machine, Mutation, Violation, WriteOp};
use crate::transaction::Transaction;
use crate::trigger::TriggerSet;

/// Why a transaction was discarded.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Failure {
    /// The handler refused the event.
    Handler(String),
    /// The working copy broke one or more invariants.
    Invalid(Vec<Violation>),
    /// The handler detected a state that should be impossible.
    Fatal(String),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(msg) => write!(f, "{msg}"),
            Self::Invalid(violations) => {
                write!(f, "invalid state: ")?;
                for (i, v) in violations.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{v}")?;
                }
                Ok(())
            }
            Self::Fatal(msg) => write!(f, "consistency violation: {msg}"),
        }
    }
}

/// Serialized view of one applied write.
#[derive(Debug, serde::Serialize)]
pub struct WriteRecord<'a, W> {
    /// Primitive operation.
    pub op: WriteOp,
    /// Target path.
    pub path: String,
    /// The typed write itself.
    pub value: &'a W,
}

/// Outcome of one [`Engine::handle`] call.
///
/// On failure `actions` and `writes` describe what the handler attempted
/// before the transaction was discarded; `triggers` is always empty.
pub struct TransitionResult<M: Machine> {
    /// The event that was handled.
    pub event: M::Event,
    /// Set when the transaction was discarded.
    pub error: Option<Failure>,
    /// Actions in invocation order.
    pub actions: Vec<M::Action>,
    /// Writes in application order.
    pub writes: Vec<M::Mutation>,
    /// Side-effect requests, merged by name.
    pub triggers: TriggerSet<M::Trigger>,
}

impl<M: Machine> TransitionResult<M> {
    /// Whether the transaction committed.
    #[must_use]
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }

    /// Whether the transaction failed with a consistency violation.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self.error, Some(Failure::Fatal(_)))
    }

    /// Whether a committed transaction changed the state.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.ok() && !self.writes.is_empty()
    }

    /// Names of the recorded actions, in order.
    #[must_use]
    pub fn action_names(&self) -> Vec<&'static str> {
        self.actions.iter().map(Action::name).collect()
    }

    /// Applied writes as `(op, path)` pairs.
    #[must_use]
    pub fn write_paths(&self) -> Vec<(WriteOp, String)> {
        self.writes
            .iter()
            .map(|w| (w.op(), w.path()))
            .collect()
    }
}

impl<M: Machine> Clone for TransitionResult<M> {
    fn clone(&self) -> Self {
        Self {
            event: self.event.clone(),
            error: self.error.clone(),
            actions: self.actions.clone(),
            writes: self.writes.clone(),
            triggers: self.triggers.clone(),
        }
    }
}

impl<M: Machine> fmt::Debug for TransitionResult<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionResult")
            .field("event", &self.event.name())
            .field("error", &self.error)
            .field("actions", &self.actions)
            .field("writes", &self.writes)
            .field("triggers", &self.triggers)
            .finish()
    }
}

impl<M: Machine> Serialize for TransitionResult<M> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let writes: Vec<WriteRecord<'_, M::Mutation>> = self
            .writes
            .iter()
            .map(|w| WriteRecord {
                op: w.op(),
                path: w.path(),
                value: w,
            })
            .collect();
        let mut s = serializer.serialize_struct("TransitionResult", 6)?;
        s.serialize_field("event", self.event.name())?;
        s.serialize_field("ok", &self.ok())?;
        s.serialize_field("error", &self.error)?;
        s.serialize_field("actions", &self.actions)?;
        s.serialize_field("writes", &writes)?;
        s.serialize_field("triggers", &self.triggers)?;
        s.end()
    }
}

/// Holds the committed state of a [`Machine`] and applies events to it.
///
/// `handle` takes `&mut self`; callers that share an engine across threads
/// must serialize access (see `lanmesh_organize::Organizer`).
pub struct Engine<M: Machine> {
    machine: M,
    state: M::State,
}

impl<M: Machine> Engine<M> {
    /// Creates an engine over an already-validated state.
    pub fn new(machine: M, state: M::State) -> Self {
        Self { machine, state }
    }

    /// The committed state.
    #[must_use]
    pub fn state(&self) -> &M::State {
        &self.state
    }

    /// The machine driving this engine.
    #[must_use]
    pub fn machine(&self) -> &M {
        &self.machine
    }

    /// Consumes the engine, returning the committed state.
    pub fn into_state(self) -> M::State {
        self.state
    }

    /// Validates the committed state without changing it.
    #[must_use]
    pub fn check(&self) -> Vec<Violation> {
        self.machine.validate(&self.state)
    }

    /// Applies `event` as a single all-or-nothing transaction.
    pub fn handle(&mut self, event: M::Event) -> TransitionResult<M> {
        let name = event.name();
        let mut tx = Transaction::<M>::begin(self.state.clone());
        let outcome = self.machine.handle(&event, &mut tx);
        let (working, actions, writes, triggers) = tx.into_parts();

        let failure = match outcome {
            Err(e) if e.is_fatal() => {
                error!(event = name, error = %e, "consistency violation, transaction aborted");
                Some(Failure::Fatal(e.to_string()))
            }
            Err(e) => {
                warn!(event = name, error = %e, "handler failed, transaction discarded");
                Some(Failure::Handler(e.to_string()))
            }
            Ok(()) => {
                let violations = self.machine.validate(&working);
                if violations.is_empty() {
                    None
                } else {
                    let failure = Failure::Invalid(violations);
                    warn!(event = name, error = %failure, "validation failed, transaction discarded");
                    Some(failure)
                }
            }
        };

        if let Some(failure) = failure {
            return TransitionResult {
                event,
                error: Some(failure),
                actions,
                writes,
                triggers: TriggerSet::new(),
            };
        }

        let result = TransitionResult {
            event,
            error: None,
            actions,
            writes,
            triggers,
        };
        self.state = working;
        self.machine.record(&mut self.state, &result);
        debug!(
            event = name,
            writes = result.writes.len(),
            triggers = result.triggers.len(),
            "transaction committed"
        );
        result
    }
}

impl<M> fmt::Debug for Engine<M>
where
    M: Machine + fmt::Debug,
    M::State: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("machine", &self.machine)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{Mutation, MutationError, Trigger};
    use serde::Serialize;
    use thiserror::Error;

    // A bounded counter: 0 <= value <= 10, with `record` gated by a flag.

    #[derive(Debug, Clone, Default)]
    struct Counter {
        value: i64,
        recording: bool,
        log: Vec<&'static str>,
    }

    #[derive(Debug, Clone, Serialize)]
    enum Ev {
        Add(i64),
        AddTwice(i64),
        Refuse,
        Corrupt,
        Noop,
    }

    impl Event for Ev {
        fn name(&self) -> &'static str {
            match self {
                Self::Add(_) => "ADD",
                Self::AddTwice(_) => "ADD_TWICE",
                Self::Refuse => "REFUSE",
                Self::Corrupt => "CORRUPT",
                Self::Noop => "NOOP",
            }
        }
    }

    #[derive(Debug, Clone, Serialize)]
    enum Act {
        Bump,
        Skip,
    }

    impl Action for Act {
        fn name(&self) -> &'static str {
            match self {
                Self::Bump => "BUMP",
                Self::Skip => "SKIP",
            }
        }
    }

    #[derive(Debug, Clone, Serialize)]
    struct Incr(i64);

    impl Mutation<Counter> for Incr {
        fn apply(&self, state: &mut Counter) -> Result<(), MutationError> {
            state.value = state
                .value
                .checked_add(self.0)
                .ok_or_else(|| MutationError::new("value", "overflow"))?;
            Ok(())
        }

        fn op(&self) -> WriteOp {
            WriteOp::Set
        }

        fn path(&self) -> String {
            "value".to_string()
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Notify(i64);

    impl Trigger for Notify {
        fn name(&self) -> &'static str {
            "notify"
        }
    }

    #[derive(Debug, Error)]
    enum CounterError {
        #[error("refused")]
        Refused,
        #[error("counter corrupted")]
        Corrupted,
        #[error(transparent)]
        Write(#[from] MutationError),
    }

    impl HandlerError for CounterError {
        fn is_fatal(&self) -> bool {
            matches!(self, Self::Corrupted)
        }
    }

    struct Bounded;

    impl Machine for Bounded {
        type State = Counter;
        type Event = Ev;
        type Action = Act;
        type Mutation = Incr;
        type Trigger = Notify;
        type Error = CounterError;

        fn handle(&self, event: &Ev, tx: &mut Transaction<Self>) -> Result<(), CounterError> {
            match event {
                Ev::Add(n) => {
                    tx.action(Act::Bump);
                    tx.write(Incr(*n))?;
                    tx.trigger(Notify(tx.state().value));
                }
                Ev::AddTwice(n) => {
                    for _ in 0..2 {
                        tx.action(Act::Bump);
                        tx.write(Incr(*n))?;
                        tx.trigger(Notify(*n));
                    }
                }
                Ev::Refuse => {
                    tx.write(Incr(1))?;
                    return Err(CounterError::Refused);
                }
                Ev::Corrupt => return Err(CounterError::Corrupted),
                Ev::Noop => tx.action(Act::Skip),
            }
            Ok(())
        }

        fn validate(&self, state: &Counter) -> Vec<Violation> {
            let mut out = Vec::new();
            if state.value < 0 {
                out.push(Violation::new("non_negative", state.value.to_string()));
            }
            if state.value > 10 {
                out.push(Violation::new("at_most_ten", state.value.to_string()));
            }
            out
        }

        fn record(&self, state: &mut Counter, result: &TransitionResult<Self>) {
            if state.recording {
                state.log.push(result.event.name());
            }
        }
    }

    fn engine() -> Engine<Bounded> {
        Engine::new(Bounded, Counter::default())
    }

    #[test]
    fn commit_applies_writes_and_reports_triggers() {
        let mut engine = engine();
        let result = engine.handle(Ev::Add(3));
        assert!(result.ok());
        assert!(result.changed());
        assert_eq!(engine.state().value, 3);
        assert_eq!(result.action_names(), vec!["BUMP"]);
        assert_eq!(result.triggers.get("notify"), &[Notify(3)]);
    }

    #[test]
    fn invalid_result_leaves_committed_state_untouched() {
        let mut engine = engine();
        engine.handle(Ev::Add(4));
        let result = engine.handle(Ev::AddTwice(4));
        assert!(!result.ok());
        assert!(matches!(result.error, Some(Failure::Invalid(ref v)) if v[0].invariant == "at_most_ten"));
        assert_eq!(engine.state().value, 4);
        assert!(result.triggers.is_empty());
        assert_eq!(result.writes.len(), 2);
    }

    #[test]
    fn repeated_trigger_is_emitted_once() {
        let mut engine = engine();
        let result = engine.handle(Ev::AddTwice(2));
        assert!(result.ok());
        assert_eq!(engine.state().value, 4);
        assert_eq!(result.triggers.len(), 1);
        assert_eq!(result.action_names(), vec!["BUMP", "BUMP"]);
    }

    #[test]
    fn handler_error_discards_partial_writes() {
        let mut engine = engine();
        let result = engine.handle(Ev::Refuse);
        assert!(matches!(result.error, Some(Failure::Handler(ref m)) if m == "refused"));
        assert!(!result.is_fatal());
        assert_eq!(engine.state().value, 0);
    }

    #[test]
    fn fatal_error_is_flagged() {
        let mut engine = engine();
        let result = engine.handle(Ev::Corrupt);
        assert!(result.is_fatal());
        assert!(!result.ok());
    }

    #[test]
    fn record_runs_only_on_commit() {
        let mut engine = Engine::new(
            Bounded,
            Counter {
                recording: true,
                ..Counter::default()
            },
        );
        engine.handle(Ev::Add(1));
        engine.handle(Ev::Refuse);
        engine.handle(Ev::Noop);
        assert_eq!(engine.state().log, vec!["ADD", "NOOP"]);
    }

    #[test]
    fn noop_commits_without_change() {
        let mut engine = engine();
        let result = engine.handle(Ev::Noop);
        assert!(result.ok());
        assert!(!result.changed());
    }

    #[test]
    fn result_serializes_with_write_paths() {
        let mut engine = engine();
        let result = engine.handle(Ev::Add(2));
        let json = serde_json::to_value(&result).unwrap_or_default();
        assert_eq!(json["event"], "ADD");
        assert_eq!(json["ok"], true);
        assert_eq!(json["writes"][0]["op"], "SET");
        assert_eq!(json["writes"][0]["path"], "value");
        assert_eq!(json["triggers"]["notify"][0], 2);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn committed_state_always_validates(steps in prop::collection::vec(-6i64..7, 0..40)) {
                let mut engine = engine();
                for n in steps {
                    let before = engine.state().value;
                    let result = engine.handle(Ev::Add(n));
                    if !result.ok() {
                        prop_assert_eq!(engine.state().value, before);
                    }
                    prop_assert!(engine.check().is_empty());
                }
            }
        }
    }
}
