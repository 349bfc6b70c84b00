//! Event log command implementation.

use std::io::Write;

use lanmesh_organize::Organizer;

use crate::error::CliError;
use crate::output::{EventLog, OutputFormat};

/// Event log command executor.
pub struct EventlogCommand<'a> {
    organizer: &'a Organizer,
}

impl<'a> EventlogCommand<'a> {
    /// Create a new event log command.
    #[must_use]
    pub fn new(organizer: &'a Organizer) -> Self {
        Self { organizer }
    }

    /// Print every recorded event.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn execute<W: Write>(&self, writer: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let entries = self.organizer.read(|s| s.event_log.clone());
        format.write(writer, &EventLog { entries })
    }
}
