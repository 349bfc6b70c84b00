//! System state snapshot command implementation.

use std::io::Write;

use lanmesh_organize::{OrganizeEvent, Organizer, SystemState};

use crate::commands::commit;
use crate::error::CliError;
use crate::output::OutputFormat;

/// System state command executor.
pub struct SystemStateCommand<'a> {
    organizer: &'a Organizer,
}

impl<'a> SystemStateCommand<'a> {
    /// Create a new system state command.
    #[must_use]
    pub fn new(organizer: &'a Organizer) -> Self {
        Self { organizer }
    }

    /// Deliver the JSON snapshot in `input` as a new system state.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot does not decode or the transaction fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        input: &str,
    ) -> Result<(), CliError> {
        let snapshot: SystemState = serde_json::from_str(input)?;
        let report = commit(self.organizer, OrganizeEvent::NewSystemState(snapshot))?;
        format.write(writer, &report)
    }
}
