//! Preference command implementation.

use std::io::Write;

use lanmesh_engine::WriteOp;
use lanmesh_organize::{OrganizeEvent, Organizer, UserEdit};

use crate::cli::PrefsCommands;
use crate::commands::commit;
use crate::error::CliError;
use crate::output::{OutputFormat, PrefsView};

/// Prefs command executor.
pub struct PrefsCommand<'a> {
    organizer: &'a Organizer,
}

impl<'a> PrefsCommand<'a> {
    /// Create a new prefs command.
    #[must_use]
    pub fn new(organizer: &'a Organizer) -> Self {
        Self { organizer }
    }

    /// Execute a prefs subcommand.
    ///
    /// # Errors
    ///
    /// Returns an error if the edit is rejected.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        command: &PrefsCommands,
    ) -> Result<(), CliError> {
        let (op, name, value) = match command {
            PrefsCommands::Show => {
                let prefs = self.organizer.read(|s| s.prefs.clone());
                return format.write(writer, &PrefsView { prefs });
            }
            PrefsCommands::Set { name, value } => (WriteOp::Set, name, value),
            PrefsCommands::Add { name, value } => (WriteOp::Add, name, value),
            PrefsCommands::Remove { name, value } => (WriteOp::Remove, name, value),
        };
        let edit = UserEdit::new(op, format!("prefs.{name}"), value.clone());
        let report = commit(self.organizer, OrganizeEvent::UserEdit(edit))?;
        format.write(writer, &report)
    }
}
