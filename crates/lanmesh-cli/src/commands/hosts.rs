//! Hosts-file command implementation.

use std::io::Write;

use lanmesh_organize::Organizer;

use crate::error::CliError;
use crate::output::{HostEntry, Hosts, OutputFormat};

/// Hosts command executor.
pub struct HostsCommand<'a> {
    organizer: &'a Organizer,
}

impl<'a> HostsCommand<'a> {
    /// Create a new hosts command.
    #[must_use]
    pub fn new(organizer: &'a Organizer) -> Self {
        Self { organizer }
    }

    /// Print one `address name` line per enabled name.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn execute<W: Write>(&self, writer: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let entries = self
            .organizer
            .read(|s| s.peers.hosts_entries())
            .into_iter()
            .map(|(addr, name)| HostEntry { addr, name })
            .collect();
        format.write(writer, &Hosts { entries })
    }
}
