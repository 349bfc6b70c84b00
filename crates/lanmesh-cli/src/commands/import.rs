//! Descriptor import command implementation.
//!
//! Each non-empty input line is one descriptor string. Lines that fail to
//! parse or verify are counted and skipped; the rest go through admission.

use std::io::Write;

use lanmesh_organize::Organizer;
use tracing::{debug, info};

use crate::error::CliError;
use crate::output::{ImportReport, OutputFormat, TransitionReport};

/// Import command executor.
pub struct ImportCommand<'a> {
    organizer: &'a Organizer,
}

impl<'a> ImportCommand<'a> {
    /// Create a new import command.
    #[must_use]
    pub fn new(organizer: &'a Organizer) -> Self {
        Self { organizer }
    }

    /// Admit every descriptor in `input`.
    ///
    /// # Errors
    ///
    /// Returns an error on a consistency failure or if the state cannot be saved.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        input: &str,
    ) -> Result<(), CliError> {
        let report = self.import(input)?;
        info!(
            processed = report.results.len(),
            dropped = report.dropped,
            "import finished"
        );
        format.write(writer, &report)
    }

    /// Runs the admission pipeline over each line.
    pub fn import(&self, input: &str) -> Result<ImportReport, CliError> {
        let mut report = ImportReport::default();
        for (n, line) in input.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match self.organizer.process_descriptor_string(line)? {
                Some(result) => report.results.push(TransitionReport::from(&result)),
                None => {
                    debug!(line = n + 1, "descriptor dropped");
                    report.dropped += 1;
                }
            }
        }
        Ok(report)
    }
}
