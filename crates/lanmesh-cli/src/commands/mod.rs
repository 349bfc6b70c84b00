//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`import`] - Descriptor admission
//! - [`system`] - System state snapshots
//! - [`peer`] - Peer inspection and trust edits
//! - [`prefs`] - Preference edits
//! - [`eventlog`] - Recorded events
//! - [`hosts`] - Hosts-file rendering
//! - [`descriptor`] - Descriptor signing and verification

pub mod descriptor;
pub mod eventlog;
pub mod hosts;
pub mod import;
pub mod peer;
pub mod prefs;
pub mod system;

pub use descriptor::DescriptorCommand;
pub use eventlog::EventlogCommand;
pub use hosts::HostsCommand;
pub use import::ImportCommand;
pub use peer::PeerCommand;
pub use prefs::PrefsCommand;
pub use system::SystemStateCommand;

use lanmesh_organize::{OrganizeEvent, OrganizeResult, Organizer};
use tracing::warn;

use crate::error::CliError;
use crate::output::TransitionReport;

/// Runs `event` and converts a discarded transaction into an error.
pub(crate) fn commit(organizer: &Organizer, event: OrganizeEvent) -> Result<TransitionReport, CliError> {
    let result: OrganizeResult = organizer.handle(event)?;
    let report = TransitionReport::from(&result);
    match report.error.clone() {
        None => Ok(report),
        Some(error) => {
            warn!(event = %report.event, %error, "transaction discarded");
            Err(CliError::Transition(error))
        }
    }
}
