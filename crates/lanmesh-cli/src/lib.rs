//! lanmesh CLI library.
//!
//! This crate provides the command-line interface for operating a lanmesh
//! organizer state file: admitting descriptors, feeding system snapshots,
//! editing peer trust and preferences, and signing descriptors.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, Format, LogFormat};
pub use error::CliError;
pub use output::OutputFormat;
