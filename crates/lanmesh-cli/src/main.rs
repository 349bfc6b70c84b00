//! lanmesh CLI binary entrypoint.

use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use lanmesh_cli::cli::{Cli, Commands, LogFormat};
use lanmesh_cli::commands::{
    DescriptorCommand, EventlogCommand, HostsCommand, ImportCommand, PeerCommand, PrefsCommand,
    SystemStateCommand,
};
use lanmesh_cli::output::OutputFormat;
use lanmesh_cli::CliError;
use lanmesh_organize::{OrganizeMachine, Organizer, StateFile};

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.verbose, cli.log_format) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Logs to stderr. `RUST_LOG` overrides the default level.
fn init_tracing(verbose: bool, log_format: LogFormat) -> anyhow::Result<()> {
    let default = if verbose { "lanmesh=debug" } else { "lanmesh=info" };
    let filter = EnvFilter::builder()
        .with_default_directive(default.parse()?)
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(filter);
    match log_format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(io::stderr))
            .try_init()?,
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init()?,
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    if let Commands::Descriptor { command } = &cli.command {
        return DescriptorCommand::new().execute(&mut stdout, &format, command);
    }

    debug!(path = %cli.state_file.display(), "opening state file");
    let organizer = Organizer::open(OrganizeMachine::new(), StateFile::new(&cli.state_file))?;

    match &cli.command {
        Commands::Import { file } => {
            let input = read_input(file.as_deref())?;
            ImportCommand::new(&organizer).execute(&mut stdout, &format, &input)?;
        }
        Commands::SystemState { file } => {
            let input = read_input(file.as_deref())?;
            SystemStateCommand::new(&organizer).execute(&mut stdout, &format, &input)?;
        }
        Commands::Peer { command } => {
            PeerCommand::new(&organizer).execute(&mut stdout, &format, command)?;
        }
        Commands::Prefs { command } => {
            PrefsCommand::new(&organizer).execute(&mut stdout, &format, command)?;
        }
        Commands::Eventlog => EventlogCommand::new(&organizer).execute(&mut stdout, &format)?,
        Commands::Hosts => HostsCommand::new(&organizer).execute(&mut stdout, &format)?,
        Commands::Descriptor { .. } => {}
    }

    Ok(())
}

/// Reads `file`, or stdin when no file is given.
fn read_input(file: Option<&Path>) -> io::Result<String> {
    match file {
        Some(path) => fs::read_to_string(path),
        None => {
            let mut input = String::new();
            io::stdin().read_to_string(&mut input)?;
            Ok(input)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanmesh_organize::OrganizeState;
    use tempfile::TempDir;

    fn cli(dir: &TempDir, args: &[&str]) -> Cli {
        let state = dir.path().join("state.json");
        let mut argv = vec!["lanmesh", "--state-file", state.to_str().unwrap()];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    fn saved(dir: &TempDir) -> OrganizeState {
        StateFile::new(dir.path().join("state.json")).load().unwrap()
    }

    #[test]
    fn edits_are_persisted() {
        let dir = TempDir::new().unwrap();
        run(cli(&dir, &["prefs", "set", "pin_new_peers", "true"])).unwrap();
        assert!(saved(&dir).prefs.pin_new_peers);

        run(cli(&dir, &["prefs", "add", "local_domains", "lan."])).unwrap();
        assert_eq!(saved(&dir).prefs.local_domains, vec!["local.", "lan."]);
    }

    #[test]
    fn system_state_from_file() {
        let dir = TempDir::new().unwrap();
        let snapshot = dir.path().join("system.json");
        fs::write(&snapshot, r#"{"current_subnets": {"10.0.0.0/24": ["10.0.0.2"]}}"#).unwrap();
        run(cli(&dir, &["system-state", snapshot.to_str().unwrap()])).unwrap();
        let subnets = saved(&dir).system_state.current_subnets;
        assert_eq!(subnets.len(), 1);
    }

    #[test]
    fn read_only_commands_do_not_create_state() {
        let dir = TempDir::new().unwrap();
        run(cli(&dir, &["hosts"])).unwrap();
        run(cli(&dir, &["eventlog"])).unwrap();
        run(cli(&dir, &["peer", "ids"])).unwrap();
        assert!(!dir.path().join("state.json").exists());
    }

    #[test]
    fn unknown_peer_fails() {
        let dir = TempDir::new().unwrap();
        let result = run(cli(&dir, &["peer", "show", "nas.local"]));
        assert!(matches!(result, Err(CliError::PeerNotFound(_))));
    }

    #[test]
    fn descriptor_commands_skip_the_state_file() {
        let dir = TempDir::new().unwrap();
        let result = run(cli(&dir, &["descriptor", "verify", "hostname=x;"]));
        assert!(matches!(result, Err(CliError::Descriptor(_))));
        assert!(!dir.path().join("state.json").exists());
    }
}
