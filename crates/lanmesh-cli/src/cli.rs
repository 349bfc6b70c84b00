//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Default location of the organizer state file.
pub const DEFAULT_STATE_FILE: &str = "/var/lib/lanmesh/state.json";

/// lanmesh - trust and admission control for a local encrypted mesh.
#[derive(Parser, Debug, Clone)]
#[command(name = "lanmesh")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// State file to operate on.
    #[arg(short, long, env = "LANMESH_STATE_FILE", default_value = DEFAULT_STATE_FILE)]
    pub state_file: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    pub verbose: bool,

    /// Log line format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Log output options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum LogFormat {
    /// Plain text lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Admit descriptor strings, one per line, from a file or stdin.
    Import {
        /// File to read; stdin when omitted.
        file: Option<PathBuf>,
    },

    /// Feed a system state snapshot (JSON) from a file or stdin.
    SystemState {
        /// File to read; stdin when omitted.
        file: Option<PathBuf>,
    },

    /// Peer inspection and trust edits.
    Peer {
        /// Peer subcommand to execute.
        #[command(subcommand)]
        command: PeerCommands,
    },

    /// Show or edit preferences.
    Prefs {
        /// Prefs subcommand to execute.
        #[command(subcommand)]
        command: PrefsCommands,
    },

    /// Print the recorded event log.
    Eventlog,

    /// Print hosts-file lines for enabled peers.
    Hosts,

    /// Sign and verify descriptor strings.
    Descriptor {
        /// Descriptor subcommand to execute.
        #[command(subcommand)]
        command: DescriptorCommands,
    },
}

/// Which peers to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum WhichArg {
    /// Every known peer.
    #[default]
    All,
    /// Enabled peers only.
    Enabled,
    /// Disabled peers only.
    Disabled,
}

/// Peer subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum PeerCommands {
    /// Show one peer, or all peers when no query is given.
    Show {
        /// Peer id, enabled name or enabled address.
        query: Option<String>,
    },

    /// Print a peer's current descriptor string.
    Descriptor {
        /// Peer id, enabled name or enabled address.
        query: String,
    },

    /// List peer ids.
    Ids {
        /// Which peers to include.
        #[arg(value_enum, default_value_t = WhichArg::All)]
        which: WhichArg,
    },

    /// Set a peer field, e.g. `pinned true` or `nicknames.nas false`.
    Set {
        /// Peer id, enabled name or enabled address.
        query: String,
        /// Field path below the peer.
        field: String,
        /// New value.
        value: String,
    },

    /// Remove a peer.
    Remove {
        /// Peer id, enabled name or enabled address.
        query: String,
    },

    /// Confirm that a key owns a hostname, then pin that peer.
    Verify {
        /// Expected verification key (base64).
        vk: String,
        /// Hostname the key should own.
        hostname: String,
    },

    /// Add or remove a peer address.
    Addr {
        /// Address subcommand to execute.
        #[command(subcommand)]
        command: AddrCommands,
    },
}

/// Peer address subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum AddrCommands {
    /// Add an enabled address.
    Add {
        /// Peer id, enabled name or enabled address.
        query: String,
        /// IPv4 or IPv6 address.
        addr: String,
    },

    /// Remove an address.
    Del {
        /// Peer id, enabled name or enabled address.
        query: String,
        /// IPv4 or IPv6 address.
        addr: String,
    },
}

/// Prefs subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum PrefsCommands {
    /// Show all preferences.
    Show,

    /// Set a preference.
    Set {
        /// Preference name, e.g. `pin_new_peers`.
        name: String,
        /// New value.
        value: String,
    },

    /// Add an entry to a list preference.
    Add {
        /// Preference name, e.g. `local_domains`.
        name: String,
        /// Entry to add.
        value: String,
    },

    /// Remove an entry from a list preference.
    Remove {
        /// Preference name, e.g. `local_domains`.
        name: String,
        /// Entry to remove.
        value: String,
    },
}

/// Descriptor subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum DescriptorCommands {
    /// Sign a descriptor with an Ed25519 seed.
    Sign {
        /// Base64 Ed25519 seed (32 bytes).
        #[arg(long, env = "LANMESH_SIGNING_SEED", hide_env_values = true)]
        seed: String,
        /// Descriptor string; its `vk` must match the seed.
        descriptor: String,
    },

    /// Check a descriptor's signature.
    Verify {
        /// Descriptor string.
        descriptor: String,
    },
}
