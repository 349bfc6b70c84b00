//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;
use std::net::IpAddr;

use lanmesh_organize::{EventRecord, OrganizeAction, OrganizeResult, OrganizeTrigger, Peer, Prefs};
use serde::Serialize;

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Get the current format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Check if JSON format is selected.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, Format::Json)
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

/// Summary of one engine transition.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionReport {
    /// Event name.
    pub event: String,
    /// Whether the transaction committed.
    pub ok: bool,
    /// Why the transaction was discarded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Actions with their subject or reason.
    pub actions: Vec<String>,
    /// `OP path` for each write.
    pub writes: Vec<String>,
    /// Side-effect requests with their arguments.
    pub triggers: Vec<String>,
}

impl From<&OrganizeResult> for TransitionReport {
    fn from(result: &OrganizeResult) -> Self {
        Self {
            event: lanmesh_engine::Event::name(&result.event).to_string(),
            ok: result.ok(),
            error: result.error.as_ref().map(ToString::to_string),
            actions: result.actions.iter().map(describe_action).collect(),
            writes: result
                .write_paths()
                .into_iter()
                .map(|(op, path)| format!("{op} {path}"))
                .collect(),
            triggers: result.triggers.iter().map(describe_trigger).collect(),
        }
    }
}

fn describe_action(action: &OrganizeAction) -> String {
    let name = lanmesh_engine::Action::name(action);
    match action {
        OrganizeAction::Ignore { reason } | OrganizeAction::Reject { reason } => {
            format!("{name} ({reason})")
        }
        OrganizeAction::AcceptNewPeer { id }
        | OrganizeAction::UpdatePeerDescriptor { id }
        | OrganizeAction::RemovePeer { id }
        | OrganizeAction::VerifyAndPinPeer { id } => format!("{name} {id}"),
        OrganizeAction::AcceptUserEdit | OrganizeAction::AdjustToNewSystemState => {
            name.to_string()
        }
    }
}

fn describe_trigger(trigger: &OrganizeTrigger) -> String {
    let name = lanmesh_engine::Trigger::name(trigger);
    match trigger {
        OrganizeTrigger::SyncPeer(id) => format!("{name} {id}"),
        OrganizeTrigger::RemoveTunnelPeer(pk) => format!("{name} {pk}"),
        OrganizeTrigger::RemoveRoutes(routes) => {
            let routes: Vec<String> = routes.iter().map(ToString::to_string).collect();
            format!("{name} {}", routes.join(", "))
        }
    }
}

impl TableDisplay for TransitionReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let status = if self.ok { "ok" } else { "discarded" };
        writeln!(writer, "{}: {status}", self.event)?;
        if let Some(error) = &self.error {
            writeln!(writer, "  error:   {error}")?;
        }
        for action in &self.actions {
            writeln!(writer, "  action:  {action}")?;
        }
        for write in &self.writes {
            writeln!(writer, "  write:   {write}")?;
        }
        for trigger in &self.triggers {
            writeln!(writer, "  trigger: {trigger}")?;
        }
        Ok(())
    }
}

/// Outcome of importing a batch of descriptor strings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// One report per descriptor that reached the engine.
    pub results: Vec<TransitionReport>,
    /// Lines dropped before the engine (unparsable or badly signed).
    pub dropped: usize,
}

impl TableDisplay for ImportReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        for result in &self.results {
            result.write_table(writer)?;
        }
        writeln!(
            writer,
            "Total: {} processed, {} dropped",
            self.results.len(),
            self.dropped
        )?;
        Ok(())
    }
}

/// Peer summary row.
#[derive(Debug, Clone, Serialize)]
pub struct PeerRow {
    /// Display name.
    pub name: String,
    /// Peer id.
    pub id: String,
    /// Enabled addresses.
    pub addresses: Vec<IpAddr>,
    /// Whether the peer is enabled.
    pub enabled: bool,
    /// Whether the peer is pinned.
    pub pinned: bool,
    /// Whether the peer was verified.
    pub verified: bool,
    /// Whether the peer is the gateway.
    pub gateway: bool,
}

impl From<&Peer> for PeerRow {
    fn from(peer: &Peer) -> Self {
        Self {
            name: peer.name().to_string(),
            id: peer.id().to_string(),
            addresses: peer.enabled_addresses(),
            enabled: peer.enabled,
            pinned: peer.pinned,
            verified: peer.verified,
            gateway: peer.use_as_gateway,
        }
    }
}

impl PeerRow {
    fn flags(&self) -> String {
        [
            (self.enabled, 'E'),
            (self.pinned, 'P'),
            (self.verified, 'V'),
            (self.gateway, 'G'),
        ]
        .iter()
        .map(|&(set, c)| if set { c } else { '-' })
        .collect()
    }
}

/// List of peers.
#[derive(Debug, Clone, Serialize)]
pub struct PeerList {
    /// Peers.
    pub peers: Vec<PeerRow>,
}

impl TableDisplay for PeerList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.peers.is_empty() {
            writeln!(writer, "No peers known")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<24}  {:<44}  {:<5}  ADDRESSES",
            "NAME", "ID", "FLAGS"
        )?;
        writeln!(writer, "{}", "─".repeat(96))?;
        for row in &self.peers {
            let addrs: Vec<String> = row.addresses.iter().map(ToString::to_string).collect();
            writeln!(
                writer,
                "{:<24}  {:<44}  {:<5}  {}",
                truncate(&row.name, 24),
                row.id,
                row.flags(),
                addrs.join(", ")
            )?;
        }
        writeln!(writer)?;
        writeln!(writer, "Total: {} peers", self.peers.len())?;
        Ok(())
    }
}

/// One peer in full.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct PeerDetail {
    /// The peer.
    pub peer: Peer,
}

impl TableDisplay for PeerDetail {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        write!(writer, "{}", self.peer.show())?;
        Ok(())
    }
}

/// A list of peer ids.
#[derive(Debug, Clone, Serialize)]
pub struct IdList {
    /// Ids in store order.
    pub ids: Vec<String>,
}

impl TableDisplay for IdList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        for id in &self.ids {
            writeln!(writer, "{id}")?;
        }
        Ok(())
    }
}

/// A descriptor string and whether its signature verifies.
#[derive(Debug, Clone, Serialize)]
pub struct DescriptorView {
    /// Wire form.
    pub descriptor: String,
    /// Peer id the descriptor claims.
    pub id: String,
    /// Announced hostname.
    pub hostname: String,
    /// Signature check result.
    pub valid: bool,
}

impl TableDisplay for DescriptorView {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "{}", self.descriptor)?;
        Ok(())
    }
}

/// Result of a signature check.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct VerifyReport {
    /// The checked descriptor.
    pub view: DescriptorView,
}

impl TableDisplay for VerifyReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        let mark = if self.view.valid { "✓ valid" } else { "✗ invalid" };
        writeln!(
            writer,
            "{mark} signature for {} ({})",
            self.view.hostname, self.view.id
        )?;
        Ok(())
    }
}

/// Current preferences.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct PrefsView {
    /// Preferences.
    pub prefs: Prefs,
}

impl TableDisplay for PrefsView {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "local_domains:  {}", self.prefs.local_domains.join(", "))?;
        writeln!(writer, "pin_new_peers:  {}", self.prefs.pin_new_peers)?;
        writeln!(writer, "record_events:  {}", self.prefs.record_events)?;
        Ok(())
    }
}

/// Recorded events.
#[derive(Debug, Clone, Serialize)]
pub struct EventLog {
    /// Entries, oldest first.
    pub entries: Vec<EventRecord>,
}

impl TableDisplay for EventLog {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.entries.is_empty() {
            writeln!(writer, "No events recorded")?;
            return Ok(());
        }
        for entry in &self.entries {
            writeln!(writer, "{entry}")?;
        }
        Ok(())
    }
}

/// Hosts-file entry.
#[derive(Debug, Clone, Serialize)]
pub struct HostEntry {
    /// Address.
    pub addr: IpAddr,
    /// Hostname.
    pub name: String,
}

/// Hosts-file lines.
#[derive(Debug, Clone, Serialize)]
pub struct Hosts {
    /// Entries.
    pub entries: Vec<HostEntry>,
}

impl TableDisplay for Hosts {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        for entry in &self.entries {
            writeln!(writer, "{} {}", entry.addr, entry.name)?;
        }
        Ok(())
    }
}

/// Simple message output.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// Message text.
    pub message: String,
    /// Whether this is a success message.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub success: bool,
}

impl Message {
    /// Create a success message.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
        }
    }

    /// Create an informational message.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: false,
        }
    }
}

impl TableDisplay for Message {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.success {
            writeln!(writer, "✓ {}", self.message)?;
        } else {
            writeln!(writer, "{}", self.message)?;
        }
        Ok(())
    }
}

/// Truncate a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    } else {
        s.chars().take(max_len).collect()
    }
}
