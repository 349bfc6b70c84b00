//! Peer command implementation.
//!
//! Provides subcommands for:
//! - Showing and listing peers
//! - Editing trust flags, names and addresses
//! - Removing peers
//! - Verifying and pinning a peer by key and hostname

use std::io::Write;
use std::net::IpAddr;

use lanmesh_engine::WriteOp;
use lanmesh_organize::{OrganizeEvent, Organizer, Peer, PeerId, UserEdit, Which};

use crate::cli::{AddrCommands, PeerCommands, WhichArg};
use crate::commands::commit;
use crate::error::CliError;
use crate::output::{DescriptorView, IdList, OutputFormat, PeerDetail, PeerList, PeerRow};

/// Peer command executor.
pub struct PeerCommand<'a> {
    organizer: &'a Organizer,
}

impl<'a> PeerCommand<'a> {
    /// Create a new peer command.
    #[must_use]
    pub fn new(organizer: &'a Organizer) -> Self {
        Self { organizer }
    }

    /// Execute a peer subcommand.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer cannot be resolved or the transaction fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        command: &PeerCommands,
    ) -> Result<(), CliError> {
        match command {
            PeerCommands::Show { query: None } => {
                let peers = self
                    .organizer
                    .read(|s| s.peers.peers().map(PeerRow::from).collect());
                format.write(writer, &PeerList { peers })?;
            }
            PeerCommands::Show { query: Some(query) } => {
                let peer = self.resolve(query)?;
                format.write(writer, &PeerDetail { peer })?;
            }
            PeerCommands::Descriptor { query } => {
                let peer = self.resolve(query)?;
                let d = &peer.descriptor;
                let view = DescriptorView {
                    descriptor: d.to_string(),
                    id: d.id().to_string(),
                    hostname: d.hostname().to_string(),
                    valid: d.verify(),
                };
                format.write(writer, &view)?;
            }
            PeerCommands::Ids { which } => {
                let which = match which {
                    WhichArg::All => Which::All,
                    WhichArg::Enabled => Which::Enabled,
                    WhichArg::Disabled => Which::Disabled,
                };
                let ids = self
                    .organizer
                    .read(|s| s.peers.ids(which))
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                format.write(writer, &IdList { ids })?;
            }
            PeerCommands::Set { query, field, value } => {
                let id = self.resolve(query)?.id();
                let edit = UserEdit::new(WriteOp::Set, format!("peers.{id}.{field}"), value.clone());
                self.edit(writer, format, edit)?;
            }
            PeerCommands::Remove { query } => {
                let event = OrganizeEvent::UserRemovePeer {
                    query: query.clone(),
                };
                let report = commit(self.organizer, event)?;
                format.write(writer, &report)?;
            }
            PeerCommands::Verify { vk, hostname } => {
                let vk: PeerId = vk.parse()?;
                let event = OrganizeEvent::VerifyAndPinPeer {
                    vk,
                    hostname: hostname.clone(),
                };
                let report = commit(self.organizer, event)?;
                format.write(writer, &report)?;
            }
            PeerCommands::Addr { command } => {
                let edit = self.address_edit(command)?;
                self.edit(writer, format, edit)?;
            }
        }
        Ok(())
    }

    /// Finds a peer by id, enabled name or enabled address.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::PeerNotFound`] when nothing matches.
    pub fn resolve(&self, query: &str) -> Result<Peer, CliError> {
        self.organizer
            .read(|s| s.peers.query(query).map(|p| p.cloned()))?
            .ok_or_else(|| CliError::PeerNotFound(query.to_string()))
    }

    fn address_edit(&self, command: &AddrCommands) -> Result<UserEdit, CliError> {
        let (query, addr) = match command {
            AddrCommands::Add { query, addr } | AddrCommands::Del { query, addr } => (query, addr),
        };
        let ip: IpAddr = addr
            .parse()
            .map_err(|_| CliError::InvalidArgument(format!("not an IP address: {addr}")))?;
        let family = if ip.is_ipv4() { "IPv4addrs" } else { "IPv6addrs" };
        let id = self.resolve(query)?.id();
        Ok(match command {
            AddrCommands::Add { .. } => {
                UserEdit::new(WriteOp::Add, format!("peers.{id}.{family}"), ip.to_string())
            }
            AddrCommands::Del { .. } => {
                UserEdit::new(WriteOp::Remove, format!("peers.{id}.{family}.{ip}"), "")
            }
        })
    }

    fn edit<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        edit: UserEdit,
    ) -> Result<(), CliError> {
        let report = commit(self.organizer, OrganizeEvent::UserEdit(edit))?;
        format.write(writer, &report)
    }
}
