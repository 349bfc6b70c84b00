//! Descriptor tooling command implementation.

use std::io::Write;

use base64::Engine as _;
use ed25519_dalek::SigningKey;
use lanmesh_organize::{Descriptor, VerifyKey};
use tracing::debug;

use crate::cli::DescriptorCommands;
use crate::error::CliError;
use crate::output::{DescriptorView, OutputFormat, VerifyReport};

/// Descriptor command executor. Works without a state file.
#[derive(Debug, Default)]
pub struct DescriptorCommand;

impl DescriptorCommand {
    /// Create a new descriptor command.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Execute a descriptor subcommand.
    ///
    /// # Errors
    ///
    /// Returns an error for unparsable input, a seed that does not own the
    /// descriptor, or a signature that does not verify.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        command: &DescriptorCommands,
    ) -> Result<(), CliError> {
        match command {
            DescriptorCommands::Sign { seed, descriptor } => {
                let signed = Self::sign(seed, descriptor)?;
                format.write(writer, &view(&signed))?;
            }
            DescriptorCommands::Verify { descriptor } => {
                let descriptor = Descriptor::parse(descriptor)?;
                let report = VerifyReport {
                    view: view(&descriptor),
                };
                format.write(writer, &report)?;
                if !report.view.valid {
                    return Err(CliError::InvalidArgument(format!(
                        "signature does not verify for {}",
                        descriptor.vk()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Signs `descriptor` with the Ed25519 key from a base64 `seed`.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed is malformed or its public key is not
    /// the descriptor's `vk`.
    pub fn sign(seed: &str, descriptor: &str) -> Result<Descriptor, CliError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(seed.trim())
            .map_err(|e| CliError::InvalidArgument(format!("seed: {e}")))?;
        let seed: [u8; ed25519_dalek::SECRET_KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            CliError::InvalidArgument(format!(
                "seed: expected {} bytes, got {}",
                ed25519_dalek::SECRET_KEY_LENGTH,
                bytes.len()
            ))
        })?;
        let key = SigningKey::from_bytes(&seed);
        let descriptor = Descriptor::parse(descriptor)?;
        let owner = VerifyKey::from(key.verifying_key());
        if *descriptor.vk() != owner {
            return Err(CliError::InvalidArgument(format!(
                "seed belongs to {owner}, descriptor names {}",
                descriptor.vk()
            )));
        }
        debug!(hostname = descriptor.hostname(), vf = descriptor.vf(), "signing descriptor");
        Ok(descriptor.sign(&key))
    }
}

fn view(descriptor: &Descriptor) -> DescriptorView {
    DescriptorView {
        descriptor: descriptor.to_string(),
        id: descriptor.id().to_string(),
        hostname: descriptor.hostname().to_string(),
        valid: descriptor.verify(),
    }
}
