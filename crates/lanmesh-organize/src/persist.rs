//! JSON state file.
//!
//! Saves replace the file atomically through a temporary sibling. A file that
//! cannot be parsed, or parses into an invalid state, is moved aside and the
//! default state is used instead.

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::state::OrganizeState;

/// Location of the persisted [`OrganizeState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    /// Uses the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the state, falling back to the default for a missing or corrupt
    /// file.
    pub fn load(&self) -> Result<OrganizeState> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no state file, starting empty");
                return Ok(OrganizeState::default());
            }
            Err(e) => return Err(e.into()),
        };
        let problem = match serde_json::from_str::<OrganizeState>(&text) {
            Ok(state) => {
                let violations = state.validate();
                if violations.is_empty() {
                    debug!(path = %self.path.display(), peers = state.peers.len(), "loaded state");
                    return Ok(state);
                }
                violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            }
            Err(e) => e.to_string(),
        };
        let moved = self.quarantine()?;
        warn!(
            path = %self.path.display(),
            moved_to = %moved.display(),
            error = %problem,
            "state file unusable, starting empty"
        );
        Ok(OrganizeState::default())
    }

    /// Writes the state atomically. The file is private to the owner.
    pub fn save(&self, state: &OrganizeState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(state)?;
        let tmp = self.sibling("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            restrict_permissions(&file)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "saved state");
        Ok(())
    }

    fn quarantine(&self) -> Result<PathBuf> {
        let target = self.sibling(&format!("corrupt-{}", Utc::now().timestamp()));
        fs::rename(&self.path, &target)?;
        Ok(target)
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) -> io::Result<()> {
    Ok(())
}
