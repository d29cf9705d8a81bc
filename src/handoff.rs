//! Config snapshot handoff between the session host and the scheduler.
//!
//! The effective configuration is serialized once to a kept temp file; the
//! scheduler process receives the path as `--config <path>` and
//! reconstructs the configuration on its own, with no shared memory with
//! the writer. The snapshot is never mutated after creation.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::GlobalConfig;
use crate::{Result, SessionError};

/// Durable reference to a single serialized configuration snapshot.
///
/// Valid for the lifetime of the session; the file is left in place on
/// session end as diagnostic state.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    path: PathBuf,
}

impl ConfigHandle {
    /// Path of the snapshot file, as passed to the scheduler.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reconstruct the configuration from the snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Persistence` if the snapshot cannot be read
    /// or no longer parses.
    pub fn load(&self) -> Result<GlobalConfig> {
        let raw = std::fs::read_to_string(&self.path).map_err(|err| {
            SessionError::Persistence(format!(
                "cannot read config snapshot '{}': {err}",
                self.path.display()
            ))
        })?;
        let config: GlobalConfig = toml::from_str(&raw)
            .map_err(|err| SessionError::Persistence(format!("config snapshot corrupt: {err}")))?;
        Ok(config)
    }
}

/// Serialize `config` to a kept temp file and return its handle.
///
/// # Errors
///
/// Returns `SessionError::Persistence` if the temp store is unwritable
/// (disk full, permission denied) or serialization fails.
pub fn write(config: &GlobalConfig) -> Result<ConfigHandle> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|err| SessionError::Persistence(format!("cannot serialize config: {err}")))?;

    let mut file = tempfile::Builder::new()
        .prefix("inferd-config-")
        .suffix(".toml")
        .tempfile()
        .map_err(|err| SessionError::Persistence(format!("cannot create config snapshot: {err}")))?;

    file.write_all(rendered.as_bytes())
        .map_err(|err| SessionError::Persistence(format!("cannot write config snapshot: {err}")))?;

    // Persist past the NamedTempFile guard; the scheduler outlives this scope.
    let (_file, path) = file
        .keep()
        .map_err(|err| SessionError::Persistence(format!("cannot keep config snapshot: {err}")))?;

    debug!(path = %path.display(), "config snapshot written");
    Ok(ConfigHandle { path })
}
