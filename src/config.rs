//! Runtime configuration parsing, validation, and defaults.
//!
//! The configuration is read from TOML once at startup, merged with CLI
//! overrides, and then snapshotted verbatim through
//! [`crate::handoff::write`] for the scheduler process. It therefore
//! derives both `Deserialize` and `Serialize` and must round-trip
//! losslessly.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, SessionError};

/// Listen address for the request-serving process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Interface the serving process binds to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the serving process listens on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    10_002
}

/// Scheduler process invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Scheduler executable; invoked as `<bin> --config <snapshot>`.
    pub bin: PathBuf,
    /// Extra arguments inserted before `--config`.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Serving process invocation settings.
///
/// The serving child is normally a re-execution of the session binary
/// itself; `command` exists so tests and embedders can substitute another
/// executable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServingConfig {
    /// Override for the serving child executable. `None` means
    /// `current_exe()`.
    #[serde(default)]
    pub command: Option<PathBuf>,
    /// Extra arguments appended after the IPC attachment arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Model identifier announced by the serving layer.
    pub model_name: String,
    /// Optional API key required by the serving layer.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Default sampling temperature handed to the engine.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Default nucleus sampling cutoff handed to the engine.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Directory receiving the scheduler's append-mode log file.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Token channel capacity, fixed for the session.
    #[serde(default = "default_token_channel_capacity")]
    pub token_channel_capacity: usize,
    /// Seconds each child is given to exit after a graceful request.
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
    /// Seconds between child liveness polls.
    #[serde(default = "default_monitor_poll_seconds")]
    pub monitor_poll_seconds: u64,
    /// Serving process listen address.
    #[serde(default)]
    pub server: ServerConfig,
    /// Scheduler process invocation.
    pub scheduler: SchedulerConfig,
    /// Serving process invocation.
    #[serde(default)]
    pub serving: ServingConfig,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    1.0
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_token_channel_capacity() -> usize {
    1000
}

fn default_shutdown_grace_seconds() -> u64 {
    5
}

fn default_monitor_poll_seconds() -> u64 {
    5
}

impl GlobalConfig {
    /// Parse and validate configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Config` if the document is not valid TOML,
    /// required fields are missing, or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field-level invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Config` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(SessionError::Config("model_name must not be empty".into()));
        }
        if self.scheduler.bin.as_os_str().is_empty() {
            return Err(SessionError::Config("scheduler.bin must not be empty".into()));
        }
        if self.token_channel_capacity == 0 {
            return Err(SessionError::Config(
                "token_channel_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Bounded wait applied between the graceful request and the forced kill.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// Interval between child liveness polls.
    #[must_use]
    pub fn monitor_poll(&self) -> Duration {
        Duration::from_secs(self.monitor_poll_seconds)
    }
}
