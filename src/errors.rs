//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Session error enumeration covering all supervisor failure modes.
#[derive(Debug)]
pub enum SessionError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Config snapshot could not be written or read back.
    Persistence(String),
    /// The host could not provide a requested IPC primitive.
    Resource(String),
    /// A child process could not be started.
    Launch(String),
    /// Token channel is at capacity (non-blocking send only).
    ChannelFull,
    /// Token channel has been closed; no further delivery is possible.
    ChannelClosed,
    /// IPC transport failure during steady state.
    Ipc(String),
    /// Execution engine failure.
    Engine(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Persistence(msg) => write!(f, "persistence: {msg}"),
            Self::Resource(msg) => write!(f, "resource: {msg}"),
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::ChannelFull => write!(f, "token channel full"),
            Self::ChannelClosed => write!(f, "token channel closed"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Engine(msg) => write!(f, "engine: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<toml::de::Error> for SessionError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
