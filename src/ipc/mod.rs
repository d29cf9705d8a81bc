//! Inter-process primitives allocated once per session.
//!
//! The token channel, the start and cache-ready events, and the
//! broadcast endpoint are all allocated before either child process is
//! launched and are passed unchanged into both. Nothing is recreated
//! mid-session.

pub mod event;
pub mod token;

use std::path::PathBuf;

use tempfile::TempDir;
use tracing::debug;

use crate::{Result, SessionError};

pub use event::OneShotEvent;
pub use token::{TokenChannel, TokenEvent, TokenReceiver, TokenSender};

/// The four cooperating IPC primitives owned by a session.
#[derive(Debug)]
pub struct IpcChannelSet {
    /// Bounded token-delivery channel (host side).
    pub tokens: TokenChannel,
    /// One-shot "serving process is ready to accept traffic" flag.
    pub start: OneShotEvent,
    /// One-shot "engine state/cache is initialized" flag.
    pub cache_ready: OneShotEvent,
    /// Rendezvous address for communication established directly between
    /// the scheduler and serving processes; allocated here, spoken
    /// elsewhere.
    pub broadcast_endpoint: PathBuf,
    /// Runtime directory holding the event sentinels and the endpoint.
    /// Removed when the session is dropped.
    runtime_dir: TempDir,
}

/// Everything a child process needs to attach to an existing channel set.
#[derive(Debug, Clone)]
pub struct IpcAttachment {
    /// Token channel socket name.
    pub token_socket: String,
    /// Start event sentinel path.
    pub start_event: PathBuf,
    /// Cache-ready event sentinel path.
    pub cache_ready_event: PathBuf,
    /// Broadcast endpoint path.
    pub broadcast_endpoint: PathBuf,
}

impl IpcChannelSet {
    /// Allocate the full channel set with the given token channel
    /// capacity.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Resource` if the host cannot provide a
    /// runtime directory or a local socket.
    pub fn allocate(capacity: usize) -> Result<Self> {
        let runtime_dir = tempfile::Builder::new()
            .prefix("inferd-session-")
            .tempdir()
            .map_err(|err| {
                SessionError::Resource(format!("cannot create session runtime dir: {err}"))
            })?;

        let tokens = TokenChannel::allocate(capacity)?;
        let start = OneShotEvent::at(runtime_dir.path().join("start.event"));
        let cache_ready = OneShotEvent::at(runtime_dir.path().join("cache_ready.event"));

        let broadcast_endpoint = runtime_dir.path().join("broadcast.endpoint");
        std::fs::File::create(&broadcast_endpoint).map_err(|err| {
            SessionError::Resource(format!("cannot allocate broadcast endpoint: {err}"))
        })?;

        debug!(
            token_socket = tokens.name(),
            runtime_dir = %runtime_dir.path().display(),
            capacity,
            "ipc channel set allocated"
        );

        Ok(Self {
            tokens,
            start,
            cache_ready,
            broadcast_endpoint,
            runtime_dir,
        })
    }

    /// Attachment info handed to the serving child.
    #[must_use]
    pub fn attachment(&self) -> IpcAttachment {
        IpcAttachment {
            token_socket: self.tokens.name().to_owned(),
            start_event: self.start.path().to_path_buf(),
            cache_ready_event: self.cache_ready.path().to_path_buf(),
            broadcast_endpoint: self.broadcast_endpoint.clone(),
        }
    }

    /// Runtime directory path (kept for diagnostics and tests).
    #[must_use]
    pub fn runtime_dir(&self) -> &std::path::Path {
        self.runtime_dir.path()
    }
}
