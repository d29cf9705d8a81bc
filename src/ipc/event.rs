//! One-shot, broadcast-once synchronization events.
//!
//! An event is a sentinel file inside the session's runtime directory.
//! `signal` creates the file (idempotent); `wait` combines an existence
//! check with a `notify` file-system watcher so that waiters in any
//! process observe the flag without tight polling. Events are monotonic:
//! once signaled they stay signaled, and there is no reset.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecursiveMode, Watcher};

use crate::{Result, SessionError};

/// A one-shot broadcast flag shared between the session's processes.
#[derive(Debug, Clone)]
pub struct OneShotEvent {
    path: PathBuf,
}

impl OneShotEvent {
    /// Bind an event to its sentinel path.
    ///
    /// The path itself is allocated by [`crate::ipc::IpcChannelSet`]; child
    /// processes rebuild the event from the path they were handed.
    #[must_use]
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    /// Sentinel path, as passed to child processes.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the event has fired.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.path.exists()
    }

    /// Fire the event. Signaling an already-fired event has no further
    /// effect.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Io` if the sentinel file cannot be created.
    pub fn signal(&self) -> Result<()> {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| {
                SessionError::Io(format!(
                    "cannot signal event '{}': {err}",
                    self.path.display()
                ))
            })?;
        Ok(())
    }

    /// Wait until the event fires or `timeout` elapses.
    ///
    /// Returns `true` if the event fired before the timeout. An
    /// already-fired event returns `true` immediately.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Resource` if the file-system watcher cannot
    /// be created or attached.
    pub async fn wait(&self, timeout: Duration) -> Result<bool> {
        if self.is_set() {
            return Ok(true);
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| {
                if let Ok(event) = result {
                    if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        let _ = tx.send(());
                    }
                }
            },
        )
        .map_err(|err| SessionError::Resource(format!("cannot create event watcher: {err}")))?;

        // Watch the parent directory so the sentinel's creation is seen
        // regardless of how the signaling process writes it.
        let watch_target = self.path.parent().unwrap_or_else(|| Path::new("."));
        watcher
            .watch(watch_target, RecursiveMode::NonRecursive)
            .map_err(|err| {
                SessionError::Resource(format!(
                    "cannot watch '{}': {err}",
                    watch_target.display()
                ))
            })?;

        // Re-check after the watch is active: the signal may have landed
        // between the first check and watcher registration.
        if self.is_set() {
            return Ok(true);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(self.is_set());
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some(())) => {
                    if self.is_set() {
                        return Ok(true);
                    }
                    // Unrelated change in the runtime dir; keep waiting.
                }
                // Watcher callback dropped or deadline hit: final check.
                Ok(None) | Err(_) => return Ok(self.is_set()),
            }
        }
    }
}
