//! Handle over one supervised child process.
//!
//! Wraps the OS process identity with a non-blocking liveness query, an
//! exit-status query, and the two termination operations the shutdown
//! escalation needs. Each handle is owned exclusively by the session and
//! shared by reference with the monitor and the coordinator.

use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::warn;

use crate::{Result, SessionError};

/// Which child of the session a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    /// External scheduler executable.
    Scheduler,
    /// Request-serving child (re-executed session binary).
    Serving,
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduler => f.write_str("scheduler"),
            Self::Serving => f.write_str("serving"),
        }
    }
}

/// Human-readable exit description used in monitor and shutdown logs.
#[must_use]
pub fn describe_exit(status: Option<ExitStatus>) -> String {
    status.map_or_else(
        || "status unknown".to_owned(),
        |s| {
            if s.success() {
                "exited normally (code 0)".to_owned()
            } else {
                s.code().map_or_else(
                    || "terminated by signal".to_owned(),
                    |c| format!("exited with code {c}"),
                )
            }
        },
    )
}

struct Inner {
    child: Child,
    status: Option<ExitStatus>,
}

/// Live handle to one child process.
pub struct ProcessHandle {
    role: ProcessRole,
    pid: u32,
    inner: Mutex<Inner>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("role", &self.role)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

impl ProcessHandle {
    /// Wrap a freshly spawned child.
    #[must_use]
    pub fn new(role: ProcessRole, child: Child) -> Self {
        let pid = child.id().unwrap_or(0);
        Self {
            role,
            pid,
            inner: Mutex::new(Inner {
                child,
                status: None,
            }),
        }
    }

    /// Which child this handle supervises.
    #[must_use]
    pub fn role(&self) -> ProcessRole {
        self.role
    }

    /// OS process id, as announced at launch.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Non-blocking exit check. Caches the status once observed so later
    /// queries keep answering after the child is reaped.
    pub async fn poll_exit(&self) -> Option<ExitStatus> {
        let mut inner = self.inner.lock().await;
        if let Some(status) = inner.status {
            return Some(status);
        }
        match inner.child.try_wait() {
            Ok(Some(status)) => {
                inner.status = Some(status);
                Some(status)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(process = %self.role, %err, "failed to poll child process status");
                None
            }
        }
    }

    /// Whether the process is still running.
    pub async fn is_alive(&self) -> bool {
        self.poll_exit().await.is_none()
    }

    /// Exit status, if the process has terminated.
    pub async fn exit_status(&self) -> Option<ExitStatus> {
        self.poll_exit().await
    }

    /// Graceful termination request (SIGTERM on Unix). The request is
    /// asynchronous: pair it with [`ProcessHandle::wait_timeout`].
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Io` if the signal cannot be delivered, for
    /// instance because the process is already gone.
    pub async fn terminate(&self) -> Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let inner = self.inner.lock().await;
            if inner.status.is_some() {
                return Ok(());
            }
            drop(inner);

            let pid = i32::try_from(self.pid)
                .map_err(|_| SessionError::Io(format!("pid {} out of range", self.pid)))?;
            kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(|err| {
                SessionError::Io(format!("SIGTERM to {} ({}) failed: {err}", self.role, self.pid))
            })?;
            Ok(())
        }

        #[cfg(not(unix))]
        {
            // No cross-process graceful signal on this platform; escalate
            // straight to the forced path.
            let mut inner = self.inner.lock().await;
            if inner.status.is_some() {
                return Ok(());
            }
            inner.child.start_kill().map_err(|err| {
                SessionError::Io(format!("kill of {} ({}) failed: {err}", self.role, self.pid))
            })
        }
    }

    /// Wait up to `timeout` for the process to exit; `None` if it is
    /// still alive when the timeout elapses.
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(status) = self.poll_exit().await {
                return Some(status);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Forced kill (SIGKILL on Unix) plus reap. A no-op if the process
    /// has already exited.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Io` if the kill itself fails; the caller
    /// logs and moves on; shutdown never propagates this.
    pub async fn kill(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.status.is_some() {
            return Ok(());
        }
        inner.child.kill().await.map_err(|err| {
            SessionError::Io(format!("kill of {} ({}) failed: {err}", self.role, self.pid))
        })?;
        if let Ok(Some(status)) = inner.child.try_wait() {
            inner.status = Some(status);
        }
        Ok(())
    }
}
