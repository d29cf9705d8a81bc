//! Escalating, idempotent session shutdown.
//!
//! Every termination trigger (monitor-detected child death, OS signal,
//! engine error, normal engine completion) funnels through
//! [`ShutdownCoordinator::shutdown`]. The session-wide tri-state flag
//! guarantees exactly one escalation sequence per child no matter how
//! many triggers race; losing callers wait until the winning sequence
//! completes so that nobody force-exits mid-escalation.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::session::handle::{describe_exit, ProcessHandle};

const RUNNING: u8 = 0;
const SHUTTING_DOWN: u8 = 1;
const DONE: u8 = 2;

/// Lifecycle stage of the session-wide shutdown flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStage {
    /// Session is live; no trigger has fired.
    Running,
    /// A trigger won the flag; escalation is in progress.
    ShuttingDown,
    /// Both children are confirmed terminated.
    Done,
}

/// Process-wide shutdown flag. `Running → ShuttingDown` happens at most
/// once per session, via compare-and-set rather than check-then-set.
#[derive(Debug, Default)]
pub struct ShutdownState(AtomicU8);

impl ShutdownState {
    /// A flag in the `Running` stage.
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicU8::new(RUNNING))
    }

    /// Attempt the `Running → ShuttingDown` transition. Returns whether
    /// this caller won; losers observe the transition already made.
    #[must_use]
    pub fn begin(&self) -> bool {
        self.0
            .compare_exchange(RUNNING, SHUTTING_DOWN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Mark the escalation complete (`ShuttingDown → Done`).
    pub fn finish(&self) {
        self.0.store(DONE, Ordering::Release);
    }

    /// Current stage.
    #[must_use]
    pub fn stage(&self) -> ShutdownStage {
        match self.0.load(Ordering::Acquire) {
            RUNNING => ShutdownStage::Running,
            SHUTTING_DOWN => ShutdownStage::ShuttingDown,
            _ => ShutdownStage::Done,
        }
    }
}

/// Single entry point for terminating both children.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    scheduler: Arc<ProcessHandle>,
    serving: Arc<ProcessHandle>,
    state: Arc<ShutdownState>,
    grace: Duration,
    begun: CancellationToken,
    done: CancellationToken,
}

impl ShutdownCoordinator {
    /// Build a coordinator over the session's two child handles.
    #[must_use]
    pub fn new(
        scheduler: Arc<ProcessHandle>,
        serving: Arc<ProcessHandle>,
        state: Arc<ShutdownState>,
        grace: Duration,
    ) -> Self {
        Self {
            scheduler,
            serving,
            state,
            grace,
            begun: CancellationToken::new(),
            done: CancellationToken::new(),
        }
    }

    /// Token cancelled the moment any trigger wins the shutdown flag.
    /// The engine and the background tasks watch this to stand down.
    #[must_use]
    pub fn begun_token(&self) -> CancellationToken {
        self.begun.clone()
    }

    /// Current stage of the shutdown flag.
    #[must_use]
    pub fn stage(&self) -> ShutdownStage {
        self.state.stage()
    }

    /// Terminate both children with escalation, exactly once.
    ///
    /// The winning caller runs the per-child escalation for scheduler and
    /// serving process in parallel and returns once both are confirmed
    /// terminated or escalation is exhausted. Any later caller returns
    /// after the winning sequence completes. This function never fails;
    /// every step below it swallows and logs its own errors.
    pub async fn shutdown(&self, reason: &str) {
        if !self.state.begin() {
            self.done.cancelled().await;
            return;
        }

        info!(reason, "shutting down session");
        self.begun.cancel();

        tokio::join!(
            self.terminate_child(&self.scheduler),
            self.terminate_child(&self.serving),
        );

        self.state.finish();
        self.done.cancel();
        info!("session shutdown complete");
    }

    /// Escalating termination of one child: graceful request, bounded
    /// wait, forced kill. Failures are logged, never raised.
    async fn terminate_child(&self, handle: &ProcessHandle) {
        if let Some(status) = handle.poll_exit().await {
            info!(
                process = %handle.role(),
                pid = handle.pid(),
                status = %describe_exit(Some(status)),
                "child already exited"
            );
            return;
        }

        info!(
            process = %handle.role(),
            pid = handle.pid(),
            "sending graceful termination request"
        );
        if let Err(err) = handle.terminate().await {
            warn!(process = %handle.role(), %err, "graceful termination request failed");
        }

        if let Some(status) = handle.wait_timeout(self.grace).await {
            info!(
                process = %handle.role(),
                pid = handle.pid(),
                status = %describe_exit(Some(status)),
                "child exited after graceful request"
            );
            return;
        }

        warn!(
            process = %handle.role(),
            pid = handle.pid(),
            grace = ?self.grace,
            "child did not exit within grace period, forcing kill"
        );
        if let Err(err) = handle.kill().await {
            warn!(process = %handle.role(), %err, "forced kill failed");
        }
    }
}
