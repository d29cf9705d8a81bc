//! Child liveness monitor.
//!
//! Polls both child handles on a fixed interval and treats the first
//! observed death as fatal to the whole session: a dead scheduler or
//! dead server leaves in-flight tokens without a guaranteed consumer, so
//! neither child is ever respawned; the monitor triggers full shutdown
//! and the session exits with status 1. The monitor watches until that
//! first death, triggers exactly once, then stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::session::handle::{describe_exit, ProcessHandle};
use crate::session::shutdown::ShutdownCoordinator;

/// Spawn the background watcher over both children.
///
/// The task polls every `poll_interval` until either a child dies (it
/// then marks the session failed and invokes the coordinator) or the
/// coordinator's begun token fires because shutdown started elsewhere.
#[must_use]
pub fn spawn_process_monitor(
    scheduler: Arc<ProcessHandle>,
    serving: Arc<ProcessHandle>,
    coordinator: ShutdownCoordinator,
    failed: Arc<AtomicBool>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    let cancel = coordinator.begun_token();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("process monitor shutting down");
                    return;
                }
                () = tokio::time::sleep(poll_interval) => {}
            }

            for handle in [&scheduler, &serving] {
                if let Some(status) = handle.poll_exit().await {
                    error!(
                        process = %handle.role(),
                        pid = handle.pid(),
                        status = %describe_exit(Some(status)),
                        "child process exited unexpectedly, terminating session"
                    );
                    failed.store(true, Ordering::Release);
                    coordinator.shutdown("child_exit").await;
                    return;
                }
            }
        }
    })
}
