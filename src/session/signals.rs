//! OS signal bridge.
//!
//! Routes SIGINT and SIGTERM into the shutdown coordinator. The handler
//! itself does no termination work: it delegates to the already-idempotent
//! coordinator path, then force-exits the calling process; no further
//! application logic runs after a signal-triggered shutdown. A signal
//! arriving while another trigger's shutdown is in progress simply waits
//! for that sequence to complete before exiting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::session::shutdown::ShutdownCoordinator;

/// Install the signal handlers for the session's lifetime.
///
/// The returned task runs until a signal arrives (it then shuts the
/// session down and exits the process) or the session aborts it during
/// its own orderly teardown.
#[must_use]
pub fn spawn_signal_bridge(
    coordinator: ShutdownCoordinator,
    failed: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("termination signal received");
        coordinator.shutdown("signal").await;
        let code = i32::from(failed.load(Ordering::Acquire));
        info!(code, "signal-triggered shutdown complete, exiting");
        std::process::exit(code);
    })
}

pub(crate) async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}
