//! Session: the top-level lifetime scope of one supervised run.
//!
//! A session owns the config snapshot, the IPC channel set, both child
//! process handles, and the background monitor and signal tasks. It is
//! created once at startup, destroyed exactly once through the shutdown
//! coordinator, and never partially recreated. The shared pieces are
//! passed by reference to the monitor, the signal bridge, and the
//! coordinator at construction time; there are no ambient globals.

pub mod handle;
pub mod launcher;
pub mod monitor;
pub mod shutdown;
pub mod signals;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::engine::{run_engine, Engine, EngineContext, EngineOutcome};
use crate::handoff::{self, ConfigHandle};
use crate::ipc::IpcChannelSet;
use crate::Result;

pub use handle::{describe_exit, ProcessHandle, ProcessRole};
pub use shutdown::{ShutdownCoordinator, ShutdownStage, ShutdownState};

/// One supervised run from bootstrap to final shutdown.
#[derive(Debug)]
pub struct Session {
    config: GlobalConfig,
    config_handle: ConfigHandle,
    ipc: IpcChannelSet,
    scheduler: Arc<ProcessHandle>,
    serving: Arc<ProcessHandle>,
    coordinator: ShutdownCoordinator,
    failed: Arc<AtomicBool>,
    monitor: tokio::task::JoinHandle<()>,
    signal_bridge: tokio::task::JoinHandle<()>,
}

impl Session {
    /// Bootstrap a session: snapshot the config, allocate the IPC channel
    /// set, launch both children, then start the monitor and the signal
    /// bridge. IPC allocation strictly precedes both launches; both
    /// launches strictly precede monitor startup; the engine is only
    /// invoked afterwards, via [`Session::run`].
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Persistence`, `SessionError::Resource`, or
    /// `SessionError::Launch`; these are fatal and occur before
    /// monitoring begins. If the serving launch fails after the scheduler
    /// started, the scheduler is reaped before this returns, so no orphan
    /// survives a failed bootstrap.
    pub async fn bootstrap(config: GlobalConfig) -> Result<Self> {
        config.validate()?;

        let config_handle = handoff::write(&config)?;
        let ipc = IpcChannelSet::allocate(config.token_channel_capacity)?;

        let scheduler = Arc::new(launcher::launch_scheduler(&config, &config_handle)?);
        let serving = match launcher::launch_serving(&config, &ipc).await {
            Ok(child) => Arc::new(child),
            Err(err) => {
                // Nothing is monitoring yet; reap the scheduler before failing.
                if let Err(kill_err) = scheduler.kill().await {
                    warn!(%kill_err, "failed to reap scheduler after launch failure");
                }
                return Err(err);
            }
        };

        let state = Arc::new(ShutdownState::new());
        let failed = Arc::new(AtomicBool::new(false));
        let coordinator = ShutdownCoordinator::new(
            Arc::clone(&scheduler),
            Arc::clone(&serving),
            state,
            config.shutdown_grace(),
        );

        let monitor = monitor::spawn_process_monitor(
            Arc::clone(&scheduler),
            Arc::clone(&serving),
            coordinator.clone(),
            Arc::clone(&failed),
            config.monitor_poll(),
        );
        let signal_bridge = signals::spawn_signal_bridge(coordinator.clone(), Arc::clone(&failed));

        Ok(Self {
            config,
            config_handle,
            ipc,
            scheduler,
            serving,
            coordinator,
            failed,
            monitor,
            signal_bridge,
        })
    }

    /// Effective configuration of this session.
    #[must_use]
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Snapshot handle passed to the scheduler.
    #[must_use]
    pub fn config_handle(&self) -> &ConfigHandle {
        &self.config_handle
    }

    /// The session's IPC channel set.
    #[must_use]
    pub fn ipc(&self) -> &IpcChannelSet {
        &self.ipc
    }

    /// Scheduler process handle, shared for observation beyond the
    /// session's own lifetime.
    #[must_use]
    pub fn scheduler(&self) -> Arc<ProcessHandle> {
        Arc::clone(&self.scheduler)
    }

    /// Serving process handle, shared for observation beyond the
    /// session's own lifetime.
    #[must_use]
    pub fn serving(&self) -> Arc<ProcessHandle> {
        Arc::clone(&self.serving)
    }

    /// The shutdown coordinator every termination trigger funnels through.
    #[must_use]
    pub fn coordinator(&self) -> &ShutdownCoordinator {
        &self.coordinator
    }

    /// Run the engine for the session's entire useful lifetime and return
    /// the final process exit code: 0 for a clean shutdown, 1 for any
    /// failure-driven one.
    pub async fn run<E: Engine>(self, engine: &mut E) -> i32 {
        let ctx = EngineContext {
            config: self.config.clone(),
            tokens: self.ipc.tokens.sender(),
            broadcast_endpoint: self.ipc.broadcast_endpoint.clone(),
            start: self.ipc.start.clone(),
            cache_ready: self.ipc.cache_ready.clone(),
            cancel: self.coordinator.begun_token(),
        };

        let outcome = run_engine(engine, ctx).await;
        let reason = match outcome {
            EngineOutcome::Completed => "engine_exit",
            EngineOutcome::Interrupted => "interrupt",
            EngineOutcome::Failed(_) => {
                self.failed.store(true, Ordering::Release);
                "engine_error"
            }
        };

        self.coordinator.shutdown(reason).await;
        self.monitor.abort();
        self.signal_bridge.abort();

        let code = i32::from(self.failed.load(Ordering::Acquire));
        info!(code, "session finished");
        code
    }
}
