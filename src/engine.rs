//! Execution engine seam.
//!
//! The engine runs in the calling process for the session's entire
//! useful lifetime. Its internals (model execution, batching, sampling)
//! live behind the [`Engine`] trait; this crate only defines the narrow
//! entry point and the classification of its three exit paths.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::GlobalConfig;
use crate::ipc::{OneShotEvent, TokenEvent, TokenSender};
use crate::{Result, SessionError};

/// Everything the engine receives from the session at startup.
#[derive(Debug, Clone)]
pub struct EngineContext {
    /// Effective runtime configuration.
    pub config: GlobalConfig,
    /// Producer half of the token channel.
    pub tokens: TokenSender,
    /// Rendezvous address for communication with the scheduler; the
    /// protocol spoken over it is the engine's business.
    pub broadcast_endpoint: PathBuf,
    /// Fired by the engine when the serving process may accept traffic.
    pub start: OneShotEvent,
    /// Fired by the engine once its state/cache is initialized.
    pub cache_ready: OneShotEvent,
    /// Cancelled when session shutdown begins. Engines treat this as the
    /// interruption request and return `Ok` after standing down.
    pub cancel: CancellationToken,
}

/// Core execution engine invoked in the calling process.
pub trait Engine: Send {
    /// Run until completion or interruption, consuming and producing
    /// through the supplied channels. Blocks the session for its entire
    /// useful lifetime.
    ///
    /// # Errors
    ///
    /// An engine failure is fatal: the session shuts down and exits with
    /// status 1.
    fn run(&mut self, ctx: EngineContext)
        -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// How an engine run ended.
#[derive(Debug)]
pub enum EngineOutcome {
    /// Ran to normal completion.
    Completed,
    /// Returned after observing the interruption request; graceful.
    Interrupted,
    /// Failed; fatal to the session.
    Failed(SessionError),
}

/// Run the engine and classify its exit path.
pub async fn run_engine<E: Engine>(engine: &mut E, ctx: EngineContext) -> EngineOutcome {
    info!("engine starting");
    let interrupted = ctx.cancel.clone();
    match engine.run(ctx).await {
        Ok(()) if interrupted.is_cancelled() => {
            info!("engine interrupted, returning gracefully");
            EngineOutcome::Interrupted
        }
        Ok(()) => {
            info!("engine completed");
            EngineOutcome::Completed
        }
        Err(err) => {
            error!(%err, "engine error");
            EngineOutcome::Failed(err)
        }
    }
}

/// Stand-in engine for smoke runs and end-to-end tests.
///
/// Signals both readiness events, emits a short warmup token stream, then
/// parks until the session is shut down. Real deployments embed this
/// crate as a library and supply their own [`Engine`].
#[derive(Debug)]
pub struct MockEngine {
    warmup: Vec<String>,
}

impl MockEngine {
    /// A mock engine with a single warmup token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            warmup: vec!["<warmup>".to_owned()],
        }
    }

    /// A mock engine that emits the given warmup tokens in order.
    #[must_use]
    pub fn with_warmup(warmup: Vec<String>) -> Self {
        Self { warmup }
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MockEngine {
    fn run(
        &mut self,
        ctx: EngineContext,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            ctx.cache_ready.signal()?;
            info!("mock engine cache initialized");
            ctx.start.signal()?;

            let total = self.warmup.len();
            for (index, text) in self.warmup.iter().enumerate() {
                let token = TokenEvent {
                    stream_id: 0,
                    text: text.clone(),
                    last: index + 1 == total,
                };
                tokio::select! {
                    () = ctx.cancel.cancelled() => return Ok(()),
                    result = ctx.tokens.send(token) => {
                        if let Err(err) = result {
                            warn!(%err, "warmup token not delivered");
                            break;
                        }
                    }
                }
            }

            ctx.cancel.cancelled().await;
            Ok(())
        })
    }
}
