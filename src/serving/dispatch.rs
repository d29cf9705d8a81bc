//! Internal dispatch seam of the serving process.
//!
//! The request-facing interface (HTTP routes, response streaming) lives
//! behind [`Dispatcher`]; this crate only defines the seam the queue
//! proxy feeds.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::ipc::TokenEvent;

/// Internal delivery path receiving each token the queue proxy dequeues.
pub trait Dispatcher: Send + Sync {
    /// Hand one token to the request-facing layer.
    fn dispatch(&self, token: TokenEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Default dispatcher: counts deliveries and records them at trace level.
#[derive(Debug, Default)]
pub struct LogDispatcher {
    delivered: AtomicU64,
}

impl LogDispatcher {
    /// A dispatcher with a zeroed delivery counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tokens dispatched so far.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl Dispatcher for LogDispatcher {
    fn dispatch(&self, token: TokenEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let delivered = self.delivered.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(
                stream = token.stream_id,
                last = token.last,
                delivered,
                "token dispatched"
            );
        })
    }
}
