//! Queue proxy: bridges the cross-process token channel into the serving
//! process's internal delivery path.
//!
//! The proxy decouples the bounded channel's producer cadence from
//! request handling: the engine's sends are acknowledged as soon as the
//! proxy dequeues, while dispatch happens at the serving side's own
//! pace. The proxy has no independent shutdown signal; it runs for the
//! lifetime of its host process and exits its loop only when the token
//! channel or the internal channel closes.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::ipc::{TokenEvent, TokenReceiver};
use crate::SessionError;

/// Spawn the proxy on its own task.
#[must_use]
pub fn spawn_queue_proxy(
    receiver: TokenReceiver,
    dispatch_tx: mpsc::Sender<TokenEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(token) => {
                    if dispatch_tx.send(token).await.is_err() {
                        debug!("internal dispatch channel closed, queue proxy exiting");
                        return;
                    }
                }
                Err(SessionError::ChannelClosed) => {
                    debug!("token channel closed, queue proxy exiting");
                    return;
                }
                Err(err) => {
                    warn!(%err, "queue proxy receive error");
                    return;
                }
            }
        }
    })
}
