//! Request-serving child process.
//!
//! Entered when the session binary is re-executed with `--serving-child`.
//! The child receives the live configuration over stdin and the IPC
//! attachment as arguments, connects to the token channel, and runs the
//! queue proxy plus the internal dispatch loop until the channel closes
//! or a termination signal arrives.

pub mod dispatch;
pub mod proxy;

use tokio::io::AsyncReadExt;
use tracing::info;

use crate::config::GlobalConfig;
use crate::ipc::{IpcAttachment, TokenReceiver};
use crate::{Result, SessionError};

pub use dispatch::{Dispatcher, LogDispatcher};
pub use proxy::spawn_queue_proxy;

/// Run the serving child to completion.
///
/// # Errors
///
/// Returns `SessionError::Config` if no valid configuration arrives on
/// stdin, or `SessionError::Ipc` if the token channel cannot be reached.
pub async fn run_serving_child(attach: IpcAttachment) -> Result<()> {
    let config = read_config_from_stdin().await?;
    info!(
        model = %config.model_name,
        host = %config.server.host,
        port = config.server.port,
        endpoint = %attach.broadcast_endpoint.display(),
        "serving child starting"
    );

    let receiver = TokenReceiver::connect(&attach.token_socket).await?;
    let (dispatch_tx, mut dispatch_rx) =
        tokio::sync::mpsc::channel(config.token_channel_capacity);
    let proxy = spawn_queue_proxy(receiver, dispatch_tx);
    let dispatcher = LogDispatcher::new();

    let shutdown = crate::session::signals::wait_for_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("serving child received termination signal");
                break;
            }
            token = dispatch_rx.recv() => {
                match token {
                    Some(token) => dispatcher.dispatch(token).await,
                    None => {
                        info!("dispatch channel drained and closed");
                        break;
                    }
                }
            }
        }
    }

    proxy.abort();
    info!(delivered = dispatcher.delivered(), "serving child exiting");
    Ok(())
}

async fn read_config_from_stdin() -> Result<GlobalConfig> {
    let mut raw = String::new();
    tokio::io::stdin()
        .read_to_string(&mut raw)
        .await
        .map_err(|err| SessionError::Config(format!("cannot read config from stdin: {err}")))?;
    GlobalConfig::from_toml_str(&raw)
}
