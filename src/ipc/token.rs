//! Bounded cross-process token channel.
//!
//! Generated-output units flow from the engine (session host) to the
//! serving process over a local socket. Frames are line-delimited JSON.
//! Capacity is enforced with credit-based flow control: the sending side
//! holds a semaphore with one permit per slot, and the receiving side
//! returns a credit (an `ack` frame) each time an item is dequeued. A
//! slot is therefore occupied from `send` until the consumer actually
//! takes the item, which gives the same back-pressure behavior as an
//! in-process bounded queue.
//!
//! The socket name is reserved at allocation time, before either child
//! process is launched; the serving child connects by name, and the
//! sending side accepts that one connection lazily on first use.
//!
//! Ordering: sends from one producer are delivered in order. Sends from
//! different producers interleave without a global order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use interprocess::local_socket::tokio::{prelude::*, Listener, RecvHalf, SendHalf, Stream};
use interprocess::local_socket::{GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{OnceCell, Semaphore, TryAcquireError};
use tracing::warn;

use crate::{Result, SessionError};

/// One generated-output unit delivered from the engine to the serving
/// process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenEvent {
    /// Request stream this token belongs to.
    pub stream_id: u64,
    /// Decoded token text.
    pub text: String,
    /// Whether this is the final token of the stream.
    pub last: bool,
}

/// Wire frames exchanged over the token socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Frame {
    /// A token, host to serving.
    Token {
        /// The delivered unit.
        token: TokenEvent,
    },
    /// Producer-side close, host to serving.
    Close,
    /// Consumption credit, serving to host.
    Ack,
}

/// Host-side root of the token channel.
///
/// Created by [`crate::ipc::IpcChannelSet::allocate`]; hands out cloneable
/// [`TokenSender`] halves. The serving process attaches with
/// [`TokenReceiver::connect`] using [`TokenChannel::name`].
#[derive(Debug, Clone)]
pub struct TokenChannel {
    shared: Arc<SenderShared>,
}

struct SenderShared {
    name: String,
    capacity: usize,
    permits: Arc<Semaphore>,
    closed: Arc<AtomicBool>,
    listener: Mutex<Option<Listener>>,
    conn: OnceCell<Connection>,
}

impl std::fmt::Debug for SenderShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderShared")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

struct Connection {
    writer: tokio::sync::Mutex<SendHalf>,
}

impl TokenChannel {
    /// Reserve the socket name and create the listener.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Resource` if the host cannot provide a local
    /// socket in the requested namespace.
    pub fn allocate(capacity: usize) -> Result<Self> {
        let name = format!("inferd-tokens-{}", uuid::Uuid::new_v4());

        let listener_name = name
            .clone()
            .to_ns_name::<GenericNamespaced>()
            .map_err(|err| {
                SessionError::Resource(format!("invalid token socket name '{name}': {err}"))
            })?;
        let listener = ListenerOptions::new()
            .name(listener_name)
            .create_tokio()
            .map_err(|err| {
                SessionError::Resource(format!("cannot create token socket listener: {err}"))
            })?;

        Ok(Self {
            shared: Arc::new(SenderShared {
                name,
                capacity,
                permits: Arc::new(Semaphore::new(capacity)),
                closed: Arc::new(AtomicBool::new(false)),
                listener: Mutex::new(Some(listener)),
                conn: OnceCell::new(),
            }),
        })
    }

    /// Socket name the serving process connects to.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Fixed channel capacity chosen at allocation.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// A producer half of the channel. Senders are cheap clones sharing
    /// the one connection and capacity budget.
    #[must_use]
    pub fn sender(&self) -> TokenSender {
        TokenSender {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Producer half of the token channel.
#[derive(Debug, Clone)]
pub struct TokenSender {
    shared: Arc<SenderShared>,
}

impl TokenSender {
    /// Deliver a token, waiting for a free slot when the channel is at
    /// capacity.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ChannelClosed` if the channel was closed or
    /// the consumer went away, `SessionError::Ipc` on transport failure.
    pub async fn send(&self, token: TokenEvent) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(SessionError::ChannelClosed);
        }
        let conn = self.ensure_connected().await?;
        let permit = self
            .shared
            .permits
            .acquire()
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        // The credit comes back through the ack pump, not this guard.
        permit.forget();
        write_frame(conn, &Frame::Token { token }).await
    }

    /// Deliver a token without waiting; fail instead when at capacity.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ChannelFull` when no slot is free,
    /// `SessionError::ChannelClosed` if the channel is closed, or
    /// `SessionError::Ipc` on transport failure.
    pub async fn try_send(&self, token: TokenEvent) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(SessionError::ChannelClosed);
        }
        let conn = self.ensure_connected().await?;
        match self.shared.permits.try_acquire() {
            Ok(permit) => permit.forget(),
            Err(TryAcquireError::NoPermits) => return Err(SessionError::ChannelFull),
            Err(TryAcquireError::Closed) => return Err(SessionError::ChannelClosed),
        }
        write_frame(conn, &Frame::Token { token }).await
    }

    /// Close the channel. Pending and future `recv` calls on the consumer
    /// side fail with a closed-channel error once the in-flight items are
    /// drained, and senders blocked on capacity are released with the
    /// same error. Closing twice is a no-op.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.permits.close();

        // Deliver the close frame to a consumer that is already attached
        // or still in the connection backlog. If nobody ever connected
        // there is no consumer to notify.
        let conn = match self.shared.conn.get() {
            Some(conn) => Some(conn),
            None => tokio::time::timeout(
                std::time::Duration::from_millis(500),
                self.ensure_connected(),
            )
            .await
            .ok()
            .and_then(std::result::Result::ok),
        };
        if let Some(conn) = conn {
            if let Err(err) = write_frame(conn, &Frame::Close).await {
                warn!(%err, "token channel close frame not delivered");
            }
            let mut writer = conn.writer.lock().await;
            if let Err(err) = writer.flush().await {
                warn!(%err, "token channel flush on close failed");
            }
        }
    }

    async fn ensure_connected(&self) -> Result<&Connection> {
        self.shared
            .conn
            .get_or_try_init(|| async {
                let listener = self
                    .shared
                    .listener
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take()
                    .ok_or_else(|| {
                        SessionError::Ipc("token socket listener already consumed".into())
                    })?;
                let stream = listener.accept().await.map_err(|err| {
                    SessionError::Ipc(format!("token socket accept failed: {err}"))
                })?;
                let (reader, writer) = stream.split();
                tokio::spawn(ack_pump(
                    reader,
                    Arc::clone(&self.shared.permits),
                    Arc::clone(&self.shared.closed),
                ));
                Ok(Connection {
                    writer: tokio::sync::Mutex::new(writer),
                })
            })
            .await
    }
}

/// Returns consumption credits to the sender's capacity budget. Ends when
/// the consumer disconnects, which also releases blocked senders with a
/// closed-channel error.
async fn ack_pump(reader: RecvHalf, permits: Arc<Semaphore>, closed: Arc<AtomicBool>) {
    let mut lines = BufReader::new(reader);
    let mut line = String::new();
    loop {
        line.clear();
        match lines.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Frame>(trimmed) {
                    Ok(Frame::Ack) => permits.add_permits(1),
                    Ok(_) => warn!("unexpected frame on token ack stream"),
                    Err(err) => warn!(%err, "malformed token ack frame"),
                }
            }
            Err(err) => {
                warn!(%err, "token ack stream read error");
                break;
            }
        }
    }
    closed.store(true, Ordering::Release);
    permits.close();
}

async fn write_frame(conn: &Connection, frame: &Frame) -> Result<()> {
    let mut line = serde_json::to_string(frame)
        .map_err(|err| SessionError::Ipc(format!("cannot encode token frame: {err}")))?;
    line.push('\n');
    let mut writer = conn.writer.lock().await;
    writer.write_all(line.as_bytes()).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::BrokenPipe {
            SessionError::ChannelClosed
        } else {
            SessionError::Ipc(format!("token frame write failed: {err}"))
        }
    })
}

/// Consumer half of the token channel, used inside the serving process.
#[derive(Debug, Clone)]
pub struct TokenReceiver {
    shared: Arc<ReceiverShared>,
}

struct ReceiverShared {
    reader: tokio::sync::Mutex<BufReader<RecvHalf>>,
    writer: tokio::sync::Mutex<SendHalf>,
    closed: AtomicBool,
}

impl std::fmt::Debug for ReceiverShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverShared")
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl TokenReceiver {
    /// Attach to the channel by socket name.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Ipc` if the socket cannot be reached.
    pub async fn connect(name: &str) -> Result<Self> {
        let socket_name = name
            .to_owned()
            .to_ns_name::<GenericNamespaced>()
            .map_err(|err| {
                SessionError::Ipc(format!("invalid token socket name '{name}': {err}"))
            })?;
        let stream = Stream::connect(socket_name)
            .await
            .map_err(|err| SessionError::Ipc(format!("token socket connect failed: {err}")))?;
        let (reader, writer) = stream.split();
        Ok(Self {
            shared: Arc::new(ReceiverShared {
                reader: tokio::sync::Mutex::new(BufReader::new(reader)),
                writer: tokio::sync::Mutex::new(writer),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Dequeue the next token, waiting until one is available.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ChannelClosed` once the producer has closed
    /// the channel (or disconnected) and all delivered items were taken.
    pub async fn recv(&self) -> Result<TokenEvent> {
        let mut line = String::new();
        loop {
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(SessionError::ChannelClosed);
            }
            let mut reader = self.shared.reader.lock().await;
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(SessionError::ChannelClosed);
            }
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    self.shared.closed.store(true, Ordering::Release);
                    return Err(SessionError::ChannelClosed);
                }
                Ok(_) => {
                    drop(reader);
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Frame>(trimmed) {
                        Ok(Frame::Token { token }) => {
                            self.ack().await;
                            return Ok(token);
                        }
                        Ok(Frame::Close) => {
                            self.shared.closed.store(true, Ordering::Release);
                            return Err(SessionError::ChannelClosed);
                        }
                        Ok(Frame::Ack) => {
                            warn!("unexpected ack frame on token delivery stream");
                        }
                        Err(err) => {
                            warn!(%err, "malformed token frame dropped");
                        }
                    }
                }
                Err(err) => {
                    self.shared.closed.store(true, Ordering::Release);
                    return Err(SessionError::Ipc(format!("token frame read failed: {err}")));
                }
            }
        }
    }

    /// Return one consumption credit to the producer. Best effort: a
    /// failed ack only degrades throughput, never correctness of the
    /// items already delivered.
    async fn ack(&self) {
        let frame = match serde_json::to_string(&Frame::Ack) {
            Ok(mut s) => {
                s.push('\n');
                s
            }
            Err(err) => {
                warn!(%err, "cannot encode ack frame");
                return;
            }
        };
        let mut writer = self.shared.writer.lock().await;
        if let Err(err) = writer.write_all(frame.as_bytes()).await {
            warn!(%err, "token ack write failed");
        }
    }
}
