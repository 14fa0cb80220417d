//! TCP networking substrate: listening, connecting, receiving and sending
//!
//! Every asynchronous outcome is delivered as a [`NetworkEvent`] on a single
//! unbounded channel owned by the caller. Operations return immediately and
//! never report through the channel before they have returned, so the owner of
//! the receiving end is the only place that reacts to the network.
//!
//! Each [`Connection`] owns:
//! - the read half of the socket, used by at most one armed receive at a time
//! - a byte accumulator that receives append to and `take_lines` drains
//! - a writer task fed through a bounded channel, which keeps sends FIFO per
//!   connection; a peer that lets the queue fill up is dropped as too slow
//! - a closed flag that also interrupts an in-flight receive

use crate::error::NetworkError;
use futures::FutureExt;
use log::{debug, warn};
use parking_lot::Mutex;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::time::timeout;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const READ_CHUNK_SIZE: usize = 4096;
/// Messages a connection may have waiting for its writer. At the default tick
/// rate this is a few seconds of frames.
pub const SEND_QUEUE_CAPACITY: usize = 256;

pub type ConnectionId = u64;
pub type EventSender = mpsc::UnboundedSender<NetworkEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<NetworkEvent>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(0);

/// Outcome of a networking operation.
#[derive(Debug)]
pub enum NetworkEvent {
    /// A listener accepted a new peer.
    Accepted(Connection),
    /// An outgoing `connect` succeeded.
    Connected(Connection),
    /// An armed receive appended bytes to the connection's accumulator.
    Received(Connection),
    /// Something went wrong. `connection` is `None` for listener and connect
    /// failures, where no connection exists.
    Failed {
        connection: Option<ConnectionId>,
        error: NetworkError,
    },
}

/// Work items for a connection's writer task
#[derive(Debug)]
enum Outgoing {
    Text(String),
    TextThenClose(String),
    Close,
}

struct Inner {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    reader: tokio::sync::Mutex<OwnedReadHalf>,
    buffer: Mutex<Vec<u8>>,
    outgoing: mpsc::Sender<Outgoing>,
    closed: Arc<watch::Sender<bool>>,
    /// Tells the writer to discard whatever is queued and stop.
    abort: Arc<Notify>,
}

/// Handle to one TCP peer. Clones share the same socket and accumulator.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("peer_addr", &self.inner.peer_addr)
            .field("closed", &*self.inner.closed.borrow())
            .finish()
    }
}

impl Connection {
    /// Wraps an established stream and starts its writer task.
    ///
    /// Must be called from within a tokio runtime.
    fn from_stream(stream: TcpStream, events: &EventSender) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let peer_addr = stream.peer_addr().ok();
        let (reader, writer) = stream.into_split();
        let (outgoing_tx, outgoing_rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let (closed, _) = watch::channel(false);
        let closed = Arc::new(closed);
        let abort = Arc::new(Notify::new());

        tokio::spawn(write_loop(
            id,
            writer,
            outgoing_rx,
            Arc::clone(&closed),
            Arc::clone(&abort),
            events.clone(),
        ));

        Self {
            inner: Arc::new(Inner {
                id,
                peer_addr,
                reader: tokio::sync::Mutex::new(reader),
                buffer: Mutex::new(Vec::new()),
                outgoing: outgoing_tx,
                closed,
                abort,
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.peer_addr
    }

    /// Removes and returns every complete line received so far.
    pub fn take_lines(&self) -> Vec<String> {
        shared::drain_lines(&mut self.inner.buffer.lock())
    }

    /// Bytes received but not yet consumed as lines
    pub fn pending_bytes(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    /// Liveness check used before receiving or sending.
    ///
    /// A connection is dead once it has been closed locally, its writer has
    /// stopped, or a non-blocking peek reports end of stream. The peek is
    /// skipped while a receive holds the read half.
    pub fn is_alive(&self) -> bool {
        if *self.inner.closed.borrow() || self.inner.outgoing.is_closed() {
            return false;
        }

        let Ok(mut reader) = self.inner.reader.try_lock() else {
            return true;
        };
        let mut probe = [0u8; 1];
        !matches!(
            reader.peek(&mut probe).now_or_never(),
            Some(Ok(0)) | Some(Err(_))
        )
    }

    /// Closes the connection. Queued writes are flushed first unless the
    /// queue is full, in which case they are discarded. An in-flight receive
    /// completes with `ReceiveFailed`.
    pub fn close(&self) {
        self.mark_closed();
        if let Err(TrySendError::Full(_)) = self.inner.outgoing.try_send(Outgoing::Close) {
            self.abort();
        }
    }

    fn mark_closed(&self) {
        self.inner.closed.send_replace(true);
    }

    /// Closes without flushing. Used for peers that stopped reading.
    fn abort(&self) {
        self.mark_closed();
        self.inner.abort.notify_one();
    }

    /// Queues a message for the writer. A full queue means the peer is not
    /// keeping up, so the connection is aborted instead of buffering more.
    fn enqueue(&self, message: Outgoing) -> bool {
        match self.inner.outgoing.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Send queue for connection {} is full, dropping slow peer",
                    self.inner.id
                );
                self.abort();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Reads one chunk into the accumulator.
    async fn read_once(&self) -> Result<usize, NetworkError> {
        let mut closed = self.inner.closed.subscribe();
        let mut reader = self.inner.reader.lock().await;
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        tokio::select! {
            result = reader.read(&mut chunk) => match result {
                Ok(0) => Err(NetworkError::ReceiveFailed("connection closed by peer".into())),
                Ok(n) => {
                    self.inner.buffer.lock().extend_from_slice(&chunk[..n]);
                    Ok(n)
                }
                Err(e) => Err(NetworkError::ReceiveFailed(e.to_string())),
            },
            _ = closed.wait_for(|closed| *closed) => {
                Err(NetworkError::ReceiveFailed("connection closed locally".into()))
            }
        }
    }
}

/// Drains the outgoing queue onto the socket until the connection closes or
/// is aborted. Dropping the write half on exit shuts the socket down.
async fn write_loop(
    id: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut outgoing: mpsc::Receiver<Outgoing>,
    closed: Arc<watch::Sender<bool>>,
    abort: Arc<Notify>,
    events: EventSender,
) {
    loop {
        let message = tokio::select! {
            message = outgoing.recv() => message,
            _ = abort.notified() => None,
        };
        let Some(message) = message else {
            return;
        };

        let (text, close_after) = match message {
            Outgoing::Text(text) => (Some(text), false),
            Outgoing::TextThenClose(text) => (Some(text), true),
            Outgoing::Close => (None, true),
        };

        if let Some(text) = text {
            let written = tokio::select! {
                result = writer.write_all(text.as_bytes()) => result,
                _ = abort.notified() => {
                    debug!("Connection {} aborted with writes pending", id);
                    return;
                }
            };
            if let Err(e) = written {
                debug!("Write to connection {} failed: {}", id, e);
                closed.send_replace(true);
                let _ = events.send(NetworkEvent::Failed {
                    connection: Some(id),
                    error: NetworkError::SendFailed(e.to_string()),
                });
                return;
            }
        }

        if close_after {
            closed.send_replace(true);
            let _ = writer.shutdown().await;
            return;
        }
    }
}

/// A running accept loop. Dropping it stops accepting.
#[derive(Debug)]
pub struct Listener {
    local_addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
}

impl Listener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting. The accept loop reports `ListenerFailed` once it exits.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Binds `addr` and starts accepting. Each new peer arrives as
/// `NetworkEvent::Accepted`; the loop keeps accepting until stopped or until
/// accepting fails.
pub fn listen(addr: SocketAddr, events: &EventSender) -> Result<Listener, NetworkError> {
    let bind_error = |e: std::io::Error| NetworkError::ListenerFailed(format!("{addr}: {e}"));

    let std_listener = std::net::TcpListener::bind(addr).map_err(bind_error)?;
    std_listener.set_nonblocking(true).map_err(bind_error)?;
    let listener = TcpListener::from_std(std_listener).map_err(bind_error)?;
    let local_addr = listener.local_addr().map_err(bind_error)?;

    let (stop_tx, mut stop_rx) = oneshot::channel();
    let events = events.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    let _ = events.send(NetworkEvent::Failed {
                        connection: None,
                        error: NetworkError::ListenerFailed("listener stopped".into()),
                    });
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Accepted connection from {}", peer);
                        let _ = stream.set_nodelay(true);
                        let connection = Connection::from_stream(stream, &events);
                        if events.send(NetworkEvent::Accepted(connection)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = events.send(NetworkEvent::Failed {
                            connection: None,
                            error: NetworkError::ListenerFailed(e.to_string()),
                        });
                        break;
                    }
                }
            }
        }
    });

    Ok(Listener {
        local_addr,
        stop: Some(stop_tx),
    })
}

/// Connects to `host:port` in the background and reports `Connected` or
/// `Failed` on `events`.
pub fn connect(host: &str, port: u16, events: &EventSender) {
    let host = host.to_string();
    let events = events.clone();

    tokio::spawn(async move {
        let event = match establish(&host, port, &events).await {
            Ok(connection) => NetworkEvent::Connected(connection),
            Err(error) => NetworkEvent::Failed {
                connection: None,
                error,
            },
        };
        let _ = events.send(event);
    });
}

async fn establish(
    host: &str,
    port: u16,
    events: &EventSender,
) -> Result<Connection, NetworkError> {
    let addr = resolve(host, port).await?;

    let stream = match timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
        Err(_) => return Err(NetworkError::ConnectTimeout(addr)),
        Ok(Err(e)) => {
            return Err(NetworkError::ConnectFailed {
                addr,
                reason: e.to_string(),
            })
        }
        Ok(Ok(stream)) => stream,
    };
    let _ = stream.set_nodelay(true);

    Ok(Connection::from_stream(stream, events))
}

/// Name lookup preferring IPv4, falling back to parsing `host` as an address literal.
async fn resolve(host: &str, port: u16) -> Result<SocketAddr, NetworkError> {
    let reason = match lookup_host((host, port)).await {
        Ok(addrs) => {
            let addrs: Vec<SocketAddr> = addrs.collect();
            if let Some(addr) = addrs.iter().find(|a| a.is_ipv4()).or(addrs.first()) {
                return Ok(*addr);
            }
            "no addresses found".to_string()
        }
        Err(e) => e.to_string(),
    };

    host.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, port))
        .map_err(|_| NetworkError::Resolution {
            host: host.to_string(),
            reason,
        })
}

/// Arms exactly one read on `connection`. New bytes are appended to its
/// accumulator and reported as `Received`; end of stream, read errors and a
/// local close are reported as `Failed { ReceiveFailed }`.
pub fn receive(connection: &Connection, events: &EventSender) {
    if !connection.is_alive() {
        let _ = events.send(NetworkEvent::Failed {
            connection: Some(connection.id()),
            error: NetworkError::ReceiveFailed("connection is not alive".into()),
        });
        return;
    }

    let connection = connection.clone();
    let events = events.clone();
    tokio::spawn(async move {
        let event = match connection.read_once().await {
            Ok(_) => NetworkEvent::Received(connection),
            Err(error) => {
                connection.mark_closed();
                NetworkEvent::Failed {
                    connection: Some(connection.id()),
                    error,
                }
            }
        };
        let _ = events.send(event);
    });
}

/// Queues `data` for writing. Returns false, and closes the connection, if it
/// is no longer alive or its send queue is full.
pub fn send(connection: &Connection, data: impl Into<String>) -> bool {
    if !connection.is_alive() {
        connection.close();
        return false;
    }
    connection.enqueue(Outgoing::Text(data.into()))
}

/// Queues `data` and closes the connection once it has been written.
pub fn send_and_close(connection: &Connection, data: impl Into<String>) -> bool {
    if !connection.is_alive() {
        connection.close();
        return false;
    }
    connection.enqueue(Outgoing::TextThenClose(data.into()))
}

/// Builds a connection over a loopback socket pair. Returns the wrapped
/// server side and the raw client stream.
#[cfg(test)]
pub(crate) async fn loopback_pair(events: &EventSender) -> (Connection, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).await.unwrap();
    let (server, _) = listener.accept().await.unwrap();
    (Connection::from_stream(server, events), client)
}
