use std::net::SocketAddr;
use thiserror::Error;

/// Failures reported by the networking layer.
///
/// These travel inside `NetworkEvent::Failed`, so they are cheap to clone and
/// carry error text instead of the underlying `io::Error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("could not resolve {host}: {reason}")]
    Resolution { host: String, reason: String },
    #[error("connection to {0} timed out")]
    ConnectTimeout(SocketAddr),
    #[error("could not connect to {addr}: {reason}")]
    ConnectFailed { addr: SocketAddr, reason: String },
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("listener failed: {0}")]
    ListenerFailed(String),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;
