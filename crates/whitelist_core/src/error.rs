//! Error types for the connection lifecycle.
//!
//! None of these errors are fatal to a caller. The connection manager records
//! them in its per-connection log and reports a `Failed` outcome or an empty
//! result instead of propagating them.

use std::io::Error as IoError;
use std::time::Duration;
use thiserror::Error;

/// Failures raised by an administrative transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Authentication rejected by remote server")]
    AuthenticationRejected,

    #[error("Session closed by remote server")]
    Closed,

    #[error("No authenticated session")]
    NotConnected,

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Command of {len} bytes exceeds the {max} byte limit")]
    CommandTooLong { len: usize, max: usize },
}

/// Failures observed by a managed connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Refusing to connect to private, loopback or invalid address {host}")]
    SecurityRejected { host: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Unrecognized reply: {reply}")]
    ProtocolAnomaly { reply: String },

    #[error("Invalid player name: {0:?}")]
    InvalidPlayerName(String),
}

/// Failures raised when editing the server directory.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Server id {0:?} is reserved for verification probes")]
    ReservedId(String),
}

pub type TransportResult<T> = Result<T, TransportError>;
pub type ConnectionResult<T> = Result<T, ConnectionError>;
