//! Administrative transport abstraction.
//!
//! The connection manager only sequences transport calls and interprets their
//! results; the wire protocol lives behind [`AdminTransport`]. A successful
//! [`AdminTransport::connect`] yields an authenticated [`AdminSession`] and a
//! one-shot signal that fires if the remote side closes the session or the
//! session fails on its own.

pub mod rcon;

pub use rcon::RconTransport;

use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;

/// Host and administrative port of a remote server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Shared secret used to authenticate a session. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Raw secret, for transports only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl From<&str> for Credential {
    fn from(secret: &str) -> Self {
        Self::new(secret)
    }
}

impl From<String> for Credential {
    fn from(secret: String) -> Self {
        Self(secret)
    }
}

/// Raised once per session when it ends without a local `close()`.
#[derive(Debug)]
pub enum SessionSignal {
    Closed,
    Error(TransportError),
}

/// An authenticated session plus its end-of-life signal.
pub struct EstablishedSession {
    pub session: Box<dyn AdminSession>,
    pub signals: oneshot::Receiver<SessionSignal>,
}

/// Opens authenticated administrative sessions.
#[async_trait]
pub trait AdminTransport: Send + Sync + 'static {
    async fn connect(
        &self,
        address: &ServerAddress,
        credential: &Credential,
    ) -> TransportResult<EstablishedSession>;
}

/// One authenticated administrative session.
#[async_trait]
pub trait AdminSession: Send + 'static {
    /// Sends a command and returns the server's textual reply.
    async fn send_command(&mut self, command: &str) -> TransportResult<String>;

    /// Closes the session. Does not raise a [`SessionSignal`].
    async fn close(&mut self) -> TransportResult<()>;
}
