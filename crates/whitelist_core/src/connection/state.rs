use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No session has been attempted since construction or the last rebuild.
    Idle,
    /// A connect and authenticate round-trip is in flight.
    Connecting,
    /// A live, authenticated session is held.
    Authenticated,
    /// The last session ended, failed to open, or was stopped.
    Closed,
}

impl ConnectionState {
    pub fn is_authenticated(self) -> bool {
        self == ConnectionState::Authenticated
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticated => "authenticated",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
