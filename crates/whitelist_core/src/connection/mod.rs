//! Connection lifecycle management.
//!
//! A [`ManagedConnection`] owns at most one authenticated administrative
//! session to a single remote server. It reconnects automatically when the
//! remote side drops the session, unless a keep-alive window opened by
//! [`ManagedConnection::create_timed_connection`] is still running, and it
//! refuses to connect to private or loopback targets.
//!
//! Managers are created and owned by the
//! [`ConnectionRegistry`](crate::registry::ConnectionRegistry).

pub mod managed;
pub mod state;

pub use managed::ManagedConnection;
pub use state::ConnectionState;
