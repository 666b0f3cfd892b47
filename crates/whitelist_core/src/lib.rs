//! # Whitelist Core - Connection Lifecycle Management
//!
//! Manages player whitelists on remote game servers through persistent,
//! authenticated administrative (RCON) sessions.
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * **Connection Registry** ([`ConnectionRegistry`]) - Owns one manager per server identifier
//! * **Managed Connection** ([`ManagedConnection`]) - Session lifecycle, reconnects and whitelist commands
//! * **Status Classifier** ([`StatusClassifier`]) - Online / unknown / unreachable indicator
//! * **Security Gate** ([`is_unsafe_target`]) - Refuses private and loopback targets
//! * **Transport** ([`AdminTransport`]) - Wire protocol seam, with an RCON implementation
//!
//! ### Control Flow
//!
//! 1. A caller looks up or creates a manager through the registry
//! 2. `create_connection` or `create_timed_connection` makes sure a session is live
//! 3. Whitelist operations send dialect commands and classify the replies
//! 4. Remote closes are picked up by a supervising task, which reconnects
//!    unless a keep-alive window is running
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use whitelist_core::{ConnectionRegistry, ConnectionSettings, RconTransport, ServerRecord};
//!
//! # async fn run() {
//! let registry = ConnectionRegistry::new(
//!     Arc::new(RconTransport::default()),
//!     ConnectionSettings::default(),
//! );
//! let record = ServerRecord::new("survival", "203.0.113.10", 25575, "secret");
//! let connection = registry.get_or_create(&record);
//!
//! if connection.ensure_session(Duration::from_secs(1)).await {
//!     connection.whitelist_player("Alice").await;
//! }
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Nothing here fails loudly. Transport and protocol errors ([`TransportError`],
//! [`ConnectionError`]) are written to the connection's bounded [`EventLog`] and
//! surface as `Failed` outcomes or empty results. Every log entry is also
//! emitted as a `tracing` event carrying the server identifier.
//!
//! ## Thread Safety
//!
//! * The registry is a `DashMap` behind a cloneable handle
//! * Each manager serializes session work through one async lock
//! * State changes are published on a `tokio::sync::watch` channel

pub mod connection;
pub mod dialect;
pub mod directory;
pub mod error;
pub mod log;
pub mod registry;
pub mod security;
pub mod settings;
pub mod status;
pub mod testing;
pub mod transport;

pub use connection::{ConnectionState, ManagedConnection};
pub use dialect::{AddOutcome, RemoveOutcome, WhitelistDialect};
pub use directory::{InMemoryServerDirectory, ServerDirectory, ServerRecord};
pub use error::{
    ConnectionError, ConnectionResult, DirectoryError, TransportError, TransportResult,
};
pub use log::{EventLog, LogEntry, LogLevel};
pub use registry::{is_probe_id, ConnectionRegistry, PROBE_PREFIX};
pub use security::is_unsafe_target;
pub use settings::{ConnectionSettings, RconSettings};
pub use status::{ServerStatus, StatusClassifier};
pub use transport::{
    AdminSession, AdminTransport, Credential, EstablishedSession, RconTransport, ServerAddress,
    SessionSignal,
};
