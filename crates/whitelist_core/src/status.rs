//! Server health classification.
//!
//! [`StatusClassifier::classify`] derives a tri-state indicator from a
//! connection's history:
//!
//! | condition                                              | status        |
//! |--------------------------------------------------------|---------------|
//! | authenticated within the online threshold              | `Online`      |
//! | otherwise, newest log entry is an error                | `Unreachable` |
//! | otherwise (including no manager yet)                   | `Unknown`     |
//!
//! Unless side effects are suppressed, classifying also nudges the server
//! towards a known state: `Unknown` servers get a background connection
//! attempt, and `Unreachable` ones are retried once their last error is
//! older than the retry backoff. Side effects are spawned on the current
//! Tokio runtime.

use crate::connection::ManagedConnection;
use crate::directory::{ServerDirectory, ServerRecord};
use crate::log::{LogEntry, LogLevel};
use crate::registry::ConnectionRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Online,
    Unknown,
    Unreachable,
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerStatus::Online => "online",
            ServerStatus::Unknown => "unknown",
            ServerStatus::Unreachable => "unreachable",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct StatusClassifier {
    registry: ConnectionRegistry,
    directory: Arc<dyn ServerDirectory>,
}

impl StatusClassifier {
    pub fn new(registry: ConnectionRegistry, directory: Arc<dyn ServerDirectory>) -> Self {
        Self {
            registry,
            directory,
        }
    }

    /// Classifies the server `id`.
    ///
    /// # Arguments
    ///
    /// * `id` - Directory identifier of the server
    /// * `suppress_side_effects` - When `true`, never starts a connection
    ///
    /// # Panics
    ///
    /// Panics outside a Tokio runtime when a side effect has to be spawned.
    pub fn classify(&self, id: &str, suppress_side_effects: bool) -> ServerStatus {
        let Some(connection) = self.registry.get(id) else {
            if !suppress_side_effects {
                if let Some(record) = self.directory.get(id) {
                    debug!("Creating connection manager for {} on first status check", id);
                    spawn_connect(self.registry.get_or_create(&record));
                }
            }
            return ServerStatus::Unknown;
        };

        let settings = self.registry.settings();
        let now = Instant::now();

        let online = connection
            .last_successful_connection()
            .is_some_and(|at| now.saturating_duration_since(at) < settings.online_threshold());
        let most_recent_is_error = connection
            .log()
            .last()
            .as_ref()
            .is_some_and(LogEntry::is_error);

        let status = if online {
            ServerStatus::Online
        } else if most_recent_is_error {
            ServerStatus::Unreachable
        } else {
            ServerStatus::Unknown
        };

        if !suppress_side_effects {
            match status {
                ServerStatus::Online => {}
                ServerStatus::Unknown => spawn_connect(connection),
                ServerStatus::Unreachable => {
                    let retry_due = connection.log().last_of(LogLevel::Error).is_some_and(|entry| {
                        now.saturating_duration_since(entry.recorded_at) > settings.retry_backoff()
                    });
                    if retry_due {
                        debug!("Retrying unreachable server {}", id);
                        spawn_connect(connection);
                    }
                }
            }
        }

        status
    }

    /// Classifies every server in the directory, in identifier order.
    pub fn classify_all(&self, suppress_side_effects: bool) -> Vec<(ServerRecord, ServerStatus)> {
        self.directory
            .records()
            .into_iter()
            .map(|record| {
                let status = self.classify(&record.id, suppress_side_effects);
                (record, status)
            })
            .collect()
    }
}

fn spawn_connect(connection: Arc<ManagedConnection>) {
    tokio::spawn(async move {
        connection.create_connection().await;
    });
}
