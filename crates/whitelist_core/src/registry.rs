//! Registry of managed connections, keyed by server identifier.
//!
//! The registry is an explicit object rather than process-wide state: create
//! one per application and hand out clones of the handle. It owns the
//! transport and settings every manager is built with.

use crate::connection::ManagedConnection;
use crate::directory::ServerRecord;
use crate::settings::ConnectionSettings;
use crate::transport::{AdminTransport, Credential, ServerAddress};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Identifier prefix reserved for disposable verification probes.
pub const PROBE_PREFIX: &str = "probe:";

/// Whether `id` lies in the probe namespace, which persisted servers may not
/// use.
pub fn is_probe_id(id: &str) -> bool {
    id.starts_with(PROBE_PREFIX)
}

pub(crate) struct RegistryInner {
    pub(crate) connections: DashMap<String, Arc<ManagedConnection>>,
    transport: Arc<dyn AdminTransport>,
    settings: Arc<ConnectionSettings>,
}

/// Cheaply cloneable handle to the identifier to manager mapping.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new(transport: Arc<dyn AdminTransport>, settings: ConnectionSettings) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connections: DashMap::new(),
                transport,
                settings: Arc::new(settings),
            }),
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.inner.settings
    }

    pub fn get(&self, id: &str) -> Option<Arc<ManagedConnection>> {
        self.inner.connections.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.connections.is_empty()
    }

    /// Registered identifiers, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    fn build(&self, record: &ServerRecord) -> Arc<ManagedConnection> {
        ManagedConnection::new(
            record.id.clone(),
            record.address(),
            record.credential.clone(),
            self.inner.transport.clone(),
            self.inner.settings.clone(),
            Arc::downgrade(&self.inner),
        )
    }

    /// Registers a new manager for `record`. A manager already registered
    /// under the same identifier is replaced and destroyed.
    pub async fn create(&self, record: &ServerRecord) -> Arc<ManagedConnection> {
        let connection = self.build(record);
        let previous = self
            .inner
            .connections
            .insert(record.id.clone(), connection.clone());

        if let Some(previous) = previous {
            previous
                .log()
                .warning("Replaced by a new connection manager");
            previous.destroy().await;
        }
        debug!("Registered connection manager {}", record.id);
        connection
    }

    /// Returns the registered manager for `record.id`, creating one if
    /// needed. Existing managers keep their current parameters.
    pub fn get_or_create(&self, record: &ServerRecord) -> Arc<ManagedConnection> {
        self.inner
            .connections
            .entry(record.id.clone())
            .or_insert_with(|| self.build(record))
            .value()
            .clone()
    }

    /// Server deleted from the directory. Returns whether a manager existed.
    pub async fn remove_server(&self, id: &str) -> bool {
        match self.get(id) {
            Some(connection) => {
                connection.destroy().await;
                true
            }
            None => false,
        }
    }

    /// Server edited in the directory. Returns whether a manager existed.
    pub async fn update_server(&self, record: &ServerRecord) -> bool {
        match self.get(&record.id) {
            Some(connection) => {
                connection
                    .update_server_data(record.address(), record.credential.clone())
                    .await;
                true
            }
            None => false,
        }
    }

    /// Checks that `address` accepts `credential` using a disposable probe
    /// registered as `probe:<owner>`. The probe is destroyed before
    /// returning.
    #[instrument(skip(self, credential))]
    pub async fn verify(&self, owner: &str, address: &ServerAddress, credential: &Credential) -> bool {
        let record = ServerRecord {
            id: format!("{PROBE_PREFIX}{owner}"),
            host: address.host.clone(),
            port: address.port,
            credential: credential.clone(),
        };

        let probe = self.create(&record).await;
        probe.create_connection().await;
        let authenticated = probe.is_authenticated();
        probe.destroy().await;

        info!(
            "Verification of {} {}",
            address,
            if authenticated { "succeeded" } else { "failed" }
        );
        authenticated
    }

    /// Destroys every registered manager.
    pub async fn shutdown(&self) {
        let connections: Vec<Arc<ManagedConnection>> = self
            .inner
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        info!("Shutting down {} connection(s)", connections.len());
        for connection in connections {
            connection.destroy().await;
        }
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.ids())
            .finish_non_exhaustive()
    }
}
