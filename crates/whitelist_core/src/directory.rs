//! Server directory interface.
//!
//! The directory is the external source of truth for which servers exist and
//! how to reach them. Managers are keyed by the directory's identifiers.
//! Persisting the directory is left to the embedding application.

use crate::error::DirectoryError;
use crate::registry::is_probe_id;
use crate::transport::{Credential, ServerAddress};
use dashmap::DashMap;
use tracing::warn;
use uuid::Uuid;

/// Connection parameters of one remote server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRecord {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub credential: Credential,
}

impl ServerRecord {
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        credential: impl Into<Credential>,
    ) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            credential: credential.into(),
        }
    }

    pub fn address(&self) -> ServerAddress {
        ServerAddress::new(self.host.clone(), self.port)
    }
}

/// Read access to the server directory.
pub trait ServerDirectory: Send + Sync {
    fn get(&self, id: &str) -> Option<ServerRecord>;

    /// All records, sorted by identifier.
    fn records(&self) -> Vec<ServerRecord>;
}

/// Directory held in memory.
#[derive(Debug, Default)]
pub struct InMemoryServerDirectory {
    records: DashMap<String, ServerRecord>,
}

impl InMemoryServerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a server under `id`, or under a freshly generated identifier
    /// when `id` is `None`. Probe identifiers are refused.
    pub fn insert(
        &self,
        id: Option<String>,
        host: impl Into<String>,
        port: u16,
        credential: impl Into<Credential>,
    ) -> Result<ServerRecord, DirectoryError> {
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let record = ServerRecord::new(id, host, port, credential);
        self.upsert(record.clone())?;
        Ok(record)
    }

    /// Inserts or replaces a record, returning the previous one.
    pub fn upsert(&self, record: ServerRecord) -> Result<Option<ServerRecord>, DirectoryError> {
        if is_probe_id(&record.id) {
            return Err(DirectoryError::ReservedId(record.id));
        }
        Ok(self.records.insert(record.id.clone(), record))
    }

    pub fn remove(&self, id: &str) -> Option<ServerRecord> {
        self.records.remove(id).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<ServerRecord> for InMemoryServerDirectory {
    fn from_iter<I: IntoIterator<Item = ServerRecord>>(iter: I) -> Self {
        let directory = Self::new();
        for record in iter {
            if let Err(e) = directory.upsert(record) {
                warn!("Skipping server record: {}", e);
            }
        }
        directory
    }
}

impl ServerDirectory for InMemoryServerDirectory {
    fn get(&self, id: &str) -> Option<ServerRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    fn records(&self) -> Vec<ServerRecord> {
        let mut records: Vec<ServerRecord> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }
}
