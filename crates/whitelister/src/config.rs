//! Application configuration loaded from a TOML file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;
use whitelist_core::{
    is_probe_id, ConnectionSettings, InMemoryServerDirectory, RconSettings, ServerRecord,
};

fn default_rcon_port() -> u16 {
    25575
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Connection lifecycle and whitelist dialect
    #[serde(default)]
    pub connection: ConnectionSettings,
    /// RCON timeouts
    #[serde(default)]
    pub rcon: RconSettings,
    /// Managed servers
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter
    pub level: String,
    /// JSON formatting
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// One `[[servers]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub id: String,
    pub host: String,
    #[serde(default = "default_rcon_port")]
    pub port: u16,
    pub password: String,
}

impl From<&ServerEntry> for ServerRecord {
    fn from(entry: &ServerEntry) -> Self {
        ServerRecord::new(
            entry.id.clone(),
            entry.host.clone(),
            entry.port,
            entry.password.as_str(),
        )
    }
}

impl AppConfig {
    /// Loads the configuration, writing a default file first if none exists.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        self.connection.validate()?;
        self.rcon.validate()?;

        let mut seen = HashSet::new();
        for server in &self.servers {
            if server.id.trim().is_empty() {
                return Err("Server id cannot be empty".to_string());
            }
            if is_probe_id(&server.id) {
                return Err(format!(
                    "Server id {} uses the reserved verification prefix",
                    server.id
                ));
            }
            if !seen.insert(server.id.as_str()) {
                return Err(format!("Duplicate server id: {}", server.id));
            }
            if server.port == 0 {
                return Err(format!("Server {} has an invalid port", server.id));
            }
        }

        Ok(())
    }

    pub fn directory(&self) -> InMemoryServerDirectory {
        self.servers.iter().map(ServerRecord::from).collect()
    }
}
