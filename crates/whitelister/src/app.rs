//! Command execution against the configured servers.

use crate::cli::Command;
use crate::config::AppConfig;
use crate::signals::shutdown_signal;
use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use whitelist_core::{
    AddOutcome, AdminTransport, ConnectionRegistry, Credential, InMemoryServerDirectory, LogLevel,
    ManagedConnection, RconTransport, RemoveOutcome, ServerAddress, ServerDirectory, ServerRecord,
    ServerStatus, StatusClassifier,
};

/// Owner recorded on verification probes started from the command line.
const CLI_PROBE_OWNER: &str = "cli";

/// What a command prints and whether it counts as a success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub output: String,
    pub success: bool,
}

impl Report {
    fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }

    fn failure(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusLine {
    pub id: String,
    pub address: String,
    pub status: ServerStatus,
    pub last_successful_connection: Option<DateTime<Utc>>,
}

pub struct Application {
    config: AppConfig,
    registry: ConnectionRegistry,
    directory: Arc<InMemoryServerDirectory>,
    classifier: StatusClassifier,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        let transport = Arc::new(RconTransport::new(config.rcon.clone()));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: AppConfig, transport: Arc<dyn AdminTransport>) -> Self {
        let registry = ConnectionRegistry::new(transport, config.connection.clone());
        let directory = Arc::new(config.directory());
        let classifier = StatusClassifier::new(registry.clone(), directory.clone());

        Self {
            config,
            registry,
            directory,
            classifier,
        }
    }

    #[cfg(test)]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub async fn execute(&self, command: Command) -> Result<Report> {
        match command {
            Command::Status { passive, json } => self.status(passive, json).await,
            Command::Watch { interval_secs } => {
                if interval_secs == 0 {
                    bail!("--interval-secs must be greater than 0");
                }
                self.watch(Duration::from_secs(interval_secs), async {
                    if let Err(e) = shutdown_signal().await {
                        warn!("Signal handling failed: {}", e);
                    }
                })
                .await;
                Ok(Report::success(""))
            }
            Command::List { server } => self.list(&server).await,
            Command::Add { server, player } => self.add(&server, &player).await,
            Command::Remove { server, player } => self.remove(&server, &player).await,
            Command::Verify {
                host,
                port,
                password,
            } => {
                self.verify(ServerAddress::new(host, port), Credential::new(password))
                    .await
            }
        }
    }

    /// Destroys every open connection.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }

    async fn status(&self, passive: bool, json: bool) -> Result<Report> {
        if !passive {
            let connections: Vec<Arc<ManagedConnection>> = self
                .directory
                .records()
                .iter()
                .map(|record| self.registry.get_or_create(record))
                .collect();
            join_all(connections.iter().map(|c| c.create_connection())).await;
        }

        let lines = self.status_lines();
        if json {
            return Ok(Report::success(serde_json::to_string_pretty(&lines)?));
        }
        if lines.is_empty() {
            return Ok(Report::success("No servers configured"));
        }

        let output = lines
            .iter()
            .map(|line| {
                let last = line
                    .last_successful_connection
                    .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .unwrap_or_else(|| "never".to_string());
                format!(
                    "{:<16} {:<24} {:<12} {}",
                    line.id, line.address, line.status, last
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Report::success(output))
    }

    fn status_lines(&self) -> Vec<StatusLine> {
        self.classifier
            .classify_all(true)
            .into_iter()
            .map(|(record, status)| StatusLine {
                address: record.address().to_string(),
                last_successful_connection: self
                    .registry
                    .get(&record.id)
                    .and_then(|connection| connection.last_successful_connection_at()),
                id: record.id,
                status,
            })
            .collect()
    }

    /// Re-classifies every server each `interval` until `shutdown` resolves.
    pub async fn watch<F>(&self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            "Watching {} server(s) every {}s",
            self.directory.len(),
            interval.as_secs()
        );

        let mut ticker = tokio::time::interval(interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Stopping status watch");
                    break;
                }
                _ = ticker.tick() => {
                    for (record, status) in self.classifier.classify_all(false) {
                        info!(server = %record.id, "Status: {}", status);
                    }
                }
            }
        }
    }

    fn record(&self, id: &str) -> Result<ServerRecord> {
        self.directory
            .get(id)
            .ok_or_else(|| anyhow!("Unknown server: {id}"))
    }

    /// Connects with the interactive keep-alive window, so that a remote
    /// close in the middle of a flow is not raced by an automatic reconnect.
    async fn open_session(&self, id: &str) -> Result<Arc<ManagedConnection>> {
        let record = self.record(id)?;
        let connection = self.registry.get_or_create(&record);

        if !connection
            .ensure_session(self.config.connection.interactive_window())
            .await
        {
            let reason = connection
                .log()
                .last_of(LogLevel::Error)
                .map(|entry| entry.message)
                .unwrap_or_else(|| "no successful connection".to_string());
            bail!("Server {id} is unreachable: {reason}");
        }
        Ok(connection)
    }

    async fn list(&self, id: &str) -> Result<Report> {
        let connection = self.open_session(id).await?;
        let players = connection.get_whitelisted_players().await;

        if players.is_empty() {
            Ok(Report::success(format!("No players are whitelisted on {id}")))
        } else {
            Ok(Report::success(players.join("\n")))
        }
    }

    async fn add(&self, id: &str, player: &str) -> Result<Report> {
        let connection = self.open_session(id).await?;
        Ok(match connection.whitelist_player(player).await {
            AddOutcome::Added => Report::success(format!("Added {player} to the whitelist of {id}")),
            AddOutcome::AlreadyPresent => {
                Report::success(format!("{player} is already whitelisted on {id}"))
            }
            AddOutcome::Failed => Report::failure(format!("Failed to whitelist {player} on {id}")),
        })
    }

    async fn remove(&self, id: &str, player: &str) -> Result<Report> {
        let connection = self.open_session(id).await?;
        Ok(match connection.unwhitelist_player(player).await {
            RemoveOutcome::Removed => {
                Report::success(format!("Removed {player} from the whitelist of {id}"))
            }
            RemoveOutcome::AlreadyAbsent => {
                Report::success(format!("{player} is not whitelisted on {id}"))
            }
            RemoveOutcome::Failed => {
                Report::failure(format!("Failed to remove {player} from the whitelist of {id}"))
            }
        })
    }

    async fn verify(&self, address: ServerAddress, credential: Credential) -> Result<Report> {
        if self
            .registry
            .verify(CLI_PROBE_OWNER, &address, &credential)
            .await
        {
            Ok(Report::success(format!("{address} accepted the password")))
        } else {
            Ok(Report::failure(format!("Could not authenticate with {address}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerEntry;
    use whitelist_core::testing::MockTransport;

    fn config() -> AppConfig {
        AppConfig {
            servers: vec![
                ServerEntry {
                    id: "survival".to_string(),
                    host: "203.0.113.10".to_string(),
                    port: 25575,
                    password: "secret".to_string(),
                },
                ServerEntry {
                    id: "internal".to_string(),
                    host: "10.0.0.5".to_string(),
                    port: 25575,
                    password: "secret".to_string(),
                },
            ],
            ..Default::default()
        }
    }

    fn app() -> (MockTransport, Application) {
        let transport = MockTransport::new();
        let app = Application::with_transport(config(), Arc::new(transport.clone()));
        (transport, app)
    }

    #[tokio::test]
    async fn test_status_connects_and_reports() {
        let (transport, app) = app();

        let report = app
            .execute(Command::Status {
                passive: false,
                json: false,
            })
            .await
            .unwrap();

        assert!(report.success);
        let lines: Vec<&str> = report.output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("internal"));
        assert!(lines[0].contains("unreachable"));
        assert!(lines[0].ends_with("never"));
        assert!(lines[1].starts_with("survival"));
        assert!(lines[1].contains("online"));
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_passive_status_as_json() {
        let (transport, app) = app();

        let report = app
            .execute(Command::Status {
                passive: true,
                json: true,
            })
            .await
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&report.output).unwrap();
        assert_eq!(parsed[1]["id"], "survival");
        assert_eq!(parsed[1]["status"], "unknown");
        assert!(parsed[1]["last_successful_connection"].is_null());
        assert_eq!(transport.connect_calls(), 0);
    }

    #[tokio::test]
    async fn test_add_remove_and_list() {
        let (transport, app) = app();

        let report = app
            .execute(Command::Add {
                server: "survival".to_string(),
                player: "Alice".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(report, Report::success("Added Alice to the whitelist of survival"));

        let report = app
            .execute(Command::List {
                server: "survival".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(report.output, "Alice");

        let report = app
            .execute(Command::Remove {
                server: "survival".to_string(),
                player: "Bob".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(report, Report::success("Bob is not whitelisted on survival"));

        // One session serves the whole flow.
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_add_is_a_failure_report() {
        let (transport, app) = app();
        transport.script_reply(Ok("That player does not exist".to_string()));

        let report = app
            .execute(Command::Add {
                server: "survival".to_string(),
                player: "Nobody".to_string(),
            })
            .await
            .unwrap();
        assert!(!report.success);
    }

    #[tokio::test]
    async fn test_unknown_and_unreachable_servers_are_errors() {
        let (transport, app) = app();

        let err = app
            .execute(Command::List {
                server: "missing".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown server: missing");

        let err = app
            .execute(Command::List {
                server: "internal".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Server internal is unreachable"));
        assert_eq!(transport.connect_calls(), 0);
    }

    #[tokio::test]
    async fn test_verify_reports_outcome() {
        let (transport, app) = app();

        let report = app
            .execute(Command::Verify {
                host: "203.0.113.10".to_string(),
                port: 25575,
                password: "secret".to_string(),
            })
            .await
            .unwrap();
        assert!(report.success);

        transport.set_reject_auth(true);
        let report = app
            .execute(Command::Verify {
                host: "203.0.113.10".to_string(),
                port: 25575,
                password: "wrong".to_string(),
            })
            .await
            .unwrap();
        assert!(!report.success);
        assert!(app.registry().is_empty());
    }

    #[tokio::test]
    async fn test_verify_leaves_configured_sessions_alone() {
        let transport = MockTransport::new();
        let mut config = config();
        config.servers.push(ServerEntry {
            id: "probe:cli".to_string(),
            host: "203.0.113.12".to_string(),
            port: 25575,
            password: "secret".to_string(),
        });
        let app = Application::with_transport(config, Arc::new(transport.clone()));

        let err = app
            .execute(Command::List {
                server: "probe:cli".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown server: probe:cli");

        let survival = app.open_session("survival").await.unwrap();
        let report = app
            .execute(Command::Verify {
                host: "203.0.113.11".to_string(),
                port: 25575,
                password: "secret".to_string(),
            })
            .await
            .unwrap();

        assert!(report.success);
        assert!(survival.is_authenticated());
        assert_eq!(app.registry().ids(), vec!["survival".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_connects_until_shutdown() {
        let (transport, app) = app();

        app.watch(
            Duration::from_secs(30),
            tokio::time::sleep(Duration::from_secs(95)),
        )
        .await;

        assert_eq!(transport.connect_calls(), 1);
        assert!(app.registry().get("survival").unwrap().is_authenticated());
        assert!(app.registry().contains("internal"));

        app.shutdown().await;
        assert!(app.registry().is_empty());
    }
}
