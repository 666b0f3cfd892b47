//! Tunables for connection management.
//!
//! These settings are embedded in the application's TOML configuration under
//! `[connection]` and `[rcon]`. Every field has a default, so partial tables
//! are accepted.

use crate::dialect::WhitelistDialect;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_log_capacity() -> usize {
    256
}

fn default_online_threshold_ms() -> u64 {
    60_000
}

fn default_retry_backoff_ms() -> u64 {
    20_000
}

fn default_interactive_window_ms() -> u64 {
    1_000
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_command_timeout_ms() -> u64 {
    5_000
}

/// Lifecycle and status settings shared by all managed connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Maximum number of entries retained in each connection's event log
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,

    /// A server counts as online if it authenticated within this window
    #[serde(default = "default_online_threshold_ms")]
    pub online_threshold_ms: u64,

    /// Minimum age of the last error before the status check retries an
    /// unreachable server
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Keep-alive window used by interactive whitelist flows
    #[serde(default = "default_interactive_window_ms")]
    pub interactive_window_ms: u64,

    /// Commands and reply patterns of the remote servers
    #[serde(default)]
    pub dialect: WhitelistDialect,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            log_capacity: default_log_capacity(),
            online_threshold_ms: default_online_threshold_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            interactive_window_ms: default_interactive_window_ms(),
            dialect: WhitelistDialect::default(),
        }
    }
}

impl ConnectionSettings {
    pub fn online_threshold(&self) -> Duration {
        Duration::from_millis(self.online_threshold_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn interactive_window(&self) -> Duration {
        Duration::from_millis(self.interactive_window_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.log_capacity == 0 {
            return Err("log_capacity must be at least 1".to_string());
        }
        if self.online_threshold_ms == 0 {
            return Err("online_threshold_ms must be greater than 0".to_string());
        }
        if self.interactive_window_ms == 0 {
            return Err("interactive_window_ms must be greater than 0".to_string());
        }
        self.dialect.validate()
    }
}

/// Timeouts for the RCON transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RconSettings {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for RconSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl RconSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.connect_timeout_ms == 0 || self.command_timeout_ms == 0 {
            return Err("RCON timeouts must be greater than 0".to_string());
        }
        Ok(())
    }
}
