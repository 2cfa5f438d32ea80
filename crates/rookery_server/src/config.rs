//! Server configuration.

use derive_getters::Getters;
use derive_more::{Display, Error};
use rookery_core::TimeControl;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::connection::ConnectionConfig;

/// Settings for the `rookery` server, loaded from TOML.
///
/// Every field has a default, so an empty file is a valid configuration.
/// Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Getters, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    host: String,

    /// Port to bind.
    port: u16,

    /// SQLite archive file. Finished games are kept in memory when unset.
    archive_path: Option<String>,

    /// Idle sessions are reclaimed from the active store after this long.
    session_ttl_secs: u64,

    /// Bound on each store call.
    store_timeout_secs: u64,

    /// Frames queued per connection before it is evicted.
    outbox_capacity: usize,

    /// Interval between keepalive pings.
    keepalive_secs: u64,

    /// Longest silence tolerated from a peer.
    read_deadline_secs: u64,

    /// Bound on a single socket write.
    write_deadline_secs: u64,

    /// Largest inbound frame accepted, in bytes.
    max_frame_bytes: usize,

    /// Time control used when a create request omits one.
    default_time_control: TimeControl,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            archive_path: None,
            session_ttl_secs: 24 * 60 * 60,
            store_timeout_secs: 5,
            outbox_capacity: 256,
            keepalive_secs: 54,
            read_deadline_secs: 60,
            write_deadline_secs: 10,
            max_frame_bytes: 512 * 1024,
            default_time_control: TimeControl::new(600, 0),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or fails
    /// [`validate`](Self::validate).
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml(&content)?;
        info!(host = %config.host, port = config.port, "Config loaded successfully");
        Ok(config)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed TOML or invalid values.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that would make the server misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbox_capacity == 0 {
            return Err(ConfigError::new("outbox_capacity must be positive".to_string()));
        }
        if self.store_timeout_secs == 0 {
            return Err(ConfigError::new("store_timeout_secs must be positive".to_string()));
        }
        if self.keepalive_secs == 0 || self.keepalive_secs >= self.read_deadline_secs {
            return Err(ConfigError::new(format!(
                "keepalive_secs ({}) must be positive and below read_deadline_secs ({})",
                self.keepalive_secs, self.read_deadline_secs
            )));
        }
        if self.write_deadline_secs == 0 {
            return Err(ConfigError::new("write_deadline_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// Overrides the bind address.
    pub fn set_bind(&mut self, host: Option<String>, port: Option<u16>) {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
    }

    /// Overrides the archive location.
    pub fn set_archive_path(&mut self, path: Option<String>) {
        if path.is_some() {
            self.archive_path = path;
        }
    }

    /// Active-store expiry.
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Store call bound.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    /// Limits applied to live connections.
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig::new(
            self.outbox_capacity,
            Duration::from_secs(self.keepalive_secs),
            Duration::from_secs(self.read_deadline_secs),
            Duration::from_secs(self.write_deadline_secs),
            self.max_frame_bytes,
        )
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.session_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.connection(), ConnectionConfig::default());
    }

    #[test]
    fn partial_file_overrides_named_fields() {
        let config = ServerConfig::from_toml(
            r#"
            port = 9000
            archive_path = "games.db"

            [default_time_control]
            initial_time = 300
            increment = 2
            "#,
        )
        .unwrap();
        assert_eq!(*config.port(), 9000);
        assert_eq!(config.archive_path().as_deref(), Some("games.db"));
        assert_eq!(*config.default_time_control(), TimeControl::new(300, 2));
        assert_eq!(config.host(), "127.0.0.1");
    }

    #[test]
    fn keepalive_must_precede_read_deadline() {
        let err = ServerConfig::from_toml("keepalive_secs = 60\nread_deadline_secs = 60").unwrap_err();
        assert!(err.message.contains("keepalive_secs"));
    }

    #[test]
    fn malformed_toml_is_reported() {
        let err = ServerConfig::from_toml("port = \"eighty\"").unwrap_err();
        assert!(err.message.starts_with("Failed to parse config"));
    }

    #[test]
    fn cli_overrides_only_given_values() {
        let mut config = ServerConfig::default();
        config.set_bind(None, Some(3000));
        config.set_archive_path(None);
        assert_eq!(config.host(), "127.0.0.1");
        assert_eq!(*config.port(), 3000);
        assert!(config.archive_path().is_none());
    }
}
