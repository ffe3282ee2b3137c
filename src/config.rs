//! # Configuration Management
//!
//! Centralized configuration for the LDAP server engine.
//!
//! This module provides structured configuration for the listener, the
//! per-operation limits, TLS, logging and the root information entry.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Environment variables via `from_env()`
//! - Direct instantiation with defaults and `default_with_overrides()`
//!
//! ## Security Considerations
//! - Default message size cap (16 MB) bounds memory per connection
//! - The default search time limit (10s) keeps runaway handlers in check
//! - TLS settings enforce modern cryptography (TLS 1.2+)

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Only LDAPv3 is spoken
pub const LDAP_VERSION: i32 = 3;

/// Max allowed size of one LDAPMessage (16 MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default TCP port for plain LDAP
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:389";

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LdapConfig {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Size and time limits applied to searches
    #[serde(default)]
    pub limits: LimitsConfig,

    /// TLS configuration
    #[serde(default)]
    pub tls: TlsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Content of the root information entry
    #[serde(default)]
    pub root: RootConfig,
}

impl LdapConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("LDAP_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(path) = std::env::var("LDAP_SOCKET_PATH") {
            config.server.socket_path = Some(path);
        }

        if let Ok(max) = std::env::var("LDAP_MAX_CONNECTIONS") {
            if let Ok(val) = max.parse::<usize>() {
                config.server.max_connections = val;
            }
        }

        if let Ok(limit) = std::env::var("LDAP_SIZE_LIMIT") {
            if let Ok(val) = limit.parse::<usize>() {
                config.limits.size_limit = (val > 0).then_some(val);
            }
        }

        if let Ok(limit) = std::env::var("LDAP_TIME_LIMIT_MS") {
            if let Ok(val) = limit.parse::<u64>() {
                config.limits.time_limit = Duration::from_millis(val);
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.validate_without_tls();
        errors.extend(self.tls.validate());
        errors
    }

    /// Every section except `[tls]`, for servers handed a ready acceptor
    pub(crate) fn validate_without_tls(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.limits.validate());
        errors.extend(self.logging.validate());
        errors.extend(self.root.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        validation_result(self.validate())
    }
}

pub(crate) fn validation_result(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ProtocolError::ConfigError(format!(
            "Configuration validation failed:\n  - {}",
            errors.join("\n  - ")
        )))
    }
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// TCP listen address (e.g., "0.0.0.0:389")
    pub address: String,

    /// Optional Unix domain socket path (ldapi)
    #[serde(default)]
    pub socket_path: Option<String>,

    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// Largest accepted LDAPMessage in bytes
    pub max_message_size: usize,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Disable Nagle's algorithm on accepted sockets
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from(DEFAULT_ADDRESS),
            socket_path: None,
            max_connections: 1000,
            max_message_size: MAX_MESSAGE_SIZE,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:389')",
                self.address
            ));
        }

        if let Some(path) = &self.socket_path {
            if path.is_empty() {
                errors.push("Socket path cannot be empty when set".to_string());
            }
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        if self.max_message_size < 1024 {
            errors.push("Max message size too small (minimum: 1 KB)".to_string());
        } else if self.max_message_size > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max message size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_message_size
            ));
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Server-side search limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Maximum entries per search; `None` means unlimited
    #[serde(default)]
    pub size_limit: Option<usize>,

    /// Deadline for one search handler invocation
    #[serde(with = "duration_serde")]
    pub time_limit: Duration,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            size_limit: None,
            time_limit: timeout::DEFAULT_TIME_LIMIT,
        }
    }
}

impl LimitsConfig {
    /// Validate limits configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.size_limit == Some(0) {
            errors.push("Size limit must be greater than 0 (omit it for unlimited)".to_string());
        }

        if self.time_limit.as_millis() < 10 {
            errors.push("Time limit too short (minimum: 10ms)".to_string());
        } else if self.time_limit.as_secs() > 3600 {
            errors.push("Time limit too long (maximum: 1 hour)".to_string());
        }

        errors
    }

    /// Effective size limit given the client's request (0 = none)
    pub fn effective_size_limit(&self, requested: i32) -> Option<usize> {
        let requested = usize::try_from(requested).ok().filter(|n| *n > 0);
        match (self.size_limit, requested) {
            (Some(server), Some(client)) => Some(server.min(client)),
            (server, client) => server.or(client),
        }
    }

    /// Effective time limit given the client's request in seconds (0 = none)
    pub fn effective_time_limit(&self, requested: i32) -> Duration {
        match u64::try_from(requested) {
            Ok(secs) if secs > 0 => self.time_limit.min(Duration::from_secs(secs)),
            _ => self.time_limit,
        }
    }
}

/// How TLS is offered to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    /// Plain connections only
    #[default]
    Disabled,
    /// Handshake immediately after accept (ldaps)
    OnConnect,
    /// Plain connections that may upgrade with the StartTLS extended operation
    StartTls,
}

/// TLS configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    pub mode: TlsMode,

    /// PEM certificate chain
    #[serde(default)]
    pub cert_path: Option<String>,

    /// PEM PKCS#8 private key
    #[serde(default)]
    pub key_path: Option<String>,

    /// PEM CA bundle; when set, clients must present a certificate it signed
    #[serde(default)]
    pub client_ca_path: Option<String>,

    #[serde(with = "duration_serde")]
    pub handshake_timeout: Duration,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            mode: TlsMode::Disabled,
            cert_path: None,
            key_path: None,
            client_ca_path: None,
            handshake_timeout: timeout::TLS_HANDSHAKE_TIMEOUT,
        }
    }
}

impl TlsConfig {
    /// Validate TLS configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.mode != TlsMode::Disabled {
            if self.cert_path.is_none() {
                errors.push("cert_path must be specified when TLS is enabled".to_string());
            }
            if self.key_path.is_none() {
                errors.push("key_path must be specified when TLS is enabled".to_string());
            }
            for path in [&self.cert_path, &self.key_path, &self.client_ca_path]
                .into_iter()
                .flatten()
            {
                if !Path::new(path).exists() {
                    errors.push(format!("TLS file does not exist: {path}"));
                }
            }
        }

        if self.handshake_timeout.as_millis() < 100 {
            errors.push("TLS handshake timeout too short (minimum: 100ms)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("ldap-protocol"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Content of the root information entry (the zero-length DN)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RootConfig {
    /// DNs of the naming contexts held by this server
    #[serde(default)]
    pub naming_contexts: Vec<String>,

    /// DN of the subschema entry, if one is published
    #[serde(default)]
    pub subschema_subentry: Option<String>,

    pub vendor_name: String,

    /// Control OIDs handlers understand; other critical controls are refused
    #[serde(default)]
    pub supported_controls: Vec<String>,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            naming_contexts: Vec::new(),
            subschema_subentry: None,
            vendor_name: String::from("ldap-protocol"),
            supported_controls: Vec::new(),
        }
    }
}

impl RootConfig {
    /// Validate root entry configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for context in self
            .naming_contexts
            .iter()
            .chain(self.subschema_subentry.iter())
        {
            if crate::protocol::dn::Dn::parse(context).is_err() {
                errors.push(format!("Invalid DN in root entry configuration: '{context}'"));
            }
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_size_limit() {
        let limits = LimitsConfig {
            size_limit: Some(100),
            ..LimitsConfig::default()
        };
        assert_eq!(limits.effective_size_limit(0), Some(100));
        assert_eq!(limits.effective_size_limit(150), Some(100));
        assert_eq!(limits.effective_size_limit(20), Some(20));
        assert_eq!(limits.effective_size_limit(-5), Some(100));

        let unlimited = LimitsConfig::default();
        assert_eq!(unlimited.effective_size_limit(0), None);
        assert_eq!(unlimited.effective_size_limit(7), Some(7));
    }

    #[test]
    fn test_effective_time_limit() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.effective_time_limit(0), Duration::from_secs(10));
        assert_eq!(limits.effective_time_limit(3), Duration::from_secs(3));
        assert_eq!(limits.effective_time_limit(60), Duration::from_secs(10));
    }
}
