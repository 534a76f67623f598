//! # Configuration Management
//!
//! Centralized configuration for the bus.
//!
//! This module provides structured configuration for servers, clients, and
//! per-connection behavior: socket paths, timeouts, reference types, and
//! reconnection policy.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-variable overrides via `from_env()`

use crate::error::{BusError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default endpoint path for the local domain socket.
pub const DEFAULT_SOCKET_PATH: &str = "bus.ipc";

/// First transaction id allocated by a client-originated connection.
pub const INITIAL_ID_CLIENT: u64 = 1;

/// First transaction id allocated by a server-originated connection.
pub const INITIAL_ID_SERVER: u64 = 2;

/// Default capacity of per-transaction inboxes.
pub const DEFAULT_INBOX_CAPACITY: usize = 32;

/// Reference-type tags occupy 0x30..=0x7F of the extension range.
pub const MAX_REFERENCE_TYPES: usize = 80;

/// Options applied when constructing a single connection.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// First transaction id; 1 for client-originated connections, 2 for
    /// server-originated ones. Both sides step by 2, so ids never collide.
    pub initial_id: u64,

    /// Default per-read timeout for transactions; `None` waits forever.
    pub timeout: Option<Duration>,

    /// Kind labels of objects to auto-bind as implicit proxies during
    /// encoding, in tag order (index i encodes as extension tag 0x30+i).
    pub reference_types: Vec<String>,

    /// Capacity of each transaction's response inbox.
    pub inbox_capacity: usize,
}

impl ConnectionOptions {
    /// Options for a client-originated connection.
    pub fn client() -> Self {
        Self {
            initial_id: INITIAL_ID_CLIENT,
            timeout: None,
            reference_types: Vec::new(),
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }

    /// Options for a server-originated connection.
    pub fn server() -> Self {
        Self {
            initial_id: INITIAL_ID_SERVER,
            timeout: None,
            reference_types: Vec::new(),
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }

    /// Set the default per-read timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Register kinds to send by reference.
    pub fn with_reference_types<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reference_types = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.initial_id != INITIAL_ID_CLIENT && self.initial_id != INITIAL_ID_SERVER {
            errors.push(format!(
                "Invalid initial transaction id: {} (expected {} or {})",
                self.initial_id, INITIAL_ID_CLIENT, INITIAL_ID_SERVER
            ));
        }

        if self.reference_types.len() > MAX_REFERENCE_TYPES {
            errors.push(format!(
                "Too many reference types: {} (maximum: {})",
                self.reference_types.len(),
                MAX_REFERENCE_TYPES
            ));
        }

        if self.inbox_capacity == 0 {
            errors.push("Inbox capacity must be greater than 0".to_string());
        }

        if let Some(t) = self.timeout {
            if t.as_millis() < 10 {
                errors.push("Transaction timeout too short (minimum: 10ms)".to_string());
            }
        }

        errors
    }
}

/// Main bus configuration structure containing all configurable settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BusConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Per-connection tuning
    #[serde(default)]
    pub connection: ConnectionTuning,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BusConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| BusError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| BusError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| BusError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("OBJECT_BUS_SOCKET_PATH") {
            config.server.socket_path = path.clone();
            config.client.socket_path = path;
        }

        if let Ok(timeout) = std::env::var("OBJECT_BUS_INVOKE_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.connection.invoke_timeout = Some(Duration::from_millis(val));
            }
        }

        if let Ok(capacity) = std::env::var("OBJECT_BUS_INBOX_CAPACITY") {
            if let Ok(val) = capacity.parse::<usize>() {
                config.connection.inbox_capacity = val;
            }
        }

        if let Ok(delay) = std::env::var("OBJECT_BUS_RECONNECT_DELAY_MS") {
            if let Ok(val) = delay.parse::<u64>() {
                config.client.reconnect_delay = Duration::from_millis(val);
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration.
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content.
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BusError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| BusError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Connection options for the client side of this configuration.
    pub fn client_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            initial_id: INITIAL_ID_CLIENT,
            timeout: self.connection.invoke_timeout,
            reference_types: self.connection.reference_types.clone(),
            inbox_capacity: self.connection.inbox_capacity,
        }
    }

    /// Connection options for the server side of this configuration.
    pub fn server_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            initial_id: INITIAL_ID_SERVER,
            ..self.client_options()
        }
    }

    /// Validate the configuration for common issues and misconfigurations.
    ///
    /// Returns a list of validation errors. Empty list means the
    /// configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.connection.validate());
        errors.extend(self.logging.validate());

        errors
    }

    /// Validate and return Result - convenience method.
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BusError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Server-specific configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Path of the unix domain socket to listen on.
    pub socket_path: String,

    /// Timeout for graceful server shutdown.
    #[serde(with = "millis")]
    pub shutdown_timeout: Duration,

    /// Maximum number of concurrent connections.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: String::from(DEFAULT_SOCKET_PATH),
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.socket_path.is_empty() {
            errors.push("Server socket path cannot be empty".to_string());
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        errors
    }
}

/// Client-specific configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Path of the unix domain socket to dial.
    pub socket_path: String,

    /// Timeout for connection attempts.
    #[serde(with = "millis")]
    pub connect_timeout: Duration,

    /// Whether the supervised mode reconnects on connection loss.
    pub auto_reconnect: bool,

    /// Maximum number of reconnect attempts before giving up; 0 retries
    /// forever.
    pub max_reconnect_attempts: u32,

    /// Base delay between reconnect attempts.
    #[serde(with = "millis")]
    pub reconnect_delay: Duration,

    /// Upper bound for the backoff delay.
    #[serde(with = "millis")]
    pub reconnect_delay_max: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: String::from(DEFAULT_SOCKET_PATH),
            connect_timeout: timeout::DEFAULT_TIMEOUT,
            auto_reconnect: true,
            max_reconnect_attempts: 0,
            reconnect_delay: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Validate client configuration.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.socket_path.is_empty() {
            errors.push("Client socket path cannot be empty".to_string());
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connect timeout too short (minimum: 100ms)".to_string());
        }

        if self.reconnect_delay.as_millis() < 10 {
            errors.push("Reconnect delay too short (minimum: 10ms)".to_string());
        } else if self.reconnect_delay > self.reconnect_delay_max {
            errors.push("Reconnect delay exceeds its configured maximum".to_string());
        }

        errors
    }
}

/// Per-connection tuning shared by both roles.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionTuning {
    /// Kind labels sent by reference instead of by value.
    pub reference_types: Vec<String>,

    /// Default per-read timeout for transactions; absent waits forever.
    #[serde(default, with = "millis::opt")]
    pub invoke_timeout: Option<Duration>,

    /// Capacity of each transaction's response inbox.
    pub inbox_capacity: usize,
}

impl Default for ConnectionTuning {
    fn default() -> Self {
        Self {
            reference_types: Vec::new(),
            invoke_timeout: None,
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

impl ConnectionTuning {
    /// Validate connection tuning.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.reference_types.len() > MAX_REFERENCE_TYPES {
            errors.push(format!(
                "Too many reference types: {} (maximum: {})",
                self.reference_types.len(),
                MAX_REFERENCE_TYPES
            ));
        }

        if self.inbox_capacity == 0 {
            errors.push("Inbox capacity must be greater than 0".to_string());
        }

        errors
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name stamped on log lines.
    pub app_name: String,

    /// Log level.
    #[serde(with = "level_name")]
    pub log_level: Level,

    /// Whether to log to console.
    pub log_to_console: bool,

    /// Whether to log to file.
    pub log_to_file: bool,

    /// Path to log file (if `log_to_file` is true).
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs.
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("object-bus"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if !(1..=64).contains(&self.app_name.len()) {
            errors.push(format!(
                "app_name must be 1-64 characters (got {})",
                self.app_name.len()
            ));
        }

        match (self.log_to_file, self.log_file_path.as_deref()) {
            (true, None) => {
                errors.push("log_to_file is set but log_file_path is not".to_string());
            }
            (true, Some(path)) => {
                let dir = std::path::Path::new(path)
                    .parent()
                    .filter(|d| !d.as_os_str().is_empty());
                if let Some(dir) = dir.filter(|d| !d.exists()) {
                    errors.push(format!("log file directory missing: {}", dir.display()));
                }
            }
            (false, _) => {}
        }

        if !(self.log_to_console || self.log_to_file) {
            errors.push("no logging output enabled (console and file both off)".to_string());
        }

        errors
    }
}

/// Timeouts and delays travel through TOML as integer milliseconds, the
/// granularity every knob in this file is specified at. Values past
/// `u64::MAX` ms saturate instead of wrapping.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        u64::deserialize(de).map(Duration::from_millis)
    }

    /// Same framing for knobs that may be absent (no timeout configured).
    pub mod opt {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            ser: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => super::serialize(d, ser),
                None => ser.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            de: D,
        ) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(de)?.map(Duration::from_millis))
        }
    }
}

/// The `[logging]` level is a lowercase name in TOML; `Level::from_str`
/// accepts it case-insensitively on the way back in.
mod level_name {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S: Serializer>(level: &Level, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&level.to_string().to_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Level, D::Error> {
        let name = String::deserialize(de)?;
        Level::from_str(&name)
            .map_err(|_| serde::de::Error::custom(format!("unknown log level `{name}`")))
    }
}
