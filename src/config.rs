//! # Configuration Management
//!
//! Centralized configuration for a mesh node.
//!
//! This module provides structured configuration for the node identity, the
//! distance-vector timers, the advertisement slot and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! ## Timer Relationships
//! - The route timeout must outlive several broadcast intervals, or healthy routes flap
//! - The advertise period must be shorter than the broadcast interval, or routing
//!   broadcasts pile up in the advertisement queue faster than they drain

use crate::core::address::NodeAddress;
use crate::error::{MeshError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default period between routing table broadcasts
pub const BROADCAST_INTERVAL: Duration = Duration::from_millis(3000);

/// Default age after which an unrefreshed route or neighbour is dropped
pub const ROUTE_TIMEOUT: Duration = Duration::from_millis(7000);

/// Default time a single packet occupies the advertisement slot
pub const ADVERTISE_PERIOD: Duration = Duration::from_millis(1000);

/// Default period after which the scan is re-armed
pub const SCAN_RENEWAL_PERIOD: Duration = Duration::from_millis(10_000);

/// Default broadcast payload limit in bytes (four routing triplets)
pub const MAX_PAYLOAD_SIZE: usize = 12;

/// Smallest payload limit that still carries a routing header plus one entry
pub const MIN_PAYLOAD_SIZE: usize = 6;

/// Main mesh configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MeshConfig {
    /// Node identity
    #[serde(default)]
    pub node: NodeConfig,

    /// Distance-vector routing timers
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Advertisement slot and message handling
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MeshConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| MeshError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| MeshError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| MeshError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(address) = std::env::var("ADHOC_MESH_ADDRESS") {
            config.node.address = address.parse::<u8>().map_err(|e| {
                MeshError::ConfigError(format!("Invalid ADHOC_MESH_ADDRESS '{address}': {e}"))
            })?;
        }

        if let Ok(interval) = std::env::var("ADHOC_MESH_BROADCAST_INTERVAL_MS") {
            if let Ok(val) = interval.parse::<u64>() {
                config.routing.broadcast_interval = Duration::from_millis(val);
            }
        }

        if let Ok(timeout) = std::env::var("ADHOC_MESH_ROUTE_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.routing.route_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(period) = std::env::var("ADHOC_MESH_ADVERTISE_PERIOD_MS") {
            if let Ok(val) = period.parse::<u64>() {
                config.transport.advertise_period = Duration::from_millis(val);
            }
        }

        if let Ok(limit) = std::env::var("ADHOC_MESH_MAX_PAYLOAD") {
            if let Ok(val) = limit.parse::<usize>() {
                config.transport.max_payload_size = val;
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

    /// Default configuration for the node at `address`
    pub fn for_address(address: u8) -> Self {
        Self::default_with_overrides(|c| c.node.address = address)
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| MeshError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| MeshError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.node.validate());
        errors.extend(self.routing.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());

        // Cross-section timer relationship
        if self.transport.advertise_period >= self.routing.broadcast_interval {
            errors.push(format!(
                "Advertise period ({}ms) must be shorter than the routing broadcast interval ({}ms)",
                self.transport.advertise_period.as_millis(),
                self.routing.broadcast_interval.as_millis()
            ));
        }

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(MeshError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Node identity configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Single-byte node address (255 is reserved)
    pub address: u8,

    /// Whether the node starts scanning as soon as it is spawned
    pub scan_on_start: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: 0,
            scan_on_start: true,
        }
    }
}

impl NodeConfig {
    /// Validate node configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address == NodeAddress::SENTINEL_BYTE {
            errors.push(format!(
                "Node address {} is reserved as the no-route sentinel",
                self.address
            ));
        }

        errors
    }

    /// The configured address as a typed value
    pub fn node_address(&self) -> Result<NodeAddress> {
        NodeAddress::new(self.address)
    }
}

/// Distance-vector routing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Period between routing table broadcasts
    #[serde(with = "duration_serde")]
    pub broadcast_interval: Duration,

    /// Age after which unrefreshed neighbours and routes are dropped
    #[serde(with = "duration_serde")]
    pub route_timeout: Duration,

    /// Hold-down after a withdrawal, in broadcast intervals
    pub holddown_factor: u32,

    /// Whether the routing tick starts together with the node
    pub start_on_spawn: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            broadcast_interval: BROADCAST_INTERVAL,
            route_timeout: ROUTE_TIMEOUT,
            holddown_factor: 3,
            start_on_spawn: true,
        }
    }
}

impl RoutingConfig {
    /// Time a withdrawn route refuses new information
    pub fn holddown(&self) -> Duration {
        self.broadcast_interval * self.holddown_factor
    }

    /// Validate routing configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.broadcast_interval.as_millis() < 10 {
            errors.push("Broadcast interval too short (minimum: 10ms)".to_string());
        } else if self.broadcast_interval.as_secs() > 3600 {
            errors.push("Broadcast interval too long (maximum: 1 hour)".to_string());
        }

        if self.route_timeout <= self.broadcast_interval {
            errors.push(format!(
                "Route timeout ({}ms) must be longer than the broadcast interval ({}ms)",
                self.route_timeout.as_millis(),
                self.broadcast_interval.as_millis()
            ));
        }

        if self.holddown_factor == 0 {
            errors.push("Hold-down factor must be greater than 0".to_string());
        } else if self.holddown_factor > 100 {
            errors.push(format!(
                "Hold-down factor too large: {} (maximum: 100)",
                self.holddown_factor
            ));
        }

        errors
    }
}

/// Transport scheduler and message handling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Time one packet occupies the advertisement slot
    #[serde(with = "duration_serde")]
    pub advertise_period: Duration,

    /// Period after which the scan is stopped and restarted
    #[serde(with = "duration_serde")]
    pub scan_renewal_period: Duration,

    /// Largest packet the broadcast medium carries
    pub max_payload_size: usize,

    /// Message dedup window, in advertise periods
    pub dedup_window_factor: u32,

    /// Upper bound on remembered message ids
    pub dedup_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            advertise_period: ADVERTISE_PERIOD,
            scan_renewal_period: SCAN_RENEWAL_PERIOD,
            max_payload_size: MAX_PAYLOAD_SIZE,
            dedup_window_factor: 2,
            dedup_capacity: 256,
        }
    }
}

impl TransportConfig {
    /// Window in which a repeated message id is suppressed
    pub fn dedup_window(&self) -> Duration {
        self.advertise_period * self.dedup_window_factor
    }

    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.advertise_period.as_millis() < 1 {
            errors.push("Advertise period too short (minimum: 1ms)".to_string());
        }

        if self.scan_renewal_period.as_millis() < 100 {
            errors.push("Scan renewal period too short (minimum: 100ms)".to_string());
        }

        if self.max_payload_size < MIN_PAYLOAD_SIZE {
            errors.push(format!(
                "Max payload size too small: {} bytes (minimum: {MIN_PAYLOAD_SIZE})",
                self.max_payload_size
            ));
        } else if self.max_payload_size > 255 {
            errors.push(format!(
                "Max payload size too large: {} bytes (maximum: 255)",
                self.max_payload_size
            ));
        }

        if self.dedup_window_factor == 0 {
            errors.push("Dedup window factor must be greater than 0".to_string());
        }

        if self.dedup_capacity == 0 {
            errors.push("Dedup capacity must be greater than 0".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("adhoc-mesh"),
            log_level: Level::INFO,
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
