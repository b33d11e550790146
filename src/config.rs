//! BlockFS data node configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cache::PolicyKind;

/// Default configuration constants
///
/// This module centralizes all default values used throughout the data
/// node. Collecting them in one place keeps the CLI, the TOML loader, and
/// the tests in agreement.
pub mod defaults {
    /// Default data node identity reported on heartbeat
    pub const fn default_node_id() -> &'static str {
        "datanode-1"
    }

    /// Default blocks directory
    pub const fn default_blocks_dir() -> &'static str {
        "./blocks"
    }

    /// Default RPC listen port
    pub const LISTEN_PORT: u16 = 50051;

    /// Cache disabled by default: disk-only mode
    pub const CACHE_ENABLED: bool = false;

    /// Default cache capacity in pages (pages are `BLOCK_SIZE` bytes)
    pub const CACHE_CAPACITY_PAGES: u64 = 4096;

    /// Default eviction policy
    pub const fn default_cache_policy() -> &'static str {
        "lru"
    }

    /// Default background flusher interval in milliseconds
    pub const FLUSH_INTERVAL_MS: u64 = crate::constants::FLUSHER_INTERVAL_MS;

    /// Default dirty-page threshold as a fraction of capacity
    pub const FLUSH_THRESHOLD_RATIO: f64 = crate::constants::DIRTY_PAGE_THRESHOLD_RATIO;

    /// Default log level
    pub const fn default_log_level() -> &'static str {
        "info"
    }
}

/// Data node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Node identity and paths
    pub node: NodeConfig,

    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Page cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node ID (unique identifier reported to the master)
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Directory holding `blk_*.img` files
    #[serde(default = "default_blocks_dir")]
    pub blocks_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_node_id() -> String {
    defaults::default_node_id().to_string()
}

fn default_blocks_dir() -> PathBuf {
    PathBuf::from(defaults::default_blocks_dir())
}

fn default_log_level() -> String {
    defaults::default_log_level().to_string()
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// RPC listen port
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

fn default_listen_port() -> u16 {
    defaults::LISTEN_PORT
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
        }
    }
}

/// Page cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable the write-back page cache; disabled means disk-only mode
    #[serde(default)]
    pub enabled: bool,

    /// Cache capacity in pages
    #[serde(default = "default_cache_capacity")]
    pub capacity_pages: u64,

    /// Eviction policy: "lru" or "lfu"
    #[serde(default = "default_cache_policy")]
    pub policy: String,

    /// Background flusher interval in milliseconds
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Dirty-page threshold as a fraction of capacity
    #[serde(default = "default_flush_threshold_ratio")]
    pub flush_threshold_ratio: f64,
}

fn default_cache_capacity() -> u64 {
    defaults::CACHE_CAPACITY_PAGES
}

fn default_cache_policy() -> String {
    defaults::default_cache_policy().to_string()
}

fn default_flush_interval_ms() -> u64 {
    defaults::FLUSH_INTERVAL_MS
}

fn default_flush_threshold_ratio() -> f64 {
    defaults::FLUSH_THRESHOLD_RATIO
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::CACHE_ENABLED,
            capacity_pages: default_cache_capacity(),
            policy: default_cache_policy(),
            flush_interval_ms: default_flush_interval_ms(),
            flush_threshold_ratio: default_flush_threshold_ratio(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                node_id: default_node_id(),
                blocks_dir: default_blocks_dir(),
                log_level: default_log_level(),
            },
            network: NetworkConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("Failed to read config file: {}", e)))?;

        let config: ServerConfig = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self).map_err(|e| {
            ConfigError::SerializeError(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, contents)
            .map_err(|e| ConfigError::WriteError(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Address the RPC server binds
    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.network.listen_port)
    }

    /// Parsed eviction policy
    pub fn cache_policy(&self) -> Result<PolicyKind, ConfigError> {
        self.cache
            .policy
            .parse::<PolicyKind>()
            .map_err(ConfigError::ValidationError)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.node_id.is_empty() {
            return Err(ConfigError::ValidationError(
                "Node ID cannot be empty".to_string(),
            ));
        }

        match self.node.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}",
                    other
                )));
            }
        }

        self.cache_policy()?;

        if self.cache.enabled {
            if self.cache.capacity_pages == 0 {
                return Err(ConfigError::ValidationError(
                    "Cache capacity must be non-zero when the cache is enabled".to_string(),
                ));
            }
            if self.cache.flush_interval_ms == 0 {
                return Err(ConfigError::ValidationError(
                    "Flush interval must be non-zero".to_string(),
                ));
            }
            if !(self.cache.flush_threshold_ratio > 0.0 && self.cache.flush_threshold_ratio <= 1.0)
            {
                return Err(ConfigError::ValidationError(
                    "Flush threshold ratio must be in (0, 1]".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),

    #[error("Failed to write config: {0}")]
    WriteError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
