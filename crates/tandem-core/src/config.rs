//! Configuration for the relay
//!
//! Supports a TOML configuration file with sensible defaults.
//! Configuration is loaded from:
//! - macOS: ~/Library/Application Support/tandem/config.toml
//! - Linux: ~/.config/tandem/config.toml
//! - Windows: %APPDATA%/tandem/config.toml
//!
//! Command-line flags and the `PORT` environment variable override file values.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::{DEFAULT_MAX_PUBLISHERS, DEFAULT_OUTBOUND_QUEUE, DEFAULT_PORT};

/// Relay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Listening port
    pub port: u16,
    /// Bind address
    pub bind: IpAddr,
    /// Publisher slots available at once
    pub max_publishers: usize,
    /// Capacity of each connection's outbound queue
    pub outbound_queue: usize,
    /// What to do when a connection's outbound queue is full
    pub slow_peer: SlowPeerPolicy,
    /// What to do with a publisher join when every slot is taken
    pub publisher_overflow: PublisherOverflow,
    /// Directory holding `stream.html` and `watch.html`
    pub public_dir: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            max_publishers: DEFAULT_MAX_PUBLISHERS,
            outbound_queue: DEFAULT_OUTBOUND_QUEUE,
            slow_peer: SlowPeerPolicy::default(),
            publisher_overflow: PublisherOverflow::default(),
            public_dir: PathBuf::from("public"),
        }
    }
}

/// Policy for a recipient whose outbound queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlowPeerPolicy {
    /// Discard the message and keep the connection
    #[default]
    Drop,
    /// Evict the connection as if it had closed
    Disconnect,
}

/// Policy for a publisher join that finds every publisher slot taken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublisherOverflow {
    /// Register it with the publisher role but without a slot; it only gets `joined`
    #[default]
    Ignore,
    /// Register it as a subscriber instead
    Downgrade,
    /// Refuse the join with an error message; the connection stays unjoined
    Reject,
}

impl FromStr for SlowPeerPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "disconnect" => Ok(Self::Disconnect),
            other => Err(format!("unknown slow peer policy: {other} (expected drop|disconnect)")),
        }
    }
}

impl fmt::Display for SlowPeerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Drop => "drop",
            Self::Disconnect => "disconnect",
        })
    }
}

impl FromStr for PublisherOverflow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "downgrade" => Ok(Self::Downgrade),
            "reject" => Ok(Self::Reject),
            other => Err(format!(
                "unknown publisher overflow policy: {other} (expected ignore|downgrade|reject)"
            )),
        }
    }
}

impl fmt::Display for PublisherOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ignore => "ignore",
            Self::Downgrade => "downgrade",
            Self::Reject => "reject",
        })
    }
}

impl RelayConfig {
    /// Load configuration from the default path
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Failed to load config from {:?}: {}, using defaults", path, e);
                Self::default()
            }),
            None => {
                debug!("No config directory found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: RelayConfig =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject values the relay cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_publishers == 0 {
            return Err(ConfigError::Invalid("max_publishers must be at least 1".into()));
        }
        if self.outbound_queue == 0 {
            return Err(ConfigError::Invalid("outbound_queue must be at least 1".into()));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "tandem", "tandem")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Render as TOML, in the same format `load_from` reads
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}
