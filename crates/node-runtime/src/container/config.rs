//! # Node Configuration
//!
//! Runtime configuration: the sync engine's knobs plus the node's identity
//! and genesis.
//!
//! ## Loading Order
//!
//! 1. Defaults
//! 2. TOML file named by `CANON_CONFIG`, if set
//! 3. Environment overrides (`CANON_MIN_PEERS`, `CANON_FORK_PROTECTION`, ...)

use std::path::Path;

use canon_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use shared_types::{ChainTypeError, PeerId};
use thiserror::Error;
use tracing::{info, warn};

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Chain selection engine.
    pub sync: SyncConfig,
    /// Node identity.
    pub network: NetworkConfig,
    /// Local chain storage.
    pub storage: StorageConfig,
}

impl NodeConfig {
    /// Read a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    /// Parse a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        override_parsed(&lookup, "CANON_MIN_PEERS", &mut self.sync.min_connected_peers);
        override_parsed(&lookup, "CANON_FORK_PROTECTION", &mut self.sync.fork_protection);
        override_parsed(&lookup, "CANON_FAST_SYNC", &mut self.sync.fast_sync_enabled);
        override_parsed(&lookup, "CANON_BATCH_SIZE", &mut self.sync.fetch_batch_size);
        override_parsed(&lookup, "CANON_AUDIT_INTERVAL", &mut self.sync.audit_interval);
        override_parsed(&lookup, "CANON_CYCLE_INTERVAL_MS", &mut self.sync.cycle_interval_ms);
        override_parsed(
            &lookup,
            "CANON_METRICS_REFRESH_SECS",
            &mut self.sync.metrics_refresh_interval_secs,
        );
        if let Some(name) = lookup("CANON_NODE_NAME") {
            self.network.node_name = name;
        }
        if let Some(id) = lookup("CANON_PEER_ID") {
            self.network.local_peer_id = id;
        }
        if let Some(seed) = lookup("CANON_GENESIS_SEED") {
            self.storage.genesis_seed = seed;
        }
    }

    /// Check every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sync
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.network.peer_id()?;
        if self.storage.genesis_seed.is_empty() {
            return Err(ConfigError::Invalid("genesis_seed must not be empty".into()));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Config file is not valid TOML for `NodeConfig`.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// Peer id is not 32 hex-encoded bytes.
    #[error("invalid local peer id: {0}")]
    InvalidPeerId(#[from] ChainTypeError),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Node identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Name announced to peers on registration.
    pub node_name: String,
    /// Our peer id, 64 hex chars.
    pub local_peer_id: String,
}

impl NetworkConfig {
    /// Decode `local_peer_id`.
    pub fn peer_id(&self) -> Result<PeerId, ConfigError> {
        PeerId::from_hex(&self.local_peer_id).map_err(ConfigError::InvalidPeerId)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            node_name: "canon-node".to_string(),
            local_peer_id: PeerId([1u8; 32]).to_string(),
        }
    }
}

/// Local chain storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Seed the genesis block is derived from. Nodes must agree on it.
    pub genesis_seed: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            genesis_seed: "canon-genesis".to_string(),
        }
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(_) => warn!("[runtime] Ignoring {}={:?}: not a valid value", key, raw),
        }
    }
}

/// Load configuration from `CANON_CONFIG` and the environment.
pub fn load_config() -> Result<NodeConfig, ConfigError> {
    let mut config = match std::env::var("CANON_CONFIG") {
        Ok(path) => {
            info!("[runtime] Loading config from {}", path);
            NodeConfig::from_file(Path::new(&path))?
        }
        Err(_) => NodeConfig::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
