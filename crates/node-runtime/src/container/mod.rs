//! # Node Container
//!
//! Configuration and the services built from it.

pub mod config;
pub mod subsystems;

pub use config::{load_config, ConfigError, NetworkConfig, NodeConfig, StorageConfig};
pub use subsystems::NodeContainer;
