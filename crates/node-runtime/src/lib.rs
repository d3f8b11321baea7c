//! # Node Runtime Library
//!
//! Configuration, container and runtime for the Canon node. The binary in
//! `main.rs` is a thin wrapper around [`NodeRuntime`].
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (file, then environment)
//! 2. Install telemetry
//! 3. Build the container (store, registry, engine)
//! 4. Start the engine
//! 5. Wait for Ctrl-C, then shut down

#![warn(missing_docs)]

pub mod adapters;
pub mod container;
pub mod runtime;

pub use container::{load_config, ConfigError, NodeConfig, NodeContainer};
pub use runtime::NodeRuntime;
