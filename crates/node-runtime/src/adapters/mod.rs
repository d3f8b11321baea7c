//! # Adapter Implementations
//!
//! Concrete implementations of the sync engine's outbound ports that are not
//! part of `canon-sync` itself.

pub mod offline;

pub use offline::{OfflineMetricsTransport, OfflineNode};
