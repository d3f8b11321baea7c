//! # Application Module
//!
//! Services orchestrating the domain and outbound ports: the roster refresh,
//! the state machine and the engine that runs both.

pub mod context;
pub mod engine;
pub mod machine;
pub mod metrics_voting;

pub use context::SyncContext;
pub use engine::{SyncCollaborators, SyncEngine};
pub use machine::{Flow, Machine, Transition};
pub use metrics_voting::MetricsPeersVoting;
