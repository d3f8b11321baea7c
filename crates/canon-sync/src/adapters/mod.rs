//! # Adapters Layer (Hexagonal Architecture)
//!
//! Reference implementations of outbound ports, used by the runtime's
//! standalone mode and by tests.

mod memory_store;
mod static_registry;

pub use memory_store::{InMemoryBlockStore, LinkedBlock};
pub use static_registry::StaticPeerRegistry;
