//! # Domain Module
//!
//! Core domain types for chain selection and synchronization.

pub mod entities;
pub mod errors;
pub mod invariants;

pub use entities::*;
pub use errors::*;
pub use invariants::*;
