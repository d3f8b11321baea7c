//! # Shared Types Crate
//!
//! Chain primitives used across the Canon node crates.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every crate that compares digests or heights
//!   uses the types defined here, so the fork-choice ordering is the same
//!   everywhere.
//! - **Opaque blocks**: block bytes are carried as [`RawBlock`]; decoding and
//!   hashing belong to the storage collaborator, not to this crate.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
