//! # Error Types
//!
//! Defines error types used across crates.

use crate::entities::BlockHeight;
use thiserror::Error;

/// Errors raised by the local block store / header index.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// No block recorded at this height.
    #[error("Block not found at height {0}")]
    NotFound(BlockHeight),

    /// A block could not be appended.
    #[error("Block rejected at height {height}: {reason}")]
    Rejected { height: BlockHeight, reason: String },

    /// Rollback target lies above the current tip.
    #[error("Cannot roll back to {target}: tip is {tip}")]
    RollbackAboveTip { target: BlockHeight, tip: BlockHeight },

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Errors parsing chain primitives.
#[derive(Debug, Clone, Error)]
pub enum ChainTypeError {
    /// Input was not valid hex.
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Digests and peer ids are exactly 32 bytes.
    #[error("Invalid length: {0} bytes, expected 32")]
    InvalidLength(usize),
}
