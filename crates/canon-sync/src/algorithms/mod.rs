//! # Algorithms Module
//!
//! Peer-voting election and the fork-choice rule.

pub mod fork_choice;
pub mod voting;

pub use fork_choice::{has_better_chain, is_identical_chain};
pub use voting::{ElectionResult, Voter, Voting};
