//! Proof-of-work mining

mod miner;

pub use miner::*;
