//! Consensus module - Block structure, difficulty and validation

mod block;
mod validation;
mod difficulty;

pub use block::*;
pub use validation::*;
pub use difficulty::*;
