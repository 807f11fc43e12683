//! Node-level pieces: genesis and the persisted chain

mod genesis;
mod chain;

pub use genesis::*;
pub use chain::*;
