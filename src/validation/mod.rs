//! Transaction model and signature checks

mod transaction;

pub use transaction::*;
