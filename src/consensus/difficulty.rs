//! Difficulty as a count of required leading zero bits
//!
//! A hash meets difficulty `d` when its first `d` bits (big-endian) are zero,
//! i.e. when it is numerically below `2^(256 - d)`.

use crate::crypto::Hash;

/// Upper bound: every bit of a 32-byte hash
pub const MAX_DIFFICULTY_BITS: u32 = 256;

/// Check a hash against a difficulty
pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
    hash.leading_zero_bits() >= difficulty
}

/// Expected number of hash attempts to meet `difficulty`: `2^difficulty`
///
/// Saturates at `u128::MAX`.
pub fn expected_attempts(difficulty: u32) -> u128 {
    if difficulty >= 128 {
        u128::MAX
    } else {
        1u128 << difficulty
    }
}

/// Work contributed by one block at this difficulty
pub fn calculate_work(difficulty: u32) -> u128 {
    expected_attempts(difficulty)
}
