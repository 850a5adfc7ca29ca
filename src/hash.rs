//! Bit position derivation.
//!
//! Every item is hashed once with MurmurHash3 (x64, 128-bit, seed 0). The low
//! and high halves of the digest become the two base hashes of the
//! Kirsch-Mitzenmacher scheme:
//!
//! ```text
//! index_i = (h1 + i * h2) mod m      for i in 0..k
//! ```
//!
//! using wrapping 64-bit arithmetic. The positions decide which stored bits
//! an item owns, so this family is part of the stored format: every process
//! sharing a filter must derive positions the same way.

use std::io::Cursor;

/// Identifier of the hash family in use.
pub const HASH_FAMILY: &str = "murmur3-x64-128/seed0/kirsch-mitzenmacher";

const HASH_SEED: u32 = 0;

/// Returns the two 64-bit base hashes `(h1, h2)` of `item`.
pub fn base_hashes(item: &[u8]) -> (u64, u64) {
    let mut cursor = Cursor::new(item);
    // Reading from an in-memory slice cannot fail.
    let digest = murmur3::murmur3_x64_128(&mut cursor, HASH_SEED).unwrap_or(0);
    (digest as u64, (digest >> 64) as u64)
}

/// Computes the `hash_count` bit positions of `item` in `[0, bit_count)`.
///
/// Positions may repeat; probing the same bit twice is harmless.
///
/// # Example
/// ```
/// use redbloom::hash::indices;
///
/// let positions = indices(b"hello", 47_926, 3);
/// assert_eq!(positions.len(), 3);
/// assert!(positions.iter().all(|&p| p < 47_926));
/// assert_eq!(positions, indices(b"hello", 47_926, 3));
/// ```
pub fn indices(item: &[u8], bit_count: u64, hash_count: u32) -> Vec<u64> {
    debug_assert!(bit_count > 0);

    let (h1, h2) = base_hashes(item);
    (0..hash_count as u64)
        .map(|i| h1.wrapping_add(i.wrapping_mul(h2)) % bit_count)
        .collect()
}
