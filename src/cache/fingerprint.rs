//! 64-bit fingerprinting of cache keys.
//!
//! The reference implementation hashes keys with `xxhash`. This crate uses
//! `xxhash-rust`'s xxh3 variant: both are stable, non-cryptographic 64-bit
//! hashes, and `spec.md` only requires the hash be fixed once chosen.

use xxhash_rust::xxh3::xxh3_64;

/// Compute the 64-bit fingerprint of a byte-string key.
///
/// A fingerprint of `0` is reserved to mean "empty slot" (see
/// [`crate::cache::Shard`]); a genuine key hashing to zero is silently
/// indistinguishable from an empty slot. This is an accepted, bounded
/// false-negative with probability `2^-64`.
pub fn fingerprint(key: &[u8]) -> u64 {
    xxh3_64(key)
}
