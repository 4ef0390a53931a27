//! 32-byte hash value used for transaction ids, merkle nodes, and block
//! header hashes.

use sha2::{Digest, Sha256};

/// A 32-byte hash.
///
/// Header hashes are compared against targets as little-endian integers,
/// matching the byte order produced by the proof-of-work check.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    /// Double SHA-256 of `data`.
    pub fn double_sha256(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        Self(second.into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Compare to another hash as little-endian integers.
    ///
    /// Used for target checks: a header hash meets a target when
    /// `hash <= target`.
    pub fn le_cmp(&self, other: &Hash32) -> std::cmp::Ordering {
        for i in (0..32).rev() {
            match self.0[i].cmp(&other.0[i]) {
                std::cmp::Ordering::Equal => continue,
                ord => return ord,
            }
        }
        std::cmp::Ordering::Equal
    }

    /// True when this hash, read as a little-endian integer, is at or below
    /// `target`.
    pub fn meets_target(&self, target: &Hash32) -> bool {
        self.le_cmp(target) != std::cmp::Ordering::Greater
    }
}

impl std::fmt::Display for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash32 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_sha256_known_vector() {
        // sha256d("") = 5df6e0e2...
        let h = Hash32::double_sha256(b"");
        assert_eq!(
            h.to_string(),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn test_le_cmp_orders_by_most_significant_byte() {
        let mut low = [0u8; 32];
        let mut high = [0u8; 32];
        low[31] = 1;
        high[31] = 2;
        assert!(Hash32(low).meets_target(&Hash32(high)));
        assert!(!Hash32(high).meets_target(&Hash32(low)));
    }

    #[test]
    fn test_meets_target_is_inclusive() {
        let h = Hash32::double_sha256(b"x");
        assert!(h.meets_target(&h));
    }
}
