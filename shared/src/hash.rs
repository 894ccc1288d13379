use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

/// Opaque 256-bit value used for block hashes, transaction hashes, payment
/// ids, public keys, key images, secret keys — anywhere the wire format
/// calls for a fixed 32-byte field. Ordered lexicographically by its bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The Keccak-family digest used for transaction hashes, block prefix
    /// hashes, and generic object hashes.
    #[must_use]
    pub fn fast_hash(data: &[u8]) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(data);
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        Self(hash)
    }

    /// Tries to build a `Hash256` from a variable-length byte slice.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 32 {
            return None;
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(bytes);
        Some(Self(hash))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", hex::encode(self.0))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Binary merkle tree hash used for a block's transactions merkle root and
/// for merge-mining auxiliary branches.
///
/// Mirrors the CryptoNote convention: 0 leaves hashes to zero, 1 leaf hashes
/// to itself, and an odd leaf count duplicates the last hash up a level
/// rather than rounding the tree shape some other way.
#[must_use]
pub fn tree_hash(leaves: &[Hash256]) -> Hash256 {
    match leaves.len() {
        0 => Hash256::zero(),
        1 => leaves[0],
        2 => {
            let mut buf = [0u8; 64];
            buf[..32].copy_from_slice(leaves[0].as_bytes());
            buf[32..].copy_from_slice(leaves[1].as_bytes());
            Hash256::fast_hash(&buf)
        }
        count => {
            let mut level: Vec<Hash256> = leaves.to_vec();
            // Largest power of two <= count.
            let mut pow2 = 1usize;
            while pow2 * 2 <= count {
                pow2 *= 2;
            }
            // Fold the overhanging pairs first so the remaining level is a
            // power of two, then hash pairwise up to the root.
            let overhang = count - pow2;
            let mut folded = Vec::with_capacity(pow2);
            for i in 0..overhang {
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(level[2 * i].as_bytes());
                buf[32..].copy_from_slice(level[2 * i + 1].as_bytes());
                folded.push(Hash256::fast_hash(&buf));
            }
            folded.extend_from_slice(&level[2 * overhang..]);
            level = folded;
            while level.len() > 1 {
                let mut next = Vec::with_capacity(level.len() / 2);
                for pair in level.chunks(2) {
                    let mut buf = [0u8; 64];
                    buf[..32].copy_from_slice(pair[0].as_bytes());
                    buf[32..].copy_from_slice(pair[1].as_bytes());
                    next.push(Hash256::fast_hash(&buf));
                }
                level = next;
            }
            level[0]
        }
    }
}

/// Returns the merkle branch (sibling hashes bottom-up) needed to recompute
/// `tree_hash(leaves)` from `leaves[index]` alone. Used for merge-mining
/// auxiliary proofs.
#[must_use]
pub fn tree_branch_from_index(leaves: &[Hash256], index: usize) -> Vec<Hash256> {
    if leaves.len() <= 1 {
        return Vec::new();
    }
    let mut level: Vec<Hash256> = leaves.to_vec();
    let mut idx = index;
    let mut branch = Vec::new();

    let count = level.len();
    let mut pow2 = 1usize;
    while pow2 * 2 <= count {
        pow2 *= 2;
    }
    let overhang = count - pow2;
    if idx < 2 * overhang {
        let sibling = idx ^ 1;
        branch.push(level[sibling]);
        idx /= 2;
    } else {
        idx -= overhang;
    }
    let mut folded = Vec::with_capacity(pow2);
    for i in 0..overhang {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(level[2 * i].as_bytes());
        buf[32..].copy_from_slice(level[2 * i + 1].as_bytes());
        folded.push(Hash256::fast_hash(&buf));
    }
    folded.extend_from_slice(&level[2 * overhang..]);
    level = folded;

    while level.len() > 1 {
        let sibling = idx ^ 1;
        branch.push(level[sibling]);
        idx /= 2;
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let mut buf = [0u8; 64];
            buf[..32].copy_from_slice(pair[0].as_bytes());
            buf[32..].copy_from_slice(pair[1].as_bytes());
            next.push(Hash256::fast_hash(&buf));
        }
        level = next;
    }
    branch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hash_displays_as_64_zero_hex_chars() {
        let hash = Hash256::zero();
        assert_eq!(
            hash.to_string(),
            "0000000000000000000000000000000000000000000000000000000000000000"
                .chars()
                .take(64)
                .collect::<String>()
        );
    }

    #[test]
    fn fast_hash_is_deterministic_and_nonzero() {
        let a = Hash256::fast_hash(b"hello world");
        let b = Hash256::fast_hash(b"hello world");
        assert_eq!(a, b);
        assert_ne!(a, Hash256::zero());
    }

    #[test]
    fn tree_hash_single_leaf_is_identity() {
        let leaf = Hash256::fast_hash(b"leaf");
        assert_eq!(tree_hash(&[leaf]), leaf);
    }

    #[test]
    fn tree_hash_two_leaves_matches_manual_fold() {
        let a = Hash256::fast_hash(b"a");
        let b = Hash256::fast_hash(b"b");
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(a.as_bytes());
        buf[32..].copy_from_slice(b.as_bytes());
        assert_eq!(tree_hash(&[a, b]), Hash256::fast_hash(&buf));
    }

    #[test]
    fn tree_hash_empty_is_zero() {
        assert_eq!(tree_hash(&[]), Hash256::zero());
    }

    #[test]
    fn ordering_is_lexicographic_byte_order() {
        let low = Hash256::from_bytes([0u8; 32]);
        let mut high_bytes = [0u8; 32];
        high_bytes[0] = 1;
        let high = Hash256::from_bytes(high_bytes);
        assert!(low < high);
    }
}
