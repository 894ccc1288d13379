//! Append-log raw block storage: `RawBlock` plus a container
//! offering `push_back`/`pop_back`/`get`/`split(n)`/`len`. Grounded on
//! `bond-core`'s `Vec`-backed `Blockchain.blocks` field
//! (`bond-core/src/blockchain.rs`) as "the one type that owns the append
//! log," generalized to the opaque-blob, `split`-capable contract
//! this model specifies. The on-disk file format is explicitly out of
//! scope; this backs the contract with an in-memory `Vec`, matching
//! "the implementation may back this with a file-mapped vector, but the
//! contract is purely sequential."

/// An opaque raw block blob plus the raw bytes of each transaction in its
/// body, exactly as received off the wire or read back from disk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawBlock {
    pub block_bytes: Vec<u8>,
    pub transactions_bytes: Vec<Vec<u8>>,
}

/// Sequential container over [`RawBlock`]s for one segment's own height
/// range. `split` hands the upper half to a fresh instance without
/// rebuilding the lower half (the per-index move algorithm
/// delegates here for the raw-block slice).
#[derive(Debug, Clone, Default)]
pub struct RawBlockStorage {
    blocks: Vec<RawBlock>,
}

impl RawBlockStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, block: RawBlock) {
        self.blocks.push(block);
    }

    pub fn pop_back(&mut self) -> Option<RawBlock> {
        self.blocks.pop()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&RawBlock> {
        self.blocks.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns a new container holding elements `[n, end)` and truncates
    /// `self` to `[0, n)`.
    ///
    /// # Panics
    ///
    /// Panics if `n > self.len()`.
    #[must_use]
    pub fn split(&mut self, n: usize) -> Self {
        assert!(n <= self.blocks.len(), "split index out of range");
        let upper = self.blocks.split_off(n);
        Self { blocks: upper }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(tag: u8) -> RawBlock {
        RawBlock {
            block_bytes: vec![tag],
            transactions_bytes: vec![vec![tag, tag]],
        }
    }

    #[test]
    fn push_and_get_preserve_order() {
        let mut storage = RawBlockStorage::new();
        storage.push_back(block(1));
        storage.push_back(block(2));
        assert_eq!(storage.get(0), Some(&block(1)));
        assert_eq!(storage.get(1), Some(&block(2)));
        assert_eq!(storage.len(), 2);
    }

    #[test]
    fn pop_back_removes_the_last_element() {
        let mut storage = RawBlockStorage::new();
        storage.push_back(block(1));
        storage.push_back(block(2));
        assert_eq!(storage.pop_back(), Some(block(2)));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn split_moves_upper_half_and_truncates_lower() {
        let mut storage = RawBlockStorage::new();
        for i in 0..5u8 {
            storage.push_back(block(i));
        }
        let upper = storage.split(3);
        assert_eq!(storage.len(), 3);
        assert_eq!(upper.len(), 2);
        assert_eq!(storage.get(2), Some(&block(2)));
        assert_eq!(upper.get(0), Some(&block(3)));
    }
}
