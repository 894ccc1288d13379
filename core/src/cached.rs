//! Memoizing wrappers around the raw data model.
//! No direct counterpart by this name; grounded on `bond-core`'s own
//! `BlockHeader::hash()`/`Transaction::hash()` pattern of computing a hash
//! on demand, generalized here to compute it once at construction so a
//! `CachedBlock`/`CachedTransaction` can be shared by reference through
//! `push_block` and every lookup without re-hashing.

use crate::block::Block;
use crate::error::Result;
use crate::transaction::Transaction;
use shared::Hash256;

/// A decoded `Block` plus its id, computed once.
#[derive(Debug, Clone)]
pub struct CachedBlock {
    block: Block,
    id: Hash256,
}

impl CachedBlock {
    pub fn new(block: Block) -> Result<Self> {
        let id = block.id()?;
        Ok(Self { block, id })
    }

    #[must_use]
    pub fn block(&self) -> &Block {
        &self.block
    }

    #[must_use]
    pub fn id(&self) -> Hash256 {
        self.id
    }

    #[must_use]
    pub fn into_block(self) -> Block {
        self.block
    }
}

/// A decoded `Transaction` plus its prefix hash and full hash, computed
/// once. `blob_size` is the transaction's own canonical encoding length,
/// cached here since it feeds `currentBlockSize`/penalty computations on
/// every block that includes it.
#[derive(Debug, Clone)]
pub struct CachedTransaction {
    transaction: Transaction,
    prefix_hash: Hash256,
    hash: Hash256,
    blob_size: usize,
}

impl CachedTransaction {
    #[must_use]
    pub fn new(transaction: Transaction) -> Self {
        let prefix_hash = transaction.prefix_hash();
        let blob = transaction.encode_to_vec();
        let hash = Hash256::fast_hash(&blob);
        let blob_size = blob.len();
        Self {
            transaction,
            prefix_hash,
            hash,
            blob_size,
        }
    }

    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    #[must_use]
    pub fn prefix_hash(&self) -> Hash256 {
        self.prefix_hash
    }

    #[must_use]
    pub fn hash(&self) -> Hash256 {
        self.hash
    }

    #[must_use]
    pub fn blob_size(&self) -> usize {
        self.blob_size
    }

    #[must_use]
    pub fn into_transaction(self) -> Transaction {
        self.transaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockHeader, BLOCK_MAJOR_VERSION_1};
    use crate::transaction::{TxInput, TxOutput, TxOutputTarget};
    use shared::PublicKey;

    fn sample_transaction() -> Transaction {
        Transaction {
            version: 1,
            unlock_time: 0,
            inputs: vec![TxInput::Base { height: 0 }],
            outputs: vec![TxOutput {
                amount: 1000,
                target: TxOutputTarget::Key {
                    key: PublicKey::from_bytes([2u8; 32]),
                },
            }],
            extra: Vec::new(),
            signatures: vec![Vec::new()],
        }
    }

    #[test]
    fn cached_transaction_hash_matches_uncached_hash() {
        let tx = sample_transaction();
        let expected = tx.hash();
        let cached = CachedTransaction::new(tx);
        assert_eq!(cached.hash(), expected);
    }

    #[test]
    fn cached_block_id_matches_uncached_id() {
        let block = Block {
            header: BlockHeader {
                major_version: BLOCK_MAJOR_VERSION_1,
                minor_version: 0,
                timestamp: 1,
                previous_block_hash: Hash256::zero(),
                nonce: 0,
            },
            parent_block: None,
            base_transaction: sample_transaction(),
            transaction_hashes: Vec::new(),
        };
        let expected = block.id().unwrap();
        let cached = CachedBlock::new(block).unwrap();
        assert_eq!(cached.id(), expected);
    }
}
