//! Block header and merge-mining data model. Rewritten from `bond-core`'s
//! `BlockHeader`/`Block` (which carried a `chrono` timestamp, a simple
//! Bitcoin-style difficulty/nonce pair, and hashed via `serde_json`);
//! this model instead carries a `majorVersion`/`minorVersion` pair, the
//! CryptoNote merge-mining `ParentBlock` subtree required for major
//! versions 2 and 3, and hashes via the canonical encoding rather than
//! JSON, grounded on `cryptonote_core/cryptonote_basic.h`'s
//! `BlockHeader`/`Block`/`ParentBlock` and
//! `CryptoNoteSerialization.cpp`'s hashing-mode substitution of
//! `parentBlock.minerTxBranch` with a computed merkle root.

use crate::encoding::{
    read_bytes_prefixed, write_bytes, CanonicalDecode, CanonicalEncode, Cursor, MAX_ARRAY_LEN,
};
use crate::error::{Error, Result};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use shared::hash::{tree_branch_from_index, tree_hash};
use shared::Hash256;

pub const BLOCK_MAJOR_VERSION_1: u8 = 1;
pub const BLOCK_MAJOR_VERSION_2: u8 = 2;
pub const BLOCK_MAJOR_VERSION_3: u8 = 3;
pub const CURRENT_BLOCK_MAJOR_VERSION: u8 = BLOCK_MAJOR_VERSION_3;

/// Merge-mining auxiliary data required when `majorVersion >= 2`: the
/// parent chain's own header plus the branch proving this block's miner
/// transaction is referenced by the parent's merge-mining tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentBlock {
    pub major_version: u8,
    pub minor_version: u8,
    pub timestamp: u64,
    pub prev_id: Hash256,
    pub nonce: u32,
    pub miner_tx_branch: Vec<Hash256>,
    pub miner_tx: Transaction,
    pub blockchain_branch: Vec<Hash256>,
}

impl ParentBlock {
    /// The merkle root substituted for `minerTxBranch` in hashing-mode
    /// encoding: the parentBlock subtree substitutes a merkle
    /// root for `minerTxBranch`.
    #[must_use]
    pub fn miner_tx_merkle_root(&self) -> Hash256 {
        let miner_tx_hash = self.miner_tx.hash();
        if self.miner_tx_branch.is_empty() {
            return miner_tx_hash;
        }
        tree_root_from_branch(&self.miner_tx_branch, miner_tx_hash)
    }

    fn encode_hashing(&self, out: &mut Vec<u8>) -> Result<()> {
        if self.miner_tx_branch.len() > 256 {
            return Err(Error::MerkleBranchTooDeep);
        }
        shared::varint::write_u32(out, u32::from(self.major_version));
        shared::varint::write_u32(out, u32::from(self.minor_version));
        shared::varint::write_u64(out, self.timestamp);
        out.extend_from_slice(self.prev_id.as_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
        out.extend_from_slice(self.miner_tx_merkle_root().as_bytes());
        shared::varint::write_usize(out, 1);
        self.miner_tx.encode(out);
        crate::encoding::write_array(out, &self.blockchain_branch);
        Ok(())
    }
}

/// Combines a leaf hash with a branch the same way `tree_hash_from_branch`
/// does in the original: fold the branch bottom-up, each step hashing the
/// running value together with the next branch element.
fn tree_root_from_branch(branch: &[Hash256], leaf: Hash256) -> Hash256 {
    let mut running = leaf;
    for sibling in branch {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(running.as_bytes());
        buf.extend_from_slice(sibling.as_bytes());
        running = Hash256::fast_hash(&buf);
    }
    running
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub major_version: u8,
    pub minor_version: u8,
    pub timestamp: u64,
    pub previous_block_hash: Hash256,
    pub nonce: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    /// Present iff `header.major_version >= BLOCK_MAJOR_VERSION_2`.
    pub parent_block: Option<ParentBlock>,
    pub base_transaction: Transaction,
    pub transaction_hashes: Vec<Hash256>,
}

impl Block {
    /// Encodes the header-plus-merge-mining portion the way
    /// `checkProofOfWork`'s slow-hash input is built: this is
    /// distinct from `block_id`, which additionally mixes in the
    /// transactions merkle root.
    pub fn encode_pow_blob(&self, out: &mut Vec<u8>) -> Result<()> {
        match &self.parent_block {
            None => {
                if self.header.major_version >= BLOCK_MAJOR_VERSION_2 {
                    return Err(Error::WrongMergeMiningTag);
                }
                shared::varint::write_u32(out, u32::from(self.header.major_version));
                shared::varint::write_u32(out, u32::from(self.header.minor_version));
                shared::varint::write_u64(out, self.header.timestamp);
                out.extend_from_slice(self.header.previous_block_hash.as_bytes());
                out.extend_from_slice(&self.header.nonce.to_le_bytes());
            }
            Some(parent) => {
                if self.header.major_version < BLOCK_MAJOR_VERSION_2 {
                    return Err(Error::WrongVersion(self.header.major_version));
                }
                if self.header.major_version > CURRENT_BLOCK_MAJOR_VERSION {
                    return Err(Error::WrongVersion(self.header.major_version));
                }
                shared::varint::write_u32(out, u32::from(self.header.major_version));
                shared::varint::write_u32(out, u32::from(self.header.minor_version));
                shared::varint::write_u64(out, self.header.timestamp);
                out.extend_from_slice(self.header.previous_block_hash.as_bytes());
                parent.encode_hashing(out)?;
            }
        }
        Ok(())
    }

    fn transactions_merkle_root(&self) -> Hash256 {
        let mut leaves = Vec::with_capacity(self.transaction_hashes.len() + 1);
        leaves.push(self.base_transaction.hash());
        leaves.extend_from_slice(&self.transaction_hashes);
        tree_hash(&leaves)
    }

    /// The block id: a hash derived from the canonical header encoding,
    /// with the transactions merkle root mixed in, plus, for v≥2, the
    /// parent-block-derived auxiliary hash.
    pub fn id(&self) -> Result<Hash256> {
        let mut buf = Vec::new();
        self.encode_pow_blob(&mut buf)?;
        buf.extend_from_slice(self.transactions_merkle_root().as_bytes());
        shared::varint::write_usize(&mut buf, self.transaction_hashes.len() + 1);
        Ok(Hash256::fast_hash(&buf))
    }

    /// Proof-of-work input: for `majorVersion == 1` this is `id()`'s
    /// preimage; for `majorVersion >= 2` it is the parent block's own
    /// hashing-mode encoding, since merge-mined PoW is solved on the
    /// auxiliary (parent) chain header.
    pub fn proof_of_work_blob(&self) -> Result<Vec<u8>> {
        match &self.parent_block {
            None => {
                let mut buf = Vec::new();
                self.encode_pow_blob(&mut buf)?;
                buf.extend_from_slice(self.transactions_merkle_root().as_bytes());
                shared::varint::write_usize(&mut buf, self.transaction_hashes.len() + 1);
                Ok(buf)
            }
            Some(parent) => {
                let mut buf = Vec::new();
                parent.encode_hashing(&mut buf)?;
                Ok(buf)
            }
        }
    }

    #[must_use]
    pub fn transaction_branch(&self, index: usize) -> Vec<Hash256> {
        let mut leaves = Vec::with_capacity(self.transaction_hashes.len() + 1);
        leaves.push(self.base_transaction.hash());
        leaves.extend_from_slice(&self.transaction_hashes);
        tree_branch_from_index(&leaves, index)
    }

    /// This chain's own header identity, independent of any merge-mining
    /// wrapper: the hash a `majorVersion == 1` block's `id()` would produce,
    /// computed from this block's own header and transactions regardless of
    /// whether `parent_block` is set. This is the leaf a merge-mining
    /// `blockchain_branch` proves membership for — it cannot be `id()`
    /// itself, since for `majorVersion >= 2` that id already folds in the
    /// parent's miner transaction, which is what carries the tag committing
    /// to this very hash.
    pub(crate) fn auxiliary_header_hash(&self) -> Hash256 {
        let mut buf = Vec::new();
        shared::varint::write_u32(&mut buf, u32::from(self.header.major_version));
        shared::varint::write_u32(&mut buf, u32::from(self.header.minor_version));
        shared::varint::write_u64(&mut buf, self.header.timestamp);
        buf.extend_from_slice(self.header.previous_block_hash.as_bytes());
        buf.extend_from_slice(&self.header.nonce.to_le_bytes());
        buf.extend_from_slice(self.transactions_merkle_root().as_bytes());
        shared::varint::write_usize(&mut buf, self.transaction_hashes.len() + 1);
        Hash256::fast_hash(&buf)
    }

    /// Checks that a `majorVersion >= 2` block is actually reachable through
    /// the merge-mining tag it claims to be mined under: the parent's miner
    /// transaction must carry a merge-mining tag, `blockchain_branch` must
    /// fold this block's own [`Self::auxiliary_header_hash`] up to that
    /// tag's `merkleRoot`, and the claimed depth must match the branch
    /// actually supplied. A `majorVersion == 1` block has no merge-mining
    /// data to check and always passes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongMergeMiningTag`] if the parent's miner
    /// transaction carries no merge-mining tag, the claimed depth does not
    /// match `blockchain_branch`'s length, or folding `blockchain_branch`
    /// over this block's auxiliary header hash does not reach the tag's
    /// `merkleRoot`.
    pub fn verify_merge_mining(&self) -> Result<()> {
        let Some(parent) = &self.parent_block else {
            return Ok(());
        };
        let (depth, merkle_root) = extract_merge_mining_tag(&parent.miner_tx)
            .ok_or(Error::WrongMergeMiningTag)?;
        if depth != parent.blockchain_branch.len() {
            return Err(Error::WrongMergeMiningTag);
        }
        let reached_root = tree_root_from_branch(&parent.blockchain_branch, self.auxiliary_header_hash());
        if reached_root != merkle_root {
            return Err(Error::WrongMergeMiningTag);
        }
        Ok(())
    }
}

impl CanonicalEncode for Block {
    fn encode(&self, out: &mut Vec<u8>) {
        shared::varint::write_u32(out, u32::from(self.header.major_version));
        shared::varint::write_u32(out, u32::from(self.header.minor_version));
        shared::varint::write_u64(out, self.header.timestamp);
        out.extend_from_slice(self.header.previous_block_hash.as_bytes());
        out.extend_from_slice(&self.header.nonce.to_le_bytes());

        if let Some(parent) = &self.parent_block {
            shared::varint::write_u32(out, u32::from(parent.major_version));
            shared::varint::write_u32(out, u32::from(parent.minor_version));
            shared::varint::write_u64(out, parent.timestamp);
            out.extend_from_slice(parent.prev_id.as_bytes());
            out.extend_from_slice(&parent.nonce.to_le_bytes());
            shared::varint::write_usize(out, 1);
            parent.miner_tx.encode(out);
            crate::encoding::write_array(out, &parent.miner_tx_branch);
            crate::encoding::write_array(out, &parent.blockchain_branch);
        }

        self.base_transaction.encode(out);
        crate::encoding::write_array(out, &self.transaction_hashes);
    }
}

impl CanonicalDecode for Block {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self> {
        let major_version = u8::try_from(cursor.read_varint_u32()?).map_err(|_| {
            Error::WrongVersion(u8::MAX)
        })?;
        let minor_version = u8::try_from(cursor.read_varint_u32()?).map_err(|_| {
            Error::WrongVersion(u8::MAX)
        })?;
        let timestamp = cursor.read_varint_u64()?;
        let previous_block_hash = cursor.read_hash()?;
        let nonce = cursor.read_u32_fixed()?;

        let header = BlockHeader {
            major_version,
            minor_version,
            timestamp,
            previous_block_hash,
            nonce,
        };

        let parent_block = if major_version >= BLOCK_MAJOR_VERSION_2 {
            if major_version > CURRENT_BLOCK_MAJOR_VERSION {
                return Err(Error::WrongVersion(major_version));
            }
            let parent_major_version = u8::try_from(cursor.read_varint_u32()?)
                .map_err(|_| Error::WrongVersion(u8::MAX))?;
            let parent_minor_version = u8::try_from(cursor.read_varint_u32()?)
                .map_err(|_| Error::WrongVersion(u8::MAX))?;
            let parent_timestamp = cursor.read_varint_u64()?;
            let prev_id = cursor.read_hash()?;
            let parent_nonce = cursor.read_u32_fixed()?;
            let number_of_transactions = cursor.read_varint_usize()?;
            if number_of_transactions < 1 {
                return Err(Error::WrongMergeMiningTag);
            }
            let miner_tx = Transaction::decode(cursor)?;
            let miner_tx_branch: Vec<Hash256> = crate::encoding::read_array(cursor, MAX_ARRAY_LEN)?;
            if miner_tx_branch.len() > 256 {
                return Err(Error::MerkleBranchTooDeep);
            }
            let blockchain_branch: Vec<Hash256> =
                crate::encoding::read_array(cursor, MAX_ARRAY_LEN)?;

            Some(ParentBlock {
                major_version: parent_major_version,
                minor_version: parent_minor_version,
                timestamp: parent_timestamp,
                prev_id,
                nonce: parent_nonce,
                miner_tx_branch,
                miner_tx,
                blockchain_branch,
            })
        } else {
            None
        };

        let base_transaction = Transaction::decode(cursor)?;
        let transaction_hashes: Vec<Hash256> = crate::encoding::read_array(cursor, MAX_ARRAY_LEN)?;

        Ok(Self {
            header,
            parent_block,
            base_transaction,
            transaction_hashes,
        })
    }
}

/// Extracts this block's merge-mining tag from its base transaction's
/// `extra` field, if present, as `(depth, merkleRoot)`, grounded on
/// `tx_extra.h`'s `tx_extra_merge_mining_tag`.
#[must_use]
pub fn extract_merge_mining_tag(base_transaction: &Transaction) -> Option<(usize, Hash256)> {
    let mut cursor = Cursor::new(&base_transaction.extra);
    while cursor.remaining() > 0 {
        let tag = cursor.read_u8().ok()?;
        match tag {
            crate::transaction::TX_EXTRA_TAG_PUBKEY => {
                cursor.read_bytes(32).ok()?;
            }
            crate::transaction::TX_EXTRA_TAG_PADDING => loop {
                if cursor.remaining() == 0 {
                    break;
                }
                match cursor.read_u8() {
                    Ok(0) => continue,
                    _ => break,
                }
            },
            crate::transaction::TX_EXTRA_TAG_NONCE => {
                read_bytes_prefixed(&mut cursor).ok()?;
            }
            crate::transaction::TX_EXTRA_TAG_MERGE_MINING => {
                let payload = read_bytes_prefixed(&mut cursor).ok()?;
                let mut inner = Cursor::new(payload);
                let depth = inner.read_varint_usize().ok()?;
                let merkle_root = inner.read_hash().ok()?;
                return Some((depth, merkle_root));
            }
            _ => break,
        }
    }
    None
}

/// Re-encodes `extra` with the given merge-mining tag appended, matching
/// what a miner does when constructing an auxiliary chain's coinbase.
pub fn append_merge_mining_tag(extra: &mut Vec<u8>, depth: usize, merkle_root: Hash256) {
    extra.push(crate::transaction::TX_EXTRA_TAG_MERGE_MINING);
    let mut payload = Vec::new();
    shared::varint::write_usize(&mut payload, depth);
    payload.extend_from_slice(merkle_root.as_bytes());
    write_bytes(extra, &payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{TxInput, TxOutput, TxOutputTarget};
    use shared::PublicKey;

    fn miner_tx(height: u32) -> Transaction {
        Transaction {
            version: 1,
            unlock_time: 0,
            inputs: vec![TxInput::Base { height }],
            outputs: vec![TxOutput {
                amount: 1000,
                target: TxOutputTarget::Key {
                    key: PublicKey::from_bytes([1u8; 32]),
                },
            }],
            extra: Vec::new(),
            signatures: vec![Vec::new()],
        }
    }

    fn sample_block(major_version: u8) -> Block {
        let header = BlockHeader {
            major_version,
            minor_version: 0,
            timestamp: 1_600_000_000,
            previous_block_hash: Hash256::fast_hash(b"prev"),
            nonce: 42,
        };
        let parent_block = if major_version >= BLOCK_MAJOR_VERSION_2 {
            Some(ParentBlock {
                major_version: 1,
                minor_version: 0,
                timestamp: 1_600_000_000,
                prev_id: Hash256::fast_hash(b"aux-prev"),
                nonce: 7,
                miner_tx_branch: Vec::new(),
                miner_tx: miner_tx(0),
                blockchain_branch: Vec::new(),
            })
        } else {
            None
        };
        Block {
            header,
            parent_block,
            base_transaction: miner_tx(10),
            transaction_hashes: vec![Hash256::fast_hash(b"tx1"), Hash256::fast_hash(b"tx2")],
        }
    }

    #[test]
    fn v1_block_roundtrips() {
        let block = sample_block(BLOCK_MAJOR_VERSION_1);
        let bytes = block.encode_to_vec();
        let mut cursor = Cursor::new(&bytes);
        let decoded = Block::decode(&mut cursor).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn v2_block_with_parent_roundtrips() {
        let block = sample_block(BLOCK_MAJOR_VERSION_2);
        let bytes = block.encode_to_vec();
        let mut cursor = Cursor::new(&bytes);
        let decoded = Block::decode(&mut cursor).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn v2_block_without_parent_block_is_rejected() {
        let mut block = sample_block(BLOCK_MAJOR_VERSION_2);
        block.parent_block = None;
        let err = block.encode_pow_blob(&mut Vec::new()).unwrap_err();
        assert_eq!(err, Error::WrongMergeMiningTag);
    }

    #[test]
    fn block_id_is_deterministic() {
        let block = sample_block(BLOCK_MAJOR_VERSION_1);
        assert_eq!(block.id().unwrap(), block.id().unwrap());
    }

    #[test]
    fn merge_mining_tag_roundtrips_through_extra() {
        let mut extra = Vec::new();
        let root = Hash256::fast_hash(b"aux-root");
        append_merge_mining_tag(&mut extra, 3, root);
        let tx = Transaction {
            version: 1,
            unlock_time: 0,
            inputs: vec![TxInput::Base { height: 0 }],
            outputs: Vec::new(),
            extra,
            signatures: vec![Vec::new()],
        };
        assert_eq!(extract_merge_mining_tag(&tx), Some((3, root)));
    }

    #[test]
    fn oversized_merge_mining_branch_is_rejected() {
        let mut block = sample_block(BLOCK_MAJOR_VERSION_2);
        if let Some(parent) = block.parent_block.as_mut() {
            parent.miner_tx_branch = (0..300).map(|i| Hash256::fast_hash(&[i as u8])).collect();
        }
        let err = block.encode_pow_blob(&mut Vec::new()).unwrap_err();
        assert_eq!(err, Error::MerkleBranchTooDeep);
    }

    fn with_merge_mining_tag(mut block: Block, depth: usize, branch: Vec<Hash256>, root: Hash256) -> Block {
        let parent = block.parent_block.as_mut().unwrap();
        parent.blockchain_branch = branch;
        append_merge_mining_tag(&mut parent.miner_tx.extra, depth, root);
        block
    }

    #[test]
    fn v1_block_has_no_merge_mining_to_verify() {
        let block = sample_block(BLOCK_MAJOR_VERSION_1);
        assert!(block.verify_merge_mining().is_ok());
    }

    #[test]
    fn v2_block_verifies_when_branch_reaches_the_tagged_root() {
        let block = sample_block(BLOCK_MAJOR_VERSION_2);
        let leaf = block.auxiliary_header_hash();
        let sibling = Hash256::fast_hash(b"sibling-aux-block");
        let root = tree_root_from_branch(&[sibling], leaf);
        let block = with_merge_mining_tag(block, 1, vec![sibling], root);
        assert!(block.verify_merge_mining().is_ok());
    }

    #[test]
    fn v2_block_without_a_tag_is_rejected() {
        let block = sample_block(BLOCK_MAJOR_VERSION_2);
        let err = block.verify_merge_mining().unwrap_err();
        assert_eq!(err, Error::WrongMergeMiningTag);
    }

    #[test]
    fn v2_block_with_a_root_mismatch_is_rejected() {
        let block = sample_block(BLOCK_MAJOR_VERSION_2);
        let wrong_root = Hash256::fast_hash(b"not-the-real-root");
        let block = with_merge_mining_tag(block, 0, Vec::new(), wrong_root);
        let err = block.verify_merge_mining().unwrap_err();
        assert_eq!(err, Error::WrongMergeMiningTag);
    }

    #[test]
    fn v2_block_with_a_depth_mismatch_is_rejected() {
        let block = sample_block(BLOCK_MAJOR_VERSION_2);
        let leaf = block.auxiliary_header_hash();
        let root = tree_root_from_branch(&[], leaf);
        // Claims depth 1 but supplies an empty branch.
        let block = with_merge_mining_tag(block, 1, Vec::new(), root);
        let err = block.verify_merge_mining().unwrap_err();
        assert_eq!(err, Error::WrongMergeMiningTag);
    }
}
