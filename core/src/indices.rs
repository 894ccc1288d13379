//! Per-segment secondary indices, kept as explicit per-record types rather
//! than one flat map: the record types a [`crate::cache::BlockchainCache`]
//! maintains in lockstep on every mutation. `bond-core`'s `UtxoSet` is a
//! flat `HashMap<OutPoint, Utxo>`, replaced outright since CryptoNote has
//! no UTXO set, only per-amount global-index streams. Grounded on
//! `original_source/src/CryptoNoteCore/BlockchainCache.h`'s record shapes
//! and field list for the shape of
//! `OutputGlobalIndexesForAmount`/`PackedOutIndex`. Crate: `serde` for
//! snapshot persistence, matching
//! `bond-core`'s blanket derive convention; canonical (de)serialization for the
//! wire/disk form lives in `core::encoding`.

use crate::encoding::{CanonicalDecode, CanonicalEncode, Cursor, MAX_ARRAY_LEN};
use crate::error::Result;
use crate::transaction::TxOutputTarget;
use serde::{Deserialize, Serialize};
use shared::{varint, Hash256, KeyImage};
use std::collections::BTreeMap;

/// **[ADD]** Explicit struct in place of the source's packed-`u64`
/// (`blockIndex:32 | transactionIndex:16 | outputIndex:16`) — DESIGN.md's
/// open-question resolution in favor of a plain, self-documenting struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackedOutIndex {
    pub block_index: u32,
    pub transaction_index: u16,
    pub output_index: u16,
}

impl CanonicalEncode for PackedOutIndex {
    fn encode(&self, out: &mut Vec<u8>) {
        varint::write_u32(out, self.block_index);
        varint::write_u32(out, u32::from(self.transaction_index));
        varint::write_u32(out, u32::from(self.output_index));
    }
}

impl CanonicalDecode for PackedOutIndex {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            block_index: cursor.read_varint_u32()?,
            transaction_index: cursor.read_varint_u32()? as u16,
            output_index: cursor.read_varint_u32()? as u16,
        })
    }
}

/// A dense per-block summary (`CachedBlockInfo`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedBlockInfo {
    pub block_hash: Hash256,
    pub timestamp: u64,
    pub block_size: usize,
    pub cumulative_difficulty: u128,
    pub already_generated_coins: u64,
    /// **[ADD] Open Question #1**: counts the miner transaction (+1 per
    /// block), matching the source's ledger bookkeeping rather than the
    /// explorer's placeholder `0` (see DESIGN.md).
    pub already_generated_transactions: u64,
}

impl CanonicalEncode for CachedBlockInfo {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.block_hash.as_bytes());
        varint::write_u64(out, self.timestamp);
        varint::write_usize(out, self.block_size);
        crate::encoding::write_u128(out, self.cumulative_difficulty);
        varint::write_u64(out, self.already_generated_coins);
        varint::write_u64(out, self.already_generated_transactions);
    }
}

impl CanonicalDecode for CachedBlockInfo {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            block_hash: cursor.read_hash()?,
            timestamp: cursor.read_varint_u64()?,
            block_size: cursor.read_varint_usize()?,
            cumulative_difficulty: cursor.read_varint_u128()?,
            already_generated_coins: cursor.read_varint_u64()?,
            already_generated_transactions: cursor.read_varint_u64()?,
        })
    }
}

/// Per-transaction record (`CachedTransactionInfo`): `outputs` are
/// targets only (parallel to the transaction's own output vector);
/// `global_indexes[i]` is the global index this segment assigned to
/// output `i` (key outputs only — multisig outputs are tracked separately
/// in [`MultisignatureIndexes`] and get no entry here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedTransactionInfo {
    pub block_index: u32,
    pub transaction_index: u32,
    pub transaction_hash: Hash256,
    pub unlock_time: u64,
    pub outputs: Vec<TxOutputTarget>,
    pub global_indexes: Vec<u64>,
}

impl CanonicalEncode for CachedTransactionInfo {
    fn encode(&self, out: &mut Vec<u8>) {
        varint::write_u32(out, self.block_index);
        varint::write_u32(out, self.transaction_index);
        out.extend_from_slice(self.transaction_hash.as_bytes());
        varint::write_u64(out, self.unlock_time);
        crate::encoding::write_array(out, &self.outputs);
        varint::write_usize(out, self.global_indexes.len());
        for index in &self.global_indexes {
            varint::write_u64(out, *index);
        }
    }
}

impl CanonicalDecode for CachedTransactionInfo {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self> {
        let block_index = cursor.read_varint_u32()?;
        let transaction_index = cursor.read_varint_u32()?;
        let transaction_hash = cursor.read_hash()?;
        let unlock_time = cursor.read_varint_u64()?;
        let outputs: Vec<TxOutputTarget> = crate::encoding::read_array(cursor, MAX_ARRAY_LEN)?;
        let count = cursor.read_varint_usize()?;
        let mut global_indexes = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            global_indexes.push(cursor.read_varint_u64()?);
        }
        Ok(Self {
            block_index,
            transaction_index,
            transaction_hash,
            unlock_time,
            outputs,
            global_indexes,
        })
    }
}

/// `{blockIndex, keyImage}` (`SpentKeyImage`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentKeyImage {
    pub block_index: u32,
    pub key_image: KeyImage,
}

impl CanonicalEncode for SpentKeyImage {
    fn encode(&self, out: &mut Vec<u8>) {
        varint::write_u32(out, self.block_index);
        out.extend_from_slice(self.key_image.as_bytes());
    }
}

impl CanonicalDecode for SpentKeyImage {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self> {
        let block_index = cursor.read_varint_u32()?;
        let bytes = cursor.read_bytes(32)?;
        let key_image = KeyImage::from_slice(bytes)?;
        Ok(Self {
            block_index,
            key_image,
        })
    }
}

/// Per-amount global-index stream (`OutputGlobalIndexesForAmount`,
/// reused verbatim for `MultisignatureIndexes` — same shape, different key
/// space). `outputs[i]`'s global index is `start_index + i`; `start_index`
/// is inherited from the parent segment's running total the moment this
/// segment first touches the amount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputGlobalIndexesForAmount {
    pub start_index: u64,
    pub outputs: Vec<PackedOutIndex>,
}

impl OutputGlobalIndexesForAmount {
    #[must_use]
    pub fn global_index_of(&self, local_index: usize) -> u64 {
        self.start_index + local_index as u64
    }

    #[must_use]
    pub fn count_as_of(&self, as_of_block_index: u32) -> usize {
        self.partition_point_by_block_index(as_of_block_index)
    }

    /// Index of the first entry with `blockIndex >= split_block_index`,
    /// lower-bounding the `outputs` array by `blockIndex`.
    #[must_use]
    pub fn partition_point_by_block_index(&self, split_block_index: u32) -> usize {
        self.outputs
            .partition_point(|o| o.block_index < split_block_index)
    }
}

impl CanonicalEncode for OutputGlobalIndexesForAmount {
    fn encode(&self, out: &mut Vec<u8>) {
        varint::write_u64(out, self.start_index);
        crate::encoding::write_array(out, &self.outputs);
    }
}

impl CanonicalDecode for OutputGlobalIndexesForAmount {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            start_index: cursor.read_varint_u64()?,
            outputs: crate::encoding::read_array(cursor, MAX_ARRAY_LEN)?,
        })
    }
}

/// Same shape as [`OutputGlobalIndexesForAmount`] — the source keys an
/// identical structure by amount for multisignature outputs.
pub type MultisignatureIndexes = OutputGlobalIndexesForAmount;

/// Multimap payment-id → transaction hash (`PaymentIdMap`): payment
/// ids are not unique across transactions by protocol, so lookups return
/// every matching hash without deduplication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentIdMap(BTreeMap<Hash256, Vec<Hash256>>);

impl PaymentIdMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, payment_id: Hash256, transaction_hash: Hash256) {
        self.0.entry(payment_id).or_default().push(transaction_hash);
    }

    #[must_use]
    pub fn get(&self, payment_id: &Hash256) -> &[Hash256] {
        self.0.get(payment_id).map_or(&[], Vec::as_slice)
    }

    /// Removes a single `transaction_hash` entry under `payment_id`, used
    /// when a transaction moves segments during `split`:
    /// "When a transaction moves, any payment-id entry pointing to that
    /// txHash also moves").
    pub fn remove(&mut self, payment_id: &Hash256, transaction_hash: &Hash256) -> bool {
        let Some(hashes) = self.0.get_mut(payment_id) else {
            return false;
        };
        if let Some(pos) = hashes.iter().position(|h| h == transaction_hash) {
            hashes.remove(pos);
            if hashes.is_empty() {
                self.0.remove(payment_id);
            }
            return true;
        }
        false
    }

    /// Moves every `(paymentId, transactionHash)` entry referencing
    /// `transaction_hash` out of `self` and into `target`:
    /// "When a transaction moves, any payment-id entry pointing to that
    /// txHash also moves").
    pub fn move_transaction_to(&mut self, target: &mut Self, transaction_hash: Hash256) {
        let matching: Vec<Hash256> = self
            .0
            .iter()
            .filter(|(_, hashes)| hashes.contains(&transaction_hash))
            .map(|(payment_id, _)| *payment_id)
            .collect();
        for payment_id in matching {
            if self.remove(&payment_id, &transaction_hash) {
                target.insert(payment_id, transaction_hash);
            }
        }
    }

    /// All `(paymentId, transactionHash)` pairs in insertion-stable,
    /// payment-id-sorted order, for deterministic snapshot encoding.
    #[must_use]
    pub fn pairs(&self) -> Vec<(Hash256, Hash256)> {
        self.0
            .iter()
            .flat_map(|(payment_id, hashes)| hashes.iter().map(move |h| (*payment_id, *h)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_out_index_roundtrips() {
        let index = PackedOutIndex {
            block_index: 12,
            transaction_index: 3,
            output_index: 7,
        };
        let bytes = index.encode_to_vec();
        let mut cursor = Cursor::new(&bytes);
        assert_eq!(PackedOutIndex::decode(&mut cursor).unwrap(), index);
    }

    #[test]
    fn cached_block_info_roundtrips_with_128_bit_difficulty() {
        let info = CachedBlockInfo {
            block_hash: Hash256::fast_hash(b"block"),
            timestamp: 1_700_000_000,
            block_size: 4096,
            cumulative_difficulty: u128::MAX / 3,
            already_generated_coins: 123_456,
            already_generated_transactions: 42,
        };
        let bytes = info.encode_to_vec();
        let mut cursor = Cursor::new(&bytes);
        assert_eq!(CachedBlockInfo::decode(&mut cursor).unwrap(), info);
    }

    #[test]
    fn global_index_of_adds_local_offset_to_start_index() {
        let entry = OutputGlobalIndexesForAmount {
            start_index: 100,
            outputs: vec![
                PackedOutIndex {
                    block_index: 1,
                    transaction_index: 0,
                    output_index: 0,
                },
                PackedOutIndex {
                    block_index: 2,
                    transaction_index: 0,
                    output_index: 0,
                },
            ],
        };
        assert_eq!(entry.global_index_of(0), 100);
        assert_eq!(entry.global_index_of(1), 101);
    }

    #[test]
    fn partition_point_finds_first_entry_at_or_above_split() {
        let entry = OutputGlobalIndexesForAmount {
            start_index: 0,
            outputs: (0..5)
                .map(|i| PackedOutIndex {
                    block_index: i,
                    transaction_index: 0,
                    output_index: 0,
                })
                .collect(),
        };
        assert_eq!(entry.partition_point_by_block_index(3), 3);
    }

    #[test]
    fn payment_id_map_returns_every_match_without_dedup() {
        let mut map = PaymentIdMap::new();
        let id = Hash256::fast_hash(b"payment");
        let tx1 = Hash256::fast_hash(b"tx1");
        let tx2 = Hash256::fast_hash(b"tx2");
        map.insert(id, tx1);
        map.insert(id, tx2);
        assert_eq!(map.get(&id), &[tx1, tx2]);
    }

    #[test]
    fn payment_id_map_remove_drops_single_entry_and_empty_key() {
        let mut map = PaymentIdMap::new();
        let id = Hash256::fast_hash(b"payment");
        let tx = Hash256::fast_hash(b"tx");
        map.insert(id, tx);
        assert!(map.remove(&id, &tx));
        assert!(map.get(&id).is_empty());
    }
}
