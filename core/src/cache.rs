//! The segment (`BlockchainCache`) — the heart of
//! the engine. Owns one contiguous
//! height range's indices: block infos, transactions, spent key images,
//! per-amount global-index streams, spent multisig outputs, and payment
//! ids, all maintained in lockstep on `push_block` via explicit secondary
//! indices rather than one flat map. Grounded on `bond-core`'s
//! `Blockchain` struct (`bond-core/src/blockchain.rs`) as "the one type
//! that owns all the indices and validates before mutating," generalized
//! from a single flat chain to one segment among many, and on
//! `original_source/src/CryptoNoteCore/BlockchainCache.cpp`'s method names
//! (`pushBlock`, `split`, `getPushedBlockInfo`, `getKeyOutputsCountForAmount`,
//! ...).
//!
//! This type is deliberately parent-agnostic: every operation that needs
//! data from an ancestor segment takes a [`ParentContext`] trait object
//! rather than holding a parent pointer directly (a handle-plus-arena
//! design) — [`crate::cache_tree::SegmentArena`] is the only
//! thing that knows how segments relate to each other, and it recurses by
//! wrapping itself as a `ParentContext` when delegating to a child's local
//! operations.

use crate::cached::{CachedBlock, CachedTransaction};
use crate::currency::unlock_time_is_reached;
use crate::encoding::{CanonicalDecode, CanonicalEncode, Cursor, MAX_ARRAY_LEN};
use crate::error::{Error, Result};
use crate::indices::{
    CachedBlockInfo, CachedTransactionInfo, MultisignatureIndexes, OutputGlobalIndexesForAmount,
    PackedOutIndex, PaymentIdMap,
};
use crate::raw_storage::{RawBlock, RawBlockStorage};
use crate::transaction::TxOutputTarget;
use crate::validator::TransactionValidatorState;
use shared::{varint, Hash256, KeyImage, PublicKey};
use std::collections::{BTreeMap, HashMap};

/// What a segment needs from its parent: the running cumulative totals as
/// of the parent's own tip (consumed the first time this segment pushes a
/// block), and amount-keyed global-index counts as of an arbitrary height
/// within or below the parent (consumed whenever this segment first
/// touches an amount).
pub trait ParentContext {
    /// `(cumulativeDifficulty, alreadyGeneratedCoins, alreadyGeneratedTransactions)`
    /// as of the parent's last pushed block.
    fn tail_cumulative(&self) -> Option<(u128, u64, u64)>;
    fn key_outputs_count_for_amount(&self, amount: u64, as_of_height: u32) -> u64;
    fn multisignature_count_for_amount(&self, amount: u64, as_of_height: u32) -> u64;
}

/// Reverses `push_block` for one block (`getPushedBlockInfo`):
/// enough to replay that block onto another segment during a reorg.
#[derive(Debug, Clone)]
pub struct PushedBlockInfo {
    pub raw_block: RawBlock,
    pub block_size: usize,
    pub block_difficulty: u128,
    pub generated_coins: u64,
    pub validator_state: TransactionValidatorState,
}

/// A resolved key output: its public key, the unlock time of the
/// transaction that created it, and a back-reference for explorer views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedKeyOutput {
    pub public_key: PublicKey,
    pub unlock_time: u64,
    pub transaction_hash: Hash256,
    pub output_index: u16,
}

/// One segment's indices. `start_index` plus the
/// length of `block_infos` is this segment's exclusive height range;
/// everything below `start_index` lives in an ancestor reached only
/// through a [`ParentContext`].
#[derive(Debug, Clone)]
pub struct BlockchainCache {
    start_index: u32,
    block_infos: Vec<CachedBlockInfo>,
    /// `blockHash -> absolute blockIndex`, additionally indexed
    /// by `blockHash` (unique). Keyed by absolute index, not local, so a
    /// `split` never needs to renumber existing entries.
    block_hash_index: HashMap<Hash256, u32>,
    /// `timestamp -> [absolute blockIndex]`, sorted by key, with
    /// duplicates allowed.
    timestamp_index: BTreeMap<u64, Vec<u32>>,

    transactions_by_hash: HashMap<Hash256, CachedTransactionInfo>,
    transactions_by_block: BTreeMap<u32, Vec<Hash256>>,
    transactions_by_composite: HashMap<(u32, u32), Hash256>,

    spent_key_images: HashMap<KeyImage, u32>,
    spent_key_images_by_block: BTreeMap<u32, Vec<KeyImage>>,

    key_outputs_global_indexes: HashMap<u64, OutputGlobalIndexesForAmount>,
    multisignature_storage: HashMap<u64, MultisignatureIndexes>,

    spent_multisig_outputs: HashMap<(u64, u64), u32>,
    spent_multisig_outputs_by_block: BTreeMap<u32, Vec<(u64, u64)>>,

    payment_ids: PaymentIdMap,

    raw_blocks: RawBlockStorage,
}

const SNAPSHOT_VERSION: u32 = 1;

impl BlockchainCache {
    #[must_use]
    pub fn new(start_index: u32) -> Self {
        Self {
            start_index,
            block_infos: Vec::new(),
            block_hash_index: HashMap::new(),
            timestamp_index: BTreeMap::new(),
            transactions_by_hash: HashMap::new(),
            transactions_by_block: BTreeMap::new(),
            transactions_by_composite: HashMap::new(),
            spent_key_images: HashMap::new(),
            spent_key_images_by_block: BTreeMap::new(),
            key_outputs_global_indexes: HashMap::new(),
            multisignature_storage: HashMap::new(),
            spent_multisig_outputs: HashMap::new(),
            spent_multisig_outputs_by_block: BTreeMap::new(),
            payment_ids: PaymentIdMap::new(),
            raw_blocks: RawBlockStorage::new(),
        }
    }

    #[must_use]
    pub const fn start_index(&self) -> u32 {
        self.start_index
    }

    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.block_infos.len() as u32
    }

    /// The last block index owned by this segment, if it has any blocks.
    #[must_use]
    pub fn top_block_index(&self) -> Option<u32> {
        if self.block_infos.is_empty() {
            None
        } else {
            Some(self.start_index + self.block_infos.len() as u32 - 1)
        }
    }

    #[must_use]
    pub fn has_block(&self, hash: &Hash256) -> bool {
        self.block_hash_index.contains_key(hash)
    }

    #[must_use]
    pub fn local_block_index(&self, hash: &Hash256) -> Option<u32> {
        self.block_hash_index.get(hash).copied()
    }

    #[must_use]
    pub fn local_block_hash(&self, block_index: u32) -> Option<Hash256> {
        self.local_block_info(block_index).map(|info| info.block_hash)
    }

    #[must_use]
    pub fn local_block_info(&self, block_index: u32) -> Option<&CachedBlockInfo> {
        if block_index < self.start_index {
            return None;
        }
        self.block_infos.get((block_index - self.start_index) as usize)
    }

    /// The raw block blob this segment stored for `block_index` at push
    /// time, for explorer/RPC views that need the full block/transaction
    /// bodies rather than just the per-block summary.
    #[must_use]
    pub fn local_raw_block(&self, block_index: u32) -> Option<&RawBlock> {
        if block_index < self.start_index {
            return None;
        }
        self.raw_blocks.get((block_index - self.start_index) as usize)
    }

    /// `(cumulativeDifficulty, alreadyGeneratedCoins, alreadyGeneratedTransactions)`
    /// as of this segment's last pushed block, for a child segment's first
    /// push to inherit.
    #[must_use]
    pub fn tail_cumulative(&self) -> Option<(u128, u64, u64)> {
        self.block_infos
            .last()
            .map(|info| (info.cumulative_difficulty, info.already_generated_coins, info.already_generated_transactions))
    }

    #[must_use]
    pub fn local_transaction(&self, hash: &Hash256) -> Option<&CachedTransactionInfo> {
        self.transactions_by_hash.get(hash)
    }

    #[must_use]
    pub fn local_spent_block_index(&self, key_image: &KeyImage) -> Option<u32> {
        self.spent_key_images.get(key_image).copied()
    }

    #[must_use]
    pub fn local_multisignature_spent_block_index(&self, amount: u64, global_index: u64) -> Option<u32> {
        self.spent_multisig_outputs.get(&(amount, global_index)).copied()
    }

    #[must_use]
    pub fn local_payment_id_transactions(&self, payment_id: &Hash256) -> &[Hash256] {
        self.payment_ids.get(payment_id)
    }

    #[must_use]
    pub fn local_key_outputs_count_for_amount(&self, amount: u64, as_of_height: u32) -> Option<u64> {
        if as_of_height < self.start_index {
            return None;
        }
        let entry = self.key_outputs_global_indexes.get(&amount)?;
        let local_count = entry.outputs.partition_point(|o| o.block_index < as_of_height);
        Some(entry.start_index + local_count as u64)
    }

    #[must_use]
    pub fn local_multisignature_count_for_amount(&self, amount: u64, as_of_height: u32) -> Option<u64> {
        if as_of_height < self.start_index {
            return None;
        }
        let entry = self.multisignature_storage.get(&amount)?;
        let local_count = entry.outputs.partition_point(|o| o.block_index < as_of_height);
        Some(entry.start_index + local_count as u64)
    }

    #[must_use]
    pub fn local_block_hashes_by_timestamps(&self, timestamp_begin: u64, seconds_count: u64) -> Vec<Hash256> {
        let end = timestamp_begin.saturating_add(seconds_count);
        self.timestamp_index
            .range(timestamp_begin..end)
            .flat_map(|(_, indexes)| indexes.iter().filter_map(|&bi| self.local_block_hash(bi)))
            .collect()
    }

    fn resolve_output(&self, poi: PackedOutIndex) -> Option<(&CachedTransactionInfo, usize)> {
        let tx_hash = self
            .transactions_by_composite
            .get(&(poi.block_index, u32::from(poi.transaction_index)))?;
        let info = self.transactions_by_hash.get(tx_hash)?;
        Some((info, poi.output_index as usize))
    }

    /// Resolves a global index this segment is known to own (caller must
    /// have already established `global_index >= entry.start_index` for
    /// the local `keyOutputsGlobalIndexes[amount]` entry) to the output's
    /// public key, unlock time, and a reference (`extractKeyOutputKeys`/
    /// `extractKeyOutputReferences`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGlobalIndex`] if the index exceeds this
    /// segment's known maximum for the amount, or [`Error::InvalidOutput`]
    /// if the referenced output is not a key output.
    pub fn local_resolve_key_output(&self, amount: u64, global_index: u64) -> Result<ResolvedKeyOutput> {
        let entry = self
            .key_outputs_global_indexes
            .get(&amount)
            .ok_or(Error::InvalidGlobalIndex { index: global_index, max: 0 })?;
        let max = entry.start_index + entry.outputs.len() as u64;
        if global_index < entry.start_index {
            return Err(Error::InvalidGlobalIndex { index: global_index, max });
        }
        let local_index = (global_index - entry.start_index) as usize;
        let poi = *entry
            .outputs
            .get(local_index)
            .ok_or(Error::InvalidGlobalIndex { index: global_index, max })?;
        let (tx_info, output_index) = self
            .resolve_output(poi)
            .ok_or(Error::InvalidGlobalIndex { index: global_index, max })?;
        match tx_info.outputs.get(output_index) {
            Some(TxOutputTarget::Key { key }) => Ok(ResolvedKeyOutput {
                public_key: *key,
                unlock_time: tx_info.unlock_time,
                transaction_hash: tx_info.transaction_hash,
                output_index: poi.output_index,
            }),
            Some(TxOutputTarget::Multisignature { .. }) => Err(Error::InvalidOutput),
            None => Err(Error::InvalidGlobalIndex { index: global_index, max }),
        }
    }

    /// Whether the output at `global_index` is eligible for ring membership
    /// as of `as_of_height`: mined-money-unlock clears and the owning
    /// transaction's `unlockTime` has elapsed (the check
    /// `getRandomOutsByAmount`/`extractKeyOutputKeys` use to reject `OutputLocked`).
    #[must_use]
    pub fn local_key_output_unlocked(
        &self,
        amount: u64,
        global_index: u64,
        as_of_height: u32,
        current_time: i64,
        max_block_height: u64,
    ) -> bool {
        match self.local_resolve_key_output(amount, global_index) {
            Ok(resolved) => {
                unlock_time_is_reached(resolved.unlock_time, u64::from(as_of_height), current_time, max_block_height)
            }
            Err(_) => false,
        }
    }

    /// Global indexes of key outputs of `amount` in *this* segment eligible
    /// for ring membership at `as_of_height` (`getRandomOutsByAmount`'s
    /// candidate pool): `blockIndex <= asOfHeight - unlockWindow`
    /// and the owning transaction is unlocked.
    #[must_use]
    pub fn local_eligible_key_output_indexes(
        &self,
        amount: u64,
        as_of_height: u32,
        unlock_window: u32,
        current_time: i64,
        max_block_height: u64,
    ) -> Vec<u64> {
        let Some(entry) = self.key_outputs_global_indexes.get(&amount) else {
            return Vec::new();
        };
        let cutoff = as_of_height.saturating_sub(unlock_window);
        entry
            .outputs
            .iter()
            .enumerate()
            .filter(|(_, poi)| poi.block_index <= cutoff)
            .filter_map(|(local_index, poi)| {
                let (tx_info, _) = self.resolve_output(*poi)?;
                if unlock_time_is_reached(tx_info.unlock_time, u64::from(as_of_height), current_time, max_block_height) {
                    Some(entry.global_index_of(local_index))
                } else {
                    None
                }
            })
            .collect()
    }

    /// `pushBlock`. `parent` supplies the running cumulative
    /// tail and amount counts only when this is the segment's very first
    /// push; later pushes are entirely self-contained. Returns the
    /// absolute block index just pushed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongState`] if `cached_block`'s hash already
    /// exists in this segment (the precondition "`hasBlock` is
    /// false").
    #[allow(clippy::too_many_arguments)]
    pub fn push_block(
        &mut self,
        cached_block: &CachedBlock,
        cached_transactions: &[CachedTransaction],
        validator_state: &TransactionValidatorState,
        block_size: usize,
        generated_coins: u64,
        block_difficulty: u128,
        raw_block: RawBlock,
        parent: Option<&dyn ParentContext>,
    ) -> Result<u32> {
        let block_hash = cached_block.id();
        if self.has_block(&block_hash) {
            return Err(Error::WrongState(format!("block {block_hash} already present in segment")));
        }

        let block_index = self.start_index + self.block_infos.len() as u32;

        let (prev_difficulty, prev_coins, prev_txs) = if let Some(last) = self.block_infos.last() {
            (last.cumulative_difficulty, last.already_generated_coins, last.already_generated_transactions)
        } else {
            parent.and_then(ParentContext::tail_cumulative).unwrap_or((0, 0, 0))
        };

        let info = CachedBlockInfo {
            block_hash,
            timestamp: cached_block.block().header.timestamp,
            block_size,
            cumulative_difficulty: prev_difficulty + block_difficulty,
            already_generated_coins: prev_coins + generated_coins,
            already_generated_transactions: prev_txs + cached_transactions.len() as u64 + 1,
        };
        self.block_hash_index.insert(info.block_hash, block_index);
        self.timestamp_index.entry(info.timestamp).or_default().push(block_index);
        self.block_infos.push(info);

        for key_image in &validator_state.spent_key_images {
            self.spent_key_images.insert(*key_image, block_index);
            self.spent_key_images_by_block.entry(block_index).or_default().push(*key_image);
        }
        for &(amount, global_index) in &validator_state.spent_multisignature_global_indexes {
            self.spent_multisig_outputs.insert((amount, global_index), block_index);
            self.spent_multisig_outputs_by_block
                .entry(block_index)
                .or_default()
                .push((amount, global_index));
        }

        let miner_tx = cached_transactions_miner(cached_block);
        let all_transactions: Vec<&CachedTransaction> =
            std::iter::once(&miner_tx).chain(cached_transactions.iter()).collect();

        for (transaction_index, cached_tx) in all_transactions.into_iter().enumerate() {
            let tx = cached_tx.transaction();
            let transaction_index = transaction_index as u32;
            let mut global_indexes = Vec::with_capacity(tx.outputs.len());
            let mut outputs = Vec::with_capacity(tx.outputs.len());
            for (output_index, output) in tx.outputs.iter().enumerate() {
                let poi = PackedOutIndex {
                    block_index,
                    transaction_index: transaction_index as u16,
                    output_index: output_index as u16,
                };
                let global_index = match &output.target {
                    TxOutputTarget::Key { .. } => {
                        self.insert_key_output_to_global_index(output.amount, poi, block_index, parent)
                    }
                    TxOutputTarget::Multisignature { .. } => {
                        self.insert_multisignature_to_global_index(output.amount, poi, block_index, parent)
                    }
                };
                global_indexes.push(global_index);
                outputs.push(output.target.clone());
            }

            let tx_hash = cached_tx.hash();
            self.transactions_by_block.entry(block_index).or_default().push(tx_hash);
            self.transactions_by_composite.insert((block_index, transaction_index), tx_hash);
            self.transactions_by_hash.insert(
                tx_hash,
                CachedTransactionInfo {
                    block_index,
                    transaction_index,
                    transaction_hash: tx_hash,
                    unlock_time: tx.unlock_time,
                    outputs,
                    global_indexes,
                },
            );

            if let Some(payment_id) = tx.payment_id() {
                self.payment_ids.insert(payment_id, tx_hash);
            }
        }

        self.raw_blocks.push_back(raw_block);

        Ok(block_index)
    }

    fn insert_key_output_to_global_index(
        &mut self,
        amount: u64,
        poi: PackedOutIndex,
        block_index: u32,
        parent: Option<&dyn ParentContext>,
    ) -> u64 {
        let entry = self.key_outputs_global_indexes.entry(amount).or_insert_with(|| {
            let start_index = parent.map_or(0, |p| p.key_outputs_count_for_amount(amount, block_index));
            OutputGlobalIndexesForAmount { start_index, outputs: Vec::new() }
        });
        entry.outputs.push(poi);
        entry.global_index_of(entry.outputs.len() - 1)
    }

    fn insert_multisignature_to_global_index(
        &mut self,
        amount: u64,
        poi: PackedOutIndex,
        block_index: u32,
        parent: Option<&dyn ParentContext>,
    ) -> u64 {
        let entry = self.multisignature_storage.entry(amount).or_insert_with(|| {
            let start_index = parent.map_or(0, |p| p.multisignature_count_for_amount(amount, block_index));
            MultisignatureIndexes { start_index, outputs: Vec::new() }
        });
        entry.outputs.push(poi);
        entry.global_index_of(entry.outputs.len() - 1)
    }

    /// `getPushedBlockInfo`: reverses the bookkeeping from
    /// `push_block` for `block_index`, which must belong to this segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InternalError`] if `block_index` is not owned by
    /// this segment.
    pub fn get_pushed_block_info(
        &self,
        block_index: u32,
        parent: Option<&dyn ParentContext>,
    ) -> Result<PushedBlockInfo> {
        if block_index < self.start_index {
            return Err(Error::InternalError(format!("block {block_index} not in this segment")));
        }
        let local_index = (block_index - self.start_index) as usize;
        let info = self
            .block_infos
            .get(local_index)
            .ok_or_else(|| Error::InternalError(format!("block {block_index} not in this segment")))?;
        let raw_block = self
            .raw_blocks
            .get(local_index)
            .cloned()
            .ok_or_else(|| Error::InternalError(format!("raw block {block_index} missing")))?;

        let (prev_difficulty, prev_coins) = if local_index == 0 {
            parent
                .and_then(ParentContext::tail_cumulative)
                .map(|(d, c, _)| (d, c))
                .unwrap_or((0, 0))
        } else {
            let prev = &self.block_infos[local_index - 1];
            (prev.cumulative_difficulty, prev.already_generated_coins)
        };

        let mut validator_state = TransactionValidatorState::new();
        if let Some(images) = self.spent_key_images_by_block.get(&block_index) {
            for image in images {
                validator_state.add_key_image(*image);
            }
        }
        if let Some(entries) = self.spent_multisig_outputs_by_block.get(&block_index) {
            for &(amount, global_index) in entries {
                validator_state.add_multisignature_spend(amount, global_index);
            }
        }

        Ok(PushedBlockInfo {
            raw_block,
            block_size: info.block_size,
            block_difficulty: info.cumulative_difficulty - prev_difficulty,
            generated_coins: info.already_generated_coins - prev_coins,
            validator_state,
        })
    }

    fn rebuild_block_indices(&mut self) {
        self.block_hash_index.clear();
        self.timestamp_index.clear();
        for (local_index, info) in self.block_infos.iter().enumerate() {
            let block_index = self.start_index + local_index as u32;
            self.block_hash_index.insert(info.block_hash, block_index);
            self.timestamp_index.entry(info.timestamp).or_default().push(block_index);
        }
    }

    /// `split(splitBlockIndex)`: moves blocks
    /// `[splitBlockIndex, top]` into a freshly returned segment, leaving
    /// `[startIndex, splitBlockIndex)` in `self`. Does not touch any
    /// parent/child wiring — that is [`crate::cache_tree::SegmentArena`]'s
    /// job.
    ///
    /// # Panics
    ///
    /// Panics if `split_block_index` is not strictly inside
    /// `(start_index, top_block_index]`.
    pub fn split(&mut self, split_block_index: u32) -> Self {
        assert!(self.start_index < split_block_index, "split index must be above start_index");
        let top = self.top_block_index().expect("cannot split an empty segment");
        assert!(split_block_index <= top, "split index must be at or below the top");

        let local_split = (split_block_index - self.start_index) as usize;
        let mut upper = Self::new(split_block_index);

        upper.raw_blocks = self.raw_blocks.split(local_split);
        upper.block_infos = self.block_infos.split_off(local_split);
        self.rebuild_block_indices();
        upper.rebuild_block_indices();

        let moved_tx_blocks = self.transactions_by_block.split_off(&split_block_index);
        for (block_index, hashes) in moved_tx_blocks {
            for hash in &hashes {
                if let Some(info) = self.transactions_by_hash.remove(hash) {
                    self.transactions_by_composite.remove(&(info.block_index, info.transaction_index));
                    upper.transactions_by_composite.insert((info.block_index, info.transaction_index), *hash);
                    upper.transactions_by_hash.insert(*hash, info);
                }
                self.payment_ids.move_transaction_to(&mut upper.payment_ids, *hash);
            }
            upper.transactions_by_block.insert(block_index, hashes);
        }

        let moved_key_images = self.spent_key_images_by_block.split_off(&split_block_index);
        for (block_index, images) in moved_key_images {
            for image in &images {
                if let Some(bi) = self.spent_key_images.remove(image) {
                    upper.spent_key_images.insert(*image, bi);
                }
            }
            upper.spent_key_images_by_block.insert(block_index, images);
        }

        let moved_multisig_spends = self.spent_multisig_outputs_by_block.split_off(&split_block_index);
        for (block_index, entries) in moved_multisig_spends {
            for entry in &entries {
                if let Some(bi) = self.spent_multisig_outputs.remove(entry) {
                    upper.spent_multisig_outputs.insert(*entry, bi);
                }
            }
            upper.spent_multisig_outputs_by_block.insert(block_index, entries);
        }

        for (amount, entry) in &mut self.key_outputs_global_indexes {
            let idx = entry.outputs.partition_point(|o| o.block_index < split_block_index);
            if idx == entry.outputs.len() {
                continue;
            }
            let moved = entry.outputs.split_off(idx);
            let new_start = entry.start_index + idx as u64;
            upper
                .key_outputs_global_indexes
                .insert(*amount, OutputGlobalIndexesForAmount { start_index: new_start, outputs: moved });
        }
        self.key_outputs_global_indexes.retain(|_, e| !e.outputs.is_empty());

        for (amount, entry) in &mut self.multisignature_storage {
            let idx = entry.outputs.partition_point(|o| o.block_index < split_block_index);
            if idx == entry.outputs.len() {
                continue;
            }
            let moved = entry.outputs.split_off(idx);
            let new_start = entry.start_index + idx as u64;
            upper
                .multisignature_storage
                .insert(*amount, MultisignatureIndexes { start_index: new_start, outputs: moved });
        }
        self.multisignature_storage.retain(|_, e| !e.outputs.is_empty());

        upper
    }

    /// Snapshot encoding: version, then ordered arrays of
    /// block infos, transactions, spent key images, payment-id pairs, and
    /// the two amount-keyed global-index maps. Raw block bytes are *not*
    /// part of the snapshot — they live in the append log and
    /// are expected to already be present when the caller reattaches a
    /// loaded cache to its `RawBlockStorage` handle.
    #[must_use]
    pub fn encode_snapshot(&self) -> Vec<u8> {
        let mut out = Vec::new();
        varint::write_u32(&mut out, SNAPSHOT_VERSION);
        varint::write_u32(&mut out, self.start_index);
        crate::encoding::write_array(&mut out, &self.block_infos);

        let mut txs: Vec<&CachedTransactionInfo> = self.transactions_by_hash.values().collect();
        txs.sort_by_key(|t| (t.block_index, t.transaction_index));
        varint::write_usize(&mut out, txs.len());
        for tx in txs {
            tx.encode(&mut out);
        }

        let mut images: Vec<(u32, KeyImage)> = self.spent_key_images.iter().map(|(ki, bi)| (*bi, *ki)).collect();
        images.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.as_bytes().cmp(b.1.as_bytes())));
        varint::write_usize(&mut out, images.len());
        for (block_index, key_image) in images {
            varint::write_u32(&mut out, block_index);
            out.extend_from_slice(key_image.as_bytes());
        }

        let pairs = self.payment_ids.pairs();
        varint::write_usize(&mut out, pairs.len());
        for (payment_id, tx_hash) in pairs {
            out.extend_from_slice(payment_id.as_bytes());
            out.extend_from_slice(tx_hash.as_bytes());
        }

        let mut key_entries: Vec<(u64, &OutputGlobalIndexesForAmount)> =
            self.key_outputs_global_indexes.iter().map(|(a, e)| (*a, e)).collect();
        key_entries.sort_by_key(|(a, _)| *a);
        varint::write_usize(&mut out, key_entries.len());
        for (amount, entry) in key_entries {
            varint::write_u64(&mut out, amount);
            entry.encode(&mut out);
        }

        let mut ms_entries: Vec<(u64, &MultisignatureIndexes)> =
            self.multisignature_storage.iter().map(|(a, e)| (*a, e)).collect();
        ms_entries.sort_by_key(|(a, _)| *a);
        varint::write_usize(&mut out, ms_entries.len());
        for (amount, entry) in ms_entries {
            varint::write_u64(&mut out, amount);
            entry.encode(&mut out);
        }

        out
    }

    /// Decodes a snapshot produced by [`Self::encode_snapshot`]. Additive:
    /// reconstructs every in-memory secondary index from the persisted
    /// arrays. The caller is responsible for discarding the snapshot and
    /// rebuilding from raw blocks on any error, and for
    /// attaching the segment's `RawBlockStorage` handle afterward (not
    /// part of this encoding).
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongVersion`] if the leading version integer does
    /// not match [`SNAPSHOT_VERSION`], or any decode error from a
    /// malformed buffer.
    pub fn decode_snapshot(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let version = cursor.read_varint_u32()?;
        if version != SNAPSHOT_VERSION {
            return Err(Error::WrongVersion(u8::try_from(version).unwrap_or(u8::MAX)));
        }
        let start_index = cursor.read_varint_u32()?;
        let mut cache = Self::new(start_index);

        let block_infos: Vec<CachedBlockInfo> = crate::encoding::read_array(&mut cursor, MAX_ARRAY_LEN)?;
        cache.block_infos = block_infos;
        cache.rebuild_block_indices();

        let tx_count = cursor.read_varint_usize()?;
        if tx_count > MAX_ARRAY_LEN {
            return Err(Error::SizeLimit { size: tx_count, limit: MAX_ARRAY_LEN });
        }
        for _ in 0..tx_count {
            let tx = CachedTransactionInfo::decode(&mut cursor)?;
            cache.transactions_by_block.entry(tx.block_index).or_default().push(tx.transaction_hash);
            cache
                .transactions_by_composite
                .insert((tx.block_index, tx.transaction_index), tx.transaction_hash);
            cache.transactions_by_hash.insert(tx.transaction_hash, tx);
        }

        let image_count = cursor.read_varint_usize()?;
        if image_count > MAX_ARRAY_LEN {
            return Err(Error::SizeLimit { size: image_count, limit: MAX_ARRAY_LEN });
        }
        for _ in 0..image_count {
            let block_index = cursor.read_varint_u32()?;
            let key_image = KeyImage::from_slice(cursor.read_bytes(32)?)?;
            cache.spent_key_images.insert(key_image, block_index);
            cache.spent_key_images_by_block.entry(block_index).or_default().push(key_image);
        }

        let pair_count = cursor.read_varint_usize()?;
        if pair_count > MAX_ARRAY_LEN {
            return Err(Error::SizeLimit { size: pair_count, limit: MAX_ARRAY_LEN });
        }
        for _ in 0..pair_count {
            let payment_id = cursor.read_hash()?;
            let tx_hash = cursor.read_hash()?;
            cache.payment_ids.insert(payment_id, tx_hash);
        }

        let key_entry_count = cursor.read_varint_usize()?;
        for _ in 0..key_entry_count {
            let amount = cursor.read_varint_u64()?;
            let entry = OutputGlobalIndexesForAmount::decode(&mut cursor)?;
            cache.key_outputs_global_indexes.insert(amount, entry);
        }

        let ms_entry_count = cursor.read_varint_usize()?;
        for _ in 0..ms_entry_count {
            let amount = cursor.read_varint_u64()?;
            let entry = MultisignatureIndexes::decode(&mut cursor)?;
            cache.multisignature_storage.insert(amount, entry);
        }

        Ok(cache)
    }
}

/// `push_block` iterates the miner transaction followed by the body
/// transactions as one sequence ("push the miner
/// transaction with `transactionIndex = 0`, then the body transactions in
/// order"); this wraps the miner side of [`CachedBlock`] as a throwaway
/// [`CachedTransaction`] so the loop can treat both uniformly.
fn cached_transactions_miner(cached_block: &CachedBlock) -> CachedTransaction {
    CachedTransaction::new(cached_block.block().base_transaction.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockHeader, BLOCK_MAJOR_VERSION_1};
    use crate::transaction::{Transaction, TxInput, TxOutput};
    use shared::PublicKey;

    struct NoParent;
    impl ParentContext for NoParent {
        fn tail_cumulative(&self) -> Option<(u128, u64, u64)> {
            None
        }
        fn key_outputs_count_for_amount(&self, _amount: u64, _as_of_height: u32) -> u64 {
            0
        }
        fn multisignature_count_for_amount(&self, _amount: u64, _as_of_height: u32) -> u64 {
            0
        }
    }

    fn miner_tx_with_key_output(amount: u64, seed: u8) -> Transaction {
        Transaction {
            version: 1,
            unlock_time: 0,
            inputs: vec![TxInput::Base { height: 0 }],
            outputs: vec![TxOutput {
                amount,
                target: TxOutputTarget::Key { key: PublicKey::from_bytes([seed; 32]) },
            }],
            extra: Vec::new(),
            signatures: vec![Vec::new()],
        }
    }

    fn block_with_miner_tx(tx: Transaction, previous_block_hash: Hash256, nonce: u32) -> CachedBlock {
        let block = Block {
            header: BlockHeader {
                major_version: BLOCK_MAJOR_VERSION_1,
                minor_version: 0,
                timestamp: 1_700_000_000 + u64::from(nonce),
                previous_block_hash,
                nonce,
            },
            parent_block: None,
            base_transaction: tx,
            transaction_hashes: Vec::new(),
        };
        CachedBlock::new(block).unwrap()
    }

    fn push_simple_block(cache: &mut BlockchainCache, amount: u64, seed: u8, nonce: u32) -> u32 {
        let prev_hash = cache
            .top_block_index()
            .and_then(|top| cache.local_block_hash(top))
            .unwrap_or_else(Hash256::zero);
        let cached_block = block_with_miner_tx(miner_tx_with_key_output(amount, seed), prev_hash, nonce);
        cache
            .push_block(
                &cached_block,
                &[],
                &TransactionValidatorState::new(),
                100,
                1000,
                10,
                RawBlock { block_bytes: vec![nonce as u8], transactions_bytes: Vec::new() },
                Some(&NoParent),
            )
            .unwrap()
    }

    #[test]
    fn push_block_assigns_sequential_global_indexes_for_an_amount() {
        let mut cache = BlockchainCache::new(0);
        for i in 0..5u32 {
            push_simple_block(&mut cache, 100, i as u8 + 1, i);
        }
        let entry = cache.key_outputs_global_indexes.get(&100).unwrap();
        assert_eq!(entry.start_index, 0);
        assert_eq!(entry.outputs.len(), 5);
        assert_eq!(cache.local_key_outputs_count_for_amount(100, 5), Some(5));
    }

    #[test]
    fn split_preserves_global_index_stability() {
        let mut cache = BlockchainCache::new(0);
        for i in 0..5u32 {
            push_simple_block(&mut cache, 100, i as u8 + 1, i);
        }
        let upper = cache.split(3);

        let lower_entry = cache.key_outputs_global_indexes.get(&100).unwrap();
        assert_eq!(lower_entry.start_index, 0);
        assert_eq!(lower_entry.outputs.len(), 3);

        let upper_entry = upper.key_outputs_global_indexes.get(&100).unwrap();
        assert_eq!(upper_entry.start_index, 3);
        assert_eq!(upper_entry.outputs.len(), 2);

        assert_eq!(cache.local_key_outputs_count_for_amount(100, 3), Some(3));
        assert_eq!(upper.local_key_outputs_count_for_amount(100, 5), Some(5));
    }

    #[test]
    fn split_moves_blocks_transactions_and_raw_blocks() {
        let mut cache = BlockchainCache::new(0);
        for i in 0..5u32 {
            push_simple_block(&mut cache, 100, i as u8 + 1, i);
        }
        let upper = cache.split(3);

        assert_eq!(cache.block_count(), 3);
        assert_eq!(upper.block_count(), 2);
        assert_eq!(cache.raw_blocks.len(), 3);
        assert_eq!(upper.raw_blocks.len(), 2);
        assert!(cache.local_block_hash(2).is_some());
        assert!(cache.local_block_hash(3).is_none());
        assert!(upper.local_block_hash(3).is_some());
    }

    // Local halves only; full cross-segment recursion is exercised in `cache_tree`.
    #[test]
    fn split_moves_spent_key_images_by_block_index() {
        let mut cache = BlockchainCache::new(0);
        let image = KeyImage::from_bytes([9u8; 32]);
        for i in 0..5u32 {
            let mut state = TransactionValidatorState::new();
            if i == 2 {
                state.add_key_image(image);
            }
            let prev_hash = cache
                .top_block_index()
                .and_then(|top| cache.local_block_hash(top))
                .unwrap_or_else(Hash256::zero);
            let cached_block = block_with_miner_tx(miner_tx_with_key_output(100, i as u8 + 1), prev_hash, i);
            cache
                .push_block(
                    &cached_block,
                    &[],
                    &state,
                    100,
                    1000,
                    10,
                    RawBlock::default(),
                    Some(&NoParent),
                )
                .unwrap();
        }
        assert_eq!(cache.local_spent_block_index(&image), Some(2));
        let upper = cache.split(3);
        assert_eq!(cache.local_spent_block_index(&image), None);
        assert_eq!(upper.local_spent_block_index(&image), Some(2));
    }

    #[test]
    fn pushing_a_known_block_hash_is_rejected() {
        let mut cache = BlockchainCache::new(0);
        push_simple_block(&mut cache, 100, 1, 0);
        let dup = block_with_miner_tx(miner_tx_with_key_output(100, 1), Hash256::zero(), 0);
        let err = cache
            .push_block(
                &dup,
                &[],
                &TransactionValidatorState::new(),
                100,
                1000,
                10,
                RawBlock::default(),
                Some(&NoParent),
            )
            .unwrap_err();
        assert!(matches!(err, Error::WrongState(_)));
    }

    #[test]
    fn get_pushed_block_info_recovers_per_block_difficulty_and_coins() {
        let mut cache = BlockchainCache::new(0);
        push_simple_block(&mut cache, 100, 1, 0);
        push_simple_block(&mut cache, 100, 2, 1);
        let info = cache.get_pushed_block_info(1, Some(&NoParent)).unwrap();
        assert_eq!(info.block_difficulty, 10);
        assert_eq!(info.generated_coins, 1000);
    }

    #[test]
    fn snapshot_roundtrips_block_infos_and_global_indexes() {
        let mut cache = BlockchainCache::new(0);
        for i in 0..3u32 {
            push_simple_block(&mut cache, 100, i as u8 + 1, i);
        }
        let bytes = cache.encode_snapshot();
        let decoded = BlockchainCache::decode_snapshot(&bytes).unwrap();
        assert_eq!(decoded.block_count(), 3);
        assert_eq!(
            decoded.local_key_outputs_count_for_amount(100, 3),
            cache.local_key_outputs_count_for_amount(100, 3)
        );
        assert_eq!(decoded.local_block_hash(0), cache.local_block_hash(0));
    }

    #[test]
    fn resolve_key_output_rejects_index_past_known_maximum() {
        let mut cache = BlockchainCache::new(0);
        push_simple_block(&mut cache, 100, 1, 0);
        let err = cache.local_resolve_key_output(100, 5).unwrap_err();
        assert!(matches!(err, Error::InvalidGlobalIndex { .. }));
    }
}
