//! The segment tree, owning parent/child relationships between
//! [`BlockchainCache`]s and composing their local operations into the
//! recursive, chain-spanning ones. Built as a handle-plus-arena pattern
//! instead of a pointer/weak-reference graph; grounded on
//! `original_source/src/CryptoNoteCore/Blockchain.cpp`'s
//! `switchToAlternativeBlockchain`/`checkpoints`-driven reorg loop for the
//! split/replay/rollback shape, reworked around generational
//! [`SegmentId`] handles rather than raw `IBlockchainCache*` pointers.

use crate::cache::{BlockchainCache, ParentContext, PushedBlockInfo, ResolvedKeyOutput};
use crate::cached::{CachedBlock, CachedTransaction};
use crate::error::{Error, Result};
use crate::raw_storage::RawBlock;
use crate::validator::TransactionValidatorState;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaChaRng;
use shared::{Hash256, KeyImage};

/// Opaque handle to one segment. Indexes into [`SegmentArena`]'s internal
/// arena; never reused after a segment is pruned, since the arena only
/// ever grows; a generation counter is unnecessary here because segments
/// are never recycled mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId(usize);

struct SegmentNode {
    cache: BlockchainCache,
    parent: Option<SegmentId>,
    children: Vec<SegmentId>,
}

/// Owns every live segment and the tree connecting them. The one type
/// that knows how segments relate to each other; [`BlockchainCache`]
/// itself never holds a parent reference.
pub struct SegmentArena {
    nodes: Vec<SegmentNode>,
    root: SegmentId,
    main_tip: SegmentId,
}

/// Adapts a live (arena, segment) pair to [`ParentContext`] so a child
/// segment's `push_block`/`get_pushed_block_info` can recurse into its
/// ancestors without the arena exposing its internals to `BlockchainCache`.
struct AncestorContext<'a> {
    arena: &'a SegmentArena,
    segment: SegmentId,
}

impl ParentContext for AncestorContext<'_> {
    fn tail_cumulative(&self) -> Option<(u128, u64, u64)> {
        self.arena.segment(self.segment).tail_cumulative()
    }

    fn key_outputs_count_for_amount(&self, amount: u64, as_of_height: u32) -> u64 {
        self.arena.get_key_outputs_count_for_amount(self.segment, amount, as_of_height)
    }

    fn multisignature_count_for_amount(&self, amount: u64, as_of_height: u32) -> u64 {
        self.arena.get_multisignature_count_for_amount(self.segment, amount, as_of_height)
    }
}

impl SegmentArena {
    /// Creates an arena with a single empty root segment starting at
    /// height 0, returning the arena and the root's id (also the initial
    /// main-chain tip).
    #[must_use]
    pub fn new() -> (Self, SegmentId) {
        let root_id = SegmentId(0);
        let arena = Self {
            nodes: vec![SegmentNode { cache: BlockchainCache::new(0), parent: None, children: Vec::new() }],
            root: root_id,
            main_tip: root_id,
        };
        (arena, root_id)
    }

    #[must_use]
    pub const fn root(&self) -> SegmentId {
        self.root
    }

    #[must_use]
    pub const fn main_tip(&self) -> SegmentId {
        self.main_tip
    }

    fn node(&self, id: SegmentId) -> &SegmentNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: SegmentId) -> &mut SegmentNode {
        &mut self.nodes[id.0]
    }

    #[must_use]
    pub fn segment(&self, id: SegmentId) -> &BlockchainCache {
        &self.node(id).cache
    }

    #[must_use]
    pub fn parent_of(&self, id: SegmentId) -> Option<SegmentId> {
        self.node(id).parent
    }

    #[must_use]
    pub fn children_of(&self, id: SegmentId) -> &[SegmentId] {
        &self.node(id).children
    }

    fn allocate(&mut self, cache: BlockchainCache, parent: Option<SegmentId>) -> SegmentId {
        let id = SegmentId(self.nodes.len());
        self.nodes.push(SegmentNode { cache, parent, children: Vec::new() });
        if let Some(parent_id) = parent {
            self.node_mut(parent_id).children.push(id);
        }
        id
    }

    /// Walks from `from` to the root, yielding each segment id in order
    /// (child first). Every recursive lookup in this module is built on
    /// top of this walk.
    fn ancestor_chain(&self, from: SegmentId) -> Vec<SegmentId> {
        let mut chain = Vec::new();
        let mut current = Some(from);
        while let Some(id) = current {
            chain.push(id);
            current = self.node(id).parent;
        }
        chain
    }

    /// Public form of [`Self::ancestor_chain`], for callers outside this
    /// module that need to compare two tips' lineages directly (the
    /// protocol coordinator's reorg common-ancestor search).
    #[must_use]
    pub fn ancestor_segments(&self, from: SegmentId) -> Vec<SegmentId> {
        self.ancestor_chain(from)
    }

    #[must_use]
    pub fn has_block(&self, tip: SegmentId, hash: &Hash256) -> bool {
        self.ancestor_chain(tip).iter().any(|&id| self.segment(id).has_block(hash))
    }

    #[must_use]
    pub fn get_block_index(&self, tip: SegmentId, hash: &Hash256) -> Option<u32> {
        self.ancestor_chain(tip).iter().find_map(|&id| self.segment(id).local_block_index(hash))
    }

    #[must_use]
    pub fn get_block_hash(&self, tip: SegmentId, block_index: u32) -> Option<Hash256> {
        self.ancestor_chain(tip).iter().find_map(|&id| self.segment(id).local_block_hash(block_index))
    }

    #[must_use]
    pub fn get_block_info(&self, tip: SegmentId, block_index: u32) -> Option<&crate::indices::CachedBlockInfo> {
        for &id in &self.ancestor_chain(tip) {
            if let Some(info) = self.segment(id).local_block_info(block_index) {
                return Some(info);
            }
        }
        None
    }

    #[must_use]
    pub fn get_raw_block(&self, tip: SegmentId, block_index: u32) -> Option<&RawBlock> {
        for &id in &self.ancestor_chain(tip) {
            if let Some(raw) = self.segment(id).local_raw_block(block_index) {
                return Some(raw);
            }
        }
        None
    }

    /// Locates the segment owning `hash` along `tip`'s ancestor chain and
    /// the absolute height it was pushed at, used by the protocol
    /// coordinator to find where an incoming block's
    /// `previousBlockHash` attaches — whether exactly at `tip`'s own top
    /// (a direct extension) or at some ancestor's interior height (a fork
    /// point requiring a [`Self::split`] before a new alternative segment
    /// can branch off there).
    #[must_use]
    pub fn find_segment_for_hash(&self, tip: SegmentId, hash: &Hash256) -> Option<(SegmentId, u32)> {
        for &id in &self.ancestor_chain(tip) {
            if let Some(height) = self.segment(id).local_block_index(hash) {
                return Some((id, height));
            }
        }
        None
    }

    /// `checkIfSpent`: true iff some record in the chain rooted
    /// at `tip` records `key_image` spent at or before `as_of_height`.
    #[must_use]
    pub fn check_if_spent(&self, tip: SegmentId, key_image: &KeyImage, as_of_height: u32) -> bool {
        self.ancestor_chain(tip)
            .iter()
            .find_map(|&id| self.segment(id).local_spent_block_index(key_image))
            .is_some_and(|spent_at| spent_at <= as_of_height)
    }

    #[must_use]
    pub fn check_if_multisignature_spent(
        &self,
        tip: SegmentId,
        amount: u64,
        global_index: u64,
        as_of_height: u32,
    ) -> bool {
        self.ancestor_chain(tip)
            .iter()
            .find_map(|&id| self.segment(id).local_multisignature_spent_block_index(amount, global_index))
            .is_some_and(|spent_at| spent_at <= as_of_height)
    }

    /// `getKeyOutputsCountForAmount`: the running global count
    /// of key outputs of `amount` as of `as_of_height`, found in the first
    /// ancestor (nearest `tip`) that carries the amount at all.
    #[must_use]
    pub fn get_key_outputs_count_for_amount(&self, tip: SegmentId, amount: u64, as_of_height: u32) -> u64 {
        self.ancestor_chain(tip)
            .iter()
            .find_map(|&id| self.segment(id).local_key_outputs_count_for_amount(amount, as_of_height))
            .unwrap_or(0)
    }

    #[must_use]
    pub fn get_multisignature_count_for_amount(&self, tip: SegmentId, amount: u64, as_of_height: u32) -> u64 {
        self.ancestor_chain(tip)
            .iter()
            .find_map(|&id| self.segment(id).local_multisignature_count_for_amount(amount, as_of_height))
            .unwrap_or(0)
    }

    /// `extractKeyOutputKeys`: resolves every global index in
    /// `global_indexes` (assumed sorted, per-segment dispatch happens
    /// transparently) to its public key, recursing toward the root as
    /// needed for indexes below the nearest segment's `startIndex`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGlobalIndex`] if any index cannot be
    /// resolved anywhere in the chain.
    pub fn extract_key_output_keys(
        &self,
        tip: SegmentId,
        amount: u64,
        global_indexes: &[u64],
    ) -> Result<Vec<ResolvedKeyOutput>> {
        let chain = self.ancestor_chain(tip);
        let mut out = Vec::with_capacity(global_indexes.len());
        for &global_index in global_indexes {
            let resolved = chain
                .iter()
                .find_map(|&id| self.segment(id).local_resolve_key_output(amount, global_index).ok())
                .ok_or(Error::InvalidGlobalIndex { index: global_index, max: 0 })?;
            out.push(resolved);
        }
        Ok(out)
    }

    /// Gathers every eligible global index for `amount` across the whole
    /// chain rooted at `tip` — the candidate pool `get_random_outs_by_amount`
    /// draws from.
    #[must_use]
    pub fn eligible_key_output_indexes(
        &self,
        tip: SegmentId,
        amount: u64,
        as_of_height: u32,
        unlock_window: u32,
        current_time: i64,
        max_block_height: u64,
    ) -> Vec<u64> {
        self.ancestor_chain(tip)
            .iter()
            .flat_map(|&id| {
                self.segment(id).local_eligible_key_output_indexes(
                    amount,
                    as_of_height,
                    unlock_window,
                    current_time,
                    max_block_height,
                )
            })
            .collect()
    }

    /// `getRandomOutsByAmount`: draws up to `count` globally-unique eligible
    /// output indexes for `amount`, shuffled by a `ChaChaRng` seeded from
    /// `seed` (the caller's cryptographic PRNG draw — this method owns only
    /// the bounded, duplicate-free selection, not the seed's randomness
    /// source). Returns fewer than `count` if the eligible pool is smaller;
    /// returns all of them, in shuffled order, if `count >= pool.len()`.
    #[must_use]
    pub fn get_random_outs_by_amount(
        &self,
        tip: SegmentId,
        amount: u64,
        count: usize,
        as_of_height: u32,
        unlock_window: u32,
        current_time: i64,
        max_block_height: u64,
        seed: [u8; 32],
    ) -> Vec<u64> {
        let mut pool = self.eligible_key_output_indexes(
            tip,
            amount,
            as_of_height,
            unlock_window,
            current_time,
            max_block_height,
        );
        let mut rng = ChaChaRng::from_seed(seed);
        pool.shuffle(&mut rng);
        pool.truncate(count);
        pool
    }

    #[must_use]
    pub fn get_transaction_hashes_by_payment_id(&self, tip: SegmentId, payment_id: &Hash256) -> Vec<Hash256> {
        self.ancestor_chain(tip)
            .iter()
            .flat_map(|&id| self.segment(id).local_payment_id_transactions(payment_id).to_vec())
            .collect()
    }

    #[must_use]
    pub fn get_block_hashes_by_timestamps(&self, tip: SegmentId, timestamp_begin: u64, seconds_count: u64) -> Vec<Hash256> {
        self.ancestor_chain(tip)
            .iter()
            .flat_map(|&id| self.segment(id).local_block_hashes_by_timestamps(timestamp_begin, seconds_count))
            .collect()
    }

    /// Collects up to `count` scalars walking backward from `as_of_height`
    /// (inclusive), oldest-first — the shared shape behind
    /// `getLastTimestamps`/`getLastBlocksSizes`/`getLastCumulativeDifficulties`.
    fn last_n_scalars<T>(
        &self,
        tip: SegmentId,
        as_of_height: u32,
        count: usize,
        extract: impl Fn(&crate::indices::CachedBlockInfo) -> T,
    ) -> Vec<T> {
        let mut out = Vec::with_capacity(count);
        let mut height = as_of_height;
        loop {
            let Some(info) = self.get_block_info(tip, height) else { break };
            out.push(extract(info));
            if out.len() >= count || height == 0 {
                break;
            }
            height -= 1;
        }
        out.reverse();
        out
    }

    #[must_use]
    pub fn get_last_timestamps(&self, tip: SegmentId, as_of_height: u32, count: usize) -> Vec<u64> {
        self.last_n_scalars(tip, as_of_height, count, |info| info.timestamp)
    }

    #[must_use]
    pub fn get_last_block_sizes(&self, tip: SegmentId, as_of_height: u32, count: usize) -> Vec<usize> {
        self.last_n_scalars(tip, as_of_height, count, |info| info.block_size)
    }

    #[must_use]
    pub fn get_last_cumulative_difficulties(&self, tip: SegmentId, as_of_height: u32, count: usize) -> Vec<u128> {
        self.last_n_scalars(tip, as_of_height, count, |info| info.cumulative_difficulty)
    }

    /// `getDifficultyForNextBlock`: assembles the
    /// trailing timestamp/cumulative-difficulty windows this segment's tip
    /// needs and dispatches to [`crate::currency::Currency::next_difficulty`].
    #[must_use]
    pub fn get_difficulty_for_next_block(&self, tip: SegmentId, currency: &crate::currency::Currency, major_version: u8) -> u128 {
        let next_block_index = self.segment(tip).top_block_index().map_or(0, |top| top + 1);
        let window = currency.config().difficulty_blocks_count_for(major_version) as u32;
        let from = next_block_index.saturating_sub(window);
        let count = (next_block_index - from) as usize;
        if next_block_index == 0 {
            return 1;
        }
        let timestamps = self.get_last_timestamps(tip, next_block_index - 1, count);
        let cumulative_difficulties = self.get_last_cumulative_difficulties(tip, next_block_index - 1, count);
        currency.next_difficulty(major_version, next_block_index, &timestamps, &cumulative_difficulties)
    }

    /// `pushBlock` dispatched to a specific segment (used both for the
    /// main-chain tip and for an alternative tip during the reorg
    /// protocol). The caller is responsible for validating the block
    /// *before* calling this — this only maintains indices.
    #[allow(clippy::too_many_arguments)]
    pub fn push_block_to(
        &mut self,
        segment: SegmentId,
        cached_block: &CachedBlock,
        cached_transactions: &[CachedTransaction],
        validator_state: &TransactionValidatorState,
        block_size: usize,
        generated_coins: u64,
        block_difficulty: u128,
        raw_block: RawBlock,
    ) -> Result<u32> {
        let parent = self.parent_of(segment);
        let parent_ctx = parent.map(|p| AncestorContext { arena: self, segment: p });
        let parent_ctx_ref: Option<&dyn ParentContext> = parent_ctx.as_ref().map(|c| c as &dyn ParentContext);

        let cache = &mut self.nodes[segment.0].cache;
        cache.push_block(
            cached_block,
            cached_transactions,
            validator_state,
            block_size,
            generated_coins,
            block_difficulty,
            raw_block,
            parent_ctx_ref,
        )
    }

    fn pushed_block_info(&self, segment: SegmentId, block_index: u32) -> Result<PushedBlockInfo> {
        let parent = self.parent_of(segment);
        let parent_ctx = parent.map(|p| AncestorContext { arena: self, segment: p });
        let parent_ctx_ref: Option<&dyn ParentContext> = parent_ctx.as_ref().map(|c| c as &dyn ParentContext);
        self.segment(segment).get_pushed_block_info(block_index, parent_ctx_ref)
    }

    /// `split(segment, splitBlockIndex)`: splits
    /// one segment's local indices and re-parents its existing children
    /// onto the new upper segment (the children's blocks are all above
    /// `splitBlockIndex` by construction, since a segment's children only
    /// ever start above its own tip). Returns the new segment's id.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`BlockchainCache::split`].
    pub fn split(&mut self, segment: SegmentId, split_block_index: u32) -> SegmentId {
        // Captured before `allocate` so the new segment's own child-of-`segment`
        // link (added by `allocate`) is never swept up as one of the
        // children being re-parented onto it.
        let old_children = std::mem::take(&mut self.node_mut(segment).children);

        let upper_cache = self.node_mut(segment).cache.split(split_block_index);
        let upper_id = self.allocate(upper_cache, Some(segment));

        for child in old_children {
            self.node_mut(child).parent = Some(upper_id);
            self.node_mut(upper_id).children.push(child);
        }

        if self.main_tip == segment {
            self.main_tip = upper_id;
        }

        upper_id
    }

    /// Starts a fresh alternative segment branching off `parent` at
    /// `parent`'s current tip: the first block of a competing chain
    /// creates a new segment whose parent is the common ancestor.
    pub fn new_alternative_segment(&mut self, parent: SegmentId) -> SegmentId {
        let start_index = self.segment(parent).top_block_index().map_or(0, |top| top + 1);
        self.allocate(BlockchainCache::new(start_index), Some(parent))
    }

    /// `switchToAlternativeBlockchain`: compares cumulative
    /// difficulty at `alternative`'s tip against the current main tip; if
    /// greater, replays blocks from the common ancestor onto the
    /// alternative and promotes it to `main_tip`. Returns whether the
    /// switch happened.
    ///
    /// The "replay" here is bookkeeping only — `alternative` already has
    /// every block above the common ancestor pushed onto it by the
    /// caller's ordinary `push_block_to` calls as they arrived; switching
    /// is just a pointer swing, not a rebuild, since both branches have
    /// maintained their own independent indices all along, so there is no
    /// need to replay into a single mutable chain.
    #[must_use]
    pub fn switch_to_alternative(&mut self, alternative: SegmentId) -> bool {
        let Some(alt_top) = self.segment(alternative).top_block_index() else {
            return false;
        };
        let Some(alt_info) = self.get_block_info(alternative, alt_top) else {
            return false;
        };
        let Some(main_top) = self.segment(self.main_tip).top_block_index() else {
            self.main_tip = alternative;
            return true;
        };
        let Some(main_info) = self.get_block_info(self.main_tip, main_top) else {
            self.main_tip = alternative;
            return true;
        };
        if alt_info.cumulative_difficulty > main_info.cumulative_difficulty {
            self.main_tip = alternative;
            true
        } else {
            false
        }
    }

    /// Replays the blocks of `source` (from `from_block_index` onward) onto
    /// `target` by reconstructing their [`PushedBlockInfo`] and reapplying
    /// it — used to recover after a failed reorg attempt leaves `target`
    /// short of where it should be, mirroring `original_source`'s
    /// rollback-on-failure branch in `switchToAlternativeBlockchain`.
    ///
    /// # Errors
    ///
    /// Propagates any error `get_pushed_block_info` raises for a missing
    /// block.
    pub fn replay_onto(&self, source: SegmentId, from_block_index: u32) -> Result<Vec<PushedBlockInfo>> {
        let top = self.segment(source).top_block_index().unwrap_or(from_block_index.saturating_sub(1));
        let mut infos = Vec::new();
        let mut height = from_block_index;
        while height <= top {
            infos.push(self.pushed_block_info(source, height)?);
            height += 1;
        }
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, BlockHeader, BLOCK_MAJOR_VERSION_1};
    use crate::transaction::{Transaction, TxInput, TxOutput, TxOutputTarget};
    use shared::PublicKey;

    fn miner_tx_with_key_output(amount: u64, seed: u8) -> Transaction {
        Transaction {
            version: 1,
            unlock_time: 0,
            inputs: vec![TxInput::Base { height: 0 }],
            outputs: vec![TxOutput { amount, target: TxOutputTarget::Key { key: PublicKey::from_bytes([seed; 32]) } }],
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

    fn push(arena: &mut SegmentArena, segment: SegmentId, amount: u64, seed: u8, nonce: u32, prev_hash: Hash256) -> (u32, Hash256) {
        let cached_block = block_with_miner_tx(miner_tx_with_key_output(amount, seed), prev_hash, nonce);
        let id = cached_block.id();
        let index = arena
            .push_block_to(
                segment,
                &cached_block,
                &[],
                &TransactionValidatorState::new(),
                100,
                1000,
                10,
                RawBlock::default(),
            )
            .unwrap();
        (index, id)
    }

    #[test]
    fn recursive_lookup_finds_block_in_ancestor_segment() {
        let (mut arena, root) = SegmentArena::new();
        let (_, hash0) = push(&mut arena, root, 100, 1, 0, Hash256::zero());
        let split = arena.split(root, 1);
        let (_, hash1) = push(&mut arena, split, 100, 2, 1, hash0);

        assert!(arena.has_block(split, &hash0));
        assert!(arena.has_block(split, &hash1));
        assert_eq!(arena.get_block_index(split, &hash0), Some(0));
        assert_eq!(arena.get_block_index(split, &hash1), Some(1));
    }

    // Split preserves global indices across the tree, not just within one
    // segment.
    #[test]
    fn global_indexes_remain_stable_across_a_split() {
        let (mut arena, root) = SegmentArena::new();
        let mut prev_hash = Hash256::zero();
        for i in 0..4u32 {
            let (_, hash) = push(&mut arena, root, 100, i as u8 + 1, i, prev_hash);
            prev_hash = hash;
        }
        let before = arena.get_key_outputs_count_for_amount(root, 100, 4);
        let upper = arena.split(root, 2);
        let after = arena.get_key_outputs_count_for_amount(upper, 100, 4);
        assert_eq!(before, after);
        assert_eq!(after, 4);
    }

    // A key image spent in a parent segment is visible from a child tip,
    // and "as of" a height before the spend reports unspent.
    #[test]
    fn key_image_spent_in_parent_is_visible_from_child_tip() {
        let (mut arena, root) = SegmentArena::new();
        let image = KeyImage::from_bytes([3u8; 32]);

        let (_, hash0) = push(&mut arena, root, 100, 1, 0, Hash256::zero());

        let spending_block = block_with_miner_tx(miner_tx_with_key_output(100, 2), hash0, 1);
        let mut state = TransactionValidatorState::new();
        state.add_key_image(image);
        arena
            .push_block_to(root, &spending_block, &[], &state, 100, 1000, 10, RawBlock::default())
            .unwrap();

        let alt = arena.new_alternative_segment(root);
        assert!(arena.check_if_spent(alt, &image, 1));
        assert!(!arena.check_if_spent(alt, &image, 0));
    }

    // A higher-difficulty alternative branch becomes the main tip.
    #[test]
    fn switch_to_alternative_promotes_higher_difficulty_branch() {
        let (mut arena, root) = SegmentArena::new();
        let mut prev_hash = Hash256::zero();
        let (_, hash0) = push(&mut arena, root, 100, 1, 0, prev_hash);
        prev_hash = hash0;
        push(&mut arena, root, 100, 2, 1, prev_hash);

        let alt = arena.new_alternative_segment(root);
        let mut alt_state_prev = hash0;
        for i in 0..3u32 {
            let (_, hash) = push(&mut arena, alt, 100, 10 + i as u8, 100 + i, alt_state_prev);
            alt_state_prev = hash;
        }

        assert_eq!(arena.main_tip(), root);
        let switched = arena.switch_to_alternative(alt);
        assert!(switched);
        assert_eq!(arena.main_tip(), alt);
    }

    #[test]
    fn splitting_reparents_existing_children_onto_the_new_segment() {
        let (mut arena, root) = SegmentArena::new();
        let mut prev_hash = Hash256::zero();
        for i in 0..4u32 {
            let (_, hash) = push(&mut arena, root, 100, i as u8 + 1, i, prev_hash);
            prev_hash = hash;
        }
        let first_split = arena.split(root, 2);
        assert_eq!(arena.children_of(root), &[first_split]);

        let second_split = arena.split(root, 1);
        assert_eq!(arena.parent_of(first_split), Some(second_split));
        assert!(arena.children_of(second_split).contains(&first_split));
    }

    #[test]
    fn random_outs_by_amount_draws_unique_indexes_without_exceeding_count() {
        let (mut arena, root) = SegmentArena::new();
        let mut prev_hash = Hash256::zero();
        for i in 0..10u32 {
            let (_, hash) = push(&mut arena, root, 100, i as u8 + 1, i, prev_hash);
            prev_hash = hash;
        }

        let drawn = arena.get_random_outs_by_amount(root, 100, 4, 10, 0, 0, 500_000_000, [7u8; 32]);
        assert_eq!(drawn.len(), 4);
        let unique: std::collections::HashSet<_> = drawn.iter().collect();
        assert_eq!(unique.len(), 4);

        let full_pool = arena.eligible_key_output_indexes(root, 100, 10, 0, 0, 500_000_000);
        assert!(drawn.iter().all(|index| full_pool.contains(index)));
    }

    #[test]
    fn random_outs_by_amount_is_capped_at_the_eligible_pool_size() {
        let (mut arena, root) = SegmentArena::new();
        let (_, _) = push(&mut arena, root, 100, 1, 0, Hash256::zero());

        let drawn = arena.get_random_outs_by_amount(root, 100, 50, 1, 0, 0, 500_000_000, [1u8; 32]);
        assert_eq!(drawn.len(), 1);
    }

    #[test]
    fn random_outs_by_amount_is_deterministic_for_a_fixed_seed() {
        let (mut arena, root) = SegmentArena::new();
        let mut prev_hash = Hash256::zero();
        for i in 0..10u32 {
            let (_, hash) = push(&mut arena, root, 100, i as u8 + 1, i, prev_hash);
            prev_hash = hash;
        }

        let first = arena.get_random_outs_by_amount(root, 100, 5, 10, 0, 0, 500_000_000, [9u8; 32]);
        let second = arena.get_random_outs_by_amount(root, 100, 5, 10, 0, 0, 500_000_000, [9u8; 32]);
        assert_eq!(first, second);
    }
}
