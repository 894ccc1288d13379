//! `TransactionValidatorState`: the set of
//! outputs a block consumes, carried alongside the block so a reorg can
//! replay it onto another segment (`getPushedBlockInfo`).
//! Grounded on the literal record kept in
//! `original_source/src/CryptoNoteCore/BlockchainCache.cpp`'s
//! `addSpentKeyImage`/`addSpentMultisignature`, whose disabled assertions
//! (commented "changed to allow push from database cache") are resolved
//! here as an explicit contract: this type performs no in-block
//! double-spend check. That is the validator/protocol coordinator's job
//! *before* `BlockchainCache::push_block` is called.

use shared::KeyImage;

/// What one block spends: every key image its `KeyInput`s reference, and
/// every `(amount, globalIndex)` pair its `MultisignatureInput`s reference.
/// Built by the caller during validation, consumed by `push_block`, and
/// reconstructible from a pushed block via `get_pushed_block_info` so it
/// can be replayed after a reorg.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionValidatorState {
    /// Not deduplicated and not checked against itself here (Open Question
    /// #4) — the caller must reject a block whose own inputs double-spend
    /// before ever constructing this state.
    pub spent_key_images: Vec<KeyImage>,
    pub spent_multisignature_global_indexes: Vec<(u64, u64)>,
}

impl TransactionValidatorState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key_image(&mut self, key_image: KeyImage) {
        self.spent_key_images.push(key_image);
    }

    pub fn add_multisignature_spend(&mut self, amount: u64, global_index: u64) {
        self.spent_multisignature_global_indexes
            .push((amount, global_index));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spent_key_images.is_empty() && self.spent_multisignature_global_indexes.is_empty()
    }

    /// True iff `key_images` contains the same value more than once — the
    /// in-block check Open Question #4 says this type itself never
    /// performs; callers wanting it can opt in explicitly here.
    #[must_use]
    pub fn has_duplicate_key_image(&self) -> bool {
        for (i, a) in self.spent_key_images.iter().enumerate() {
            if self.spent_key_images[i + 1..].contains(a) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_state_reports_empty() {
        assert!(TransactionValidatorState::new().is_empty());
    }

    #[test]
    fn duplicate_key_image_is_detected_when_asked() {
        let mut state = TransactionValidatorState::new();
        let image = KeyImage::from_bytes([1u8; 32]);
        state.add_key_image(image);
        state.add_key_image(image);
        assert!(state.has_duplicate_key_image());
    }

    #[test]
    fn distinct_key_images_are_not_flagged_as_duplicate() {
        let mut state = TransactionValidatorState::new();
        state.add_key_image(KeyImage::from_bytes([1u8; 32]));
        state.add_key_image(KeyImage::from_bytes([2u8; 32]));
        assert!(!state.has_duplicate_key_image());
    }
}
