//! Explorer-facing read models (`BlockDetails`/`TransactionDetails`):
//! pure, allocation-light views built from a [`crate::block::Block`]/
//! [`crate::transaction::Transaction`] plus the per-block and per-segment
//! facts a [`crate::cache::BlockchainCache`] already tracks. `bond-core`
//! has no block-explorer surface to ground this on directly; grounded on
//! `original_source/src/CryptoNoteCore/Currency.h`'s `getBlockReward` for
//! the `penalty`/`baseReward` relationship, and on the explorer's field
//! list, which this module reproduces verbatim as struct fields.

use crate::currency::{BlockReward, Currency};
use crate::transaction::{Transaction, TxInput, TxOutput};
use shared::{Hash256, Signature};

/// `TransactionDetails`, field-for-field.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDetails {
    pub hash: Hash256,
    pub size: usize,
    pub fee: u64,
    pub total_inputs_amount: u128,
    pub total_outputs_amount: u128,
    /// Largest ring size across the transaction's `Key` inputs; 0 for a
    /// miner transaction.
    pub mixin: usize,
    pub unlock_time: u64,
    pub timestamp: u64,
    pub payment_id: Option<Hash256>,
    pub in_blockchain: bool,
    pub block_hash: Option<Hash256>,
    pub block_height: Option<u32>,
    pub extra: Vec<u8>,
    pub signatures: Vec<Vec<Signature>>,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

/// Builds a [`TransactionDetails`] view. `hash`/`size` are the caller's
/// already-computed [`crate::cached::CachedTransaction`] values (this
/// function takes them directly rather than a `CachedTransaction` so it
/// has no dependency on the cache layer); `block_timestamp` is the
/// containing block's timestamp, or the pool-arrival time for an
/// unconfirmed transaction.
#[must_use]
pub fn transaction_details(
    transaction: &Transaction,
    hash: Hash256,
    size: usize,
    block_timestamp: u64,
    location: Option<(Hash256, u32)>,
) -> TransactionDetails {
    let fee = transaction.fee().unwrap_or(0);
    let mixin = transaction
        .inputs
        .iter()
        .map(|input| match input {
            TxInput::Key {
                relative_output_offsets,
                ..
            } => relative_output_offsets.len(),
            _ => 0,
        })
        .max()
        .unwrap_or(0);

    TransactionDetails {
        hash,
        size,
        fee,
        total_inputs_amount: transaction.input_amounts_sum(),
        total_outputs_amount: transaction.output_amounts_sum(),
        mixin,
        unlock_time: transaction.unlock_time,
        timestamp: block_timestamp,
        payment_id: transaction.payment_id(),
        in_blockchain: location.is_some(),
        block_hash: location.map(|(hash, _)| hash),
        block_height: location.map(|(_, height)| height),
        extra: transaction.extra.clone(),
        signatures: transaction.signatures.clone(),
        inputs: transaction.inputs.clone(),
        outputs: transaction.outputs.clone(),
    }
}

/// `BlockDetails`, field-for-field.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDetails {
    pub major_version: u8,
    pub minor_version: u8,
    pub timestamp: u64,
    pub prev_block_hash: Hash256,
    pub nonce: u32,
    pub is_orphaned: bool,
    pub height: u32,
    pub hash: Hash256,
    pub difficulty: u128,
    pub reward: u64,
    pub base_reward: u64,
    pub block_size: usize,
    pub transactions_cumulative_size: usize,
    pub already_generated_coins: u64,
    pub already_generated_transactions: u64,
    pub size_median: usize,
    /// `(baseReward - reward) / baseReward`, or `0.0` when `baseReward ==
    /// 0`.
    pub penalty: f64,
    pub total_fee_amount: u64,
    pub transactions: Vec<TransactionDetails>,
}

/// Parameters a caller already has in hand from the cache/protocol layer
/// when it wants to materialize a block view; kept as a distinct struct
/// rather than a long parameter list since several fields (difficulty,
/// size_median, already-generated totals) come from different sources.
pub struct BlockDetailsInput<'a> {
    pub major_version: u8,
    pub minor_version: u8,
    pub timestamp: u64,
    pub prev_block_hash: Hash256,
    pub nonce: u32,
    pub is_orphaned: bool,
    pub height: u32,
    pub hash: Hash256,
    pub difficulty: u128,
    pub block_size: usize,
    pub size_median: usize,
    pub already_generated_coins: u64,
    pub already_generated_transactions: u64,
    pub transactions: &'a [TransactionDetails],
}

/// Builds a [`BlockDetails`] view, recomputing `reward`/`baseReward`/
/// `penalty` from [`Currency::block_reward`] using
/// `already_generated_coins` *before* this block (`penalty`'s
/// definition requires the reward actually used, not a re-derived one,
/// so callers that already know the applied reward should prefer
/// constructing `BlockDetails` directly over this helper when the two
/// could diverge, e.g. a tail-emission block).
#[must_use]
pub fn block_details(
    currency: &Currency,
    input: BlockDetailsInput<'_>,
    already_generated_coins_before: u64,
) -> BlockDetails {
    let total_fee_amount = input.transactions.iter().map(|t| t.fee).sum();
    let transactions_cumulative_size = input.transactions.iter().map(|t| t.size).sum();

    let (reward, base_reward) = match currency.block_reward(
        input.major_version,
        input.size_median,
        input.block_size,
        already_generated_coins_before,
        total_fee_amount,
    ) {
        BlockReward::Reward { reward, .. } => {
            let uncapped_base_reward =
                (currency.config().money_supply - already_generated_coins_before)
                    >> currency.config().emission_speed_factor;
            let base_reward = uncapped_base_reward.max(currency.config().tail_emission_reward);
            (reward, base_reward)
        }
        BlockReward::TooBig => (0, 0),
    };

    let penalty = if base_reward > 0 {
        (base_reward as f64 - reward as f64) / base_reward as f64
    } else {
        0.0
    };

    BlockDetails {
        major_version: input.major_version,
        minor_version: input.minor_version,
        timestamp: input.timestamp,
        prev_block_hash: input.prev_block_hash,
        nonce: input.nonce,
        is_orphaned: input.is_orphaned,
        height: input.height,
        hash: input.hash,
        difficulty: input.difficulty,
        reward,
        base_reward,
        block_size: input.block_size,
        transactions_cumulative_size,
        already_generated_coins: input.already_generated_coins,
        already_generated_transactions: input.already_generated_transactions,
        size_median: input.size_median,
        penalty,
        total_fee_amount,
        transactions: input.transactions.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::transaction::{TxInput, TxOutput, TxOutputTarget};
    use shared::PublicKey;

    fn miner_tx() -> Transaction {
        Transaction {
            version: 1,
            unlock_time: 0,
            inputs: vec![TxInput::Base { height: 0 }],
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

    #[test]
    fn miner_transaction_has_zero_mixin() {
        let details = transaction_details(&miner_tx(), Hash256::zero(), 100, 1_600_000_000, None);
        assert_eq!(details.mixin, 0);
        assert!(!details.in_blockchain);
    }

    #[test]
    fn key_input_mixin_is_ring_size() {
        let tx = Transaction {
            version: 1,
            unlock_time: 0,
            inputs: vec![TxInput::Key {
                amount: 100,
                relative_output_offsets: vec![1, 2, 3, 4, 5],
                key_image: shared::KeyImage::from_bytes([2u8; 32]),
            }],
            outputs: vec![],
            extra: Vec::new(),
            signatures: vec![vec![]],
        };
        let details = transaction_details(
            &tx,
            Hash256::zero(),
            200,
            1_600_000_000,
            Some((Hash256::fast_hash(b"block"), 10)),
        );
        assert_eq!(details.mixin, 5);
        assert!(details.in_blockchain);
        assert_eq!(details.block_height, Some(10));
    }

    #[test]
    fn penalty_is_zero_when_base_reward_is_zero() {
        let config = Config::builder().money_supply(0).finish();
        let currency = Currency::new(config);
        let details = block_details(
            &currency,
            BlockDetailsInput {
                major_version: 1,
                minor_version: 0,
                timestamp: 0,
                prev_block_hash: Hash256::zero(),
                nonce: 0,
                is_orphaned: false,
                height: 0,
                hash: Hash256::zero(),
                difficulty: 1,
                block_size: 100,
                size_median: 10000,
                already_generated_coins: 0,
                already_generated_transactions: 1,
                transactions: &[],
            },
            0,
        );
        assert_eq!(details.penalty, 0.0);
    }
}
