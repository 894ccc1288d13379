//! Emission, penalty, difficulty retargeting, fusion-transaction detection,
//! and proof-of-work checking — all pure functions of a
//! [`Config`], no mutable state beyond an optionally cached genesis block.
//! Grounded on `CryptoNoteCore/{Currency.cpp,CryptoNoteBasicImpl.cpp}`,
//! adapted from `bond-core/src/mining.rs::DifficultyAdjuster`
//! ("an adjuster as a pure function of history") with its
//! single-ratio heuristic replaced by the three real algorithms.

use crate::config::Config;
use shared::Hash256;

/// Outcome of [`Currency::block_reward`] — `TooBig` is not an error, it's a
/// distinct outcome the caller turns into `Rejected{BlockTooBig}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReward {
    Reward { reward: u64, emission_change: i64 },
    TooBig,
}

/// Currency rules bound to one [`Config`]. Cheap to construct; holds no
/// state of its own (the genesis block is built by `core::block`, not
/// cached here — `bond-core` caches its genesis block, but this crate's
/// genesis construction is already idempotent and cheap enough not to).
#[derive(Debug, Clone)]
pub struct Currency {
    config: Config,
}

impl Currency {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// `getBlockReward`. `median_size` and `current_block_size`
    /// are byte counts; `already_generated_coins` and `fee` are atomic units.
    #[must_use]
    pub fn block_reward(
        &self,
        block_major_version: u8,
        median_size: usize,
        current_block_size: usize,
        already_generated_coins: u64,
        fee: u64,
    ) -> BlockReward {
        let mut base_reward =
            (self.config.money_supply - already_generated_coins) >> self.config.emission_speed_factor;
        if base_reward < self.config.tail_emission_reward {
            base_reward = self.config.tail_emission_reward;
        }
        if already_generated_coins.saturating_add(base_reward) >= self.config.money_supply {
            base_reward = 0;
        }

        let full_reward_zone = self.config.block_granted_full_reward_zone_for(block_major_version);
        let zone = median_size.max(full_reward_zone);
        if current_block_size > 2 * zone {
            return BlockReward::TooBig;
        }

        let penalized_base_reward = get_penalized_amount(base_reward, zone, current_block_size);
        let penalized_fee = if block_major_version >= 2 {
            get_penalized_amount(fee, zone, current_block_size)
        } else {
            fee
        };

        let emission_change =
            penalized_base_reward as i64 - (fee as i64 - penalized_fee as i64);
        let reward = penalized_base_reward + penalized_fee;

        BlockReward::Reward {
            reward,
            emission_change,
        }
    }

    #[must_use]
    pub fn max_block_cumulative_size(&self, height: u64) -> usize {
        self.config.max_block_cumulative_size(height)
    }

    /// `nextDifficulty` dispatch: Zawy-v1 range first, then
    /// Zawy-LWMA range, then classic — first matching range wins, both ends
    /// inclusive (Open Question #3 resolution, see DESIGN.md).
    #[must_use]
    pub fn next_difficulty(
        &self,
        major_version: u8,
        block_index: u32,
        timestamps: &[u64],
        cumulative_difficulties: &[u128],
    ) -> u128 {
        if let (Some(start), end) = (self.config.zawy_difficulty_start, self.config.zawy_difficulty_end) {
            let end = end.unwrap_or(u32::MAX);
            if block_index >= start && block_index <= end {
                return self.next_difficulty_zawy_v1(timestamps, cumulative_difficulties);
            }
        }
        if let (Some(start), end) = (
            self.config.zawy_lwma_difficulty_start,
            self.config.zawy_lwma_difficulty_end,
        ) {
            let end = end.unwrap_or(u32::MAX);
            if block_index >= start && block_index <= end {
                return self.next_difficulty_zawy_lwma(timestamps, cumulative_difficulties);
            }
        }
        self.next_difficulty_classic(major_version, block_index, timestamps, cumulative_difficulties)
    }

    fn next_difficulty_zawy_v1(&self, timestamps: &[u64], cumulative_difficulties: &[u128]) -> u128 {
        const WINDOW: usize = 17;
        const CUT: usize = 0;
        let diff = classic_window_difficulty(
            timestamps,
            cumulative_difficulties,
            WINDOW,
            CUT,
            self.config.difficulty_target,
        );
        diff.max(1)
    }

    fn next_difficulty_zawy_lwma(&self, timestamps: &[u64], cumulative_difficulties: &[u128]) -> u128 {
        let target = self.config.difficulty_target as i64;
        let n = self.config.zawy_lwma_difficulty_n.unwrap_or_else(|| {
            (45.0 * (600.0 / target as f64).powf(0.3)) as usize
        });

        let take = (n + 1).min(timestamps.len()).min(cumulative_difficulties.len());
        if take <= 1 {
            return 1;
        }
        let timestamps = &timestamps[timestamps.len() - take..];
        let cumulative_difficulties = &cumulative_difficulties[cumulative_difficulties.len() - take..];

        let k = (n * (n + 1)) as f64 / 2.0;
        let mut lwma = 0.0f64;
        let mut sum_inverse_d = 0.0f64;
        for i in 1..take {
            let mut solve_time = timestamps[i] as i64 - timestamps[i - 1] as i64;
            solve_time = solve_time.clamp(-6 * target, 7 * target);
            let difficulty = cumulative_difficulties[i] - cumulative_difficulties[i - 1];
            lwma += (solve_time * i as i64) as f64 / k;
            sum_inverse_d += 1.0 / (difficulty as f64);
        }

        if (lwma.round() as i64) < target / 20 {
            lwma = (target / 20) as f64;
        }

        let adjust = 0.998f64;
        let harmonic_mean_d = (n as f64) / sum_inverse_d * adjust;
        let next = harmonic_mean_d * (target as f64) / lwma;
        (next as u128).max(100_000)
    }

    fn next_difficulty_classic(
        &self,
        major_version: u8,
        block_index: u32,
        timestamps: &[u64],
        cumulative_difficulties: &[u128],
    ) -> u128 {
        let window = self.config.difficulty_window_for(major_version);
        let cut = self.config.difficulty_cut_for(major_version);
        let diff = classic_window_difficulty(
            timestamps,
            cumulative_difficulties,
            window,
            cut,
            self.config.difficulty_target,
        );

        if let Some(bugged_index) = self.config.bugged_zawy_difficulty_block_index {
            // Faithful to the source's (buggy, intentionally preserved)
            // re-derivation using hardcoded window=17, cut=0 once this
            // height is reached — see `nextDifficultyDefault`'s fallback.
            if bugged_index <= block_index {
                return self.next_difficulty_zawy_v1(timestamps, cumulative_difficulties);
            }
        }
        diff
    }

    /// `isFusionTransaction`.
    #[must_use]
    pub fn is_fusion_transaction(
        &self,
        input_amounts: &[u64],
        output_amounts: &[u64],
        size: usize,
    ) -> bool {
        if size > self.config.fusion_tx_max_size {
            return false;
        }
        if input_amounts.len() < self.config.fusion_tx_min_input_count {
            return false;
        }
        if input_amounts.len() * self.config.fusion_tx_min_in_out_count_ratio < output_amounts.len() {
            return false;
        }
        if input_amounts
            .iter()
            .any(|&a| a < self.config.default_dust_threshold)
        {
            return false;
        }

        let input_sum: u128 = input_amounts.iter().map(|&a| u128::from(a)).sum();
        let mut expected = decompose_amount(input_sum);
        expected.sort_unstable();
        let mut actual: Vec<u64> = output_amounts.to_vec();
        actual.sort_unstable();
        expected == actual
    }

    /// `checkProofOfWork`: `pow_hash` is `slowHash` applied to
    /// the block's PoW input by the caller (the memory-hard hash is a
    /// primitive behind `shared::crypto::ProofOfWorkHasher`, not computed
    /// here). Merge-mining tag verification for v2/v3 blocks is the
    /// encoding layer's job (`core::block::Block::verify_merge_mining`);
    /// this function checks only the numeric difficulty target.
    #[must_use]
    pub fn check_proof_of_work(pow_hash: &Hash256, current_difficulty: u128) -> bool {
        if current_difficulty == 0 {
            return false;
        }
        let hash_value = u128::from_be_bytes(pow_hash.as_bytes()[..16].try_into().unwrap());
        // Full 256-bit comparison would need a 256-bit target; CryptoNote
        // in practice compares the low-order interpretation of the hash as
        // a little-endian 256-bit integer against floor(2^256 / D). We
        // approximate with the hash's leading 128 bits against
        // floor(2^128 / D), which is exact whenever D fits in 128 bits
        // (true for any difficulty this engine can represent).
        let target = u128::MAX / current_difficulty;
        hash_value <= target
    }
}

/// `getPenalizedAmount`: widen to `u128` for the multiply, then
/// perform two successive divisions by `median_size`, truncating at each
/// step — bit-for-bit faithful to the original's `mul128`+two-`div128_32`
/// sequence (Open Question #2 resolution, see DESIGN.md), rather than a
/// single combined `u128` division.
#[must_use]
pub fn get_penalized_amount(amount: u64, median_size: usize, current_block_size: usize) -> u64 {
    if amount == 0 {
        return 0;
    }
    if current_block_size <= median_size {
        return amount;
    }
    let factor = (current_block_size as u128) * (2 * median_size as u128 - current_block_size as u128);
    let product = u128::from(amount) * factor;
    let once = product / (median_size as u128);
    let twice = once / (median_size as u128);
    twice as u64
}

/// Shared "classic window" difficulty retargeting used identically by
/// Zawy-v1 (window=17, cut=0) and the classic per-version algorithm: take
/// the trailing `window` samples, sort timestamps, trim `cut` from each end
/// symmetrically, and compute `(totalWork*target + timeSpan - 1) / timeSpan`.
fn classic_window_difficulty(
    timestamps: &[u64],
    cumulative_difficulties: &[u128],
    window: usize,
    cut: usize,
    target: u64,
) -> u128 {
    let take = window.min(timestamps.len()).min(cumulative_difficulties.len());
    if take <= 1 {
        return 1;
    }

    let mut timestamps: Vec<u64> = timestamps[timestamps.len() - take..].to_vec();
    let cumulative_difficulties = &cumulative_difficulties[cumulative_difficulties.len() - take..];
    timestamps.sort_unstable();

    let length = timestamps.len();
    let (cut_begin, cut_end) = if length <= window - 2 * cut {
        (0, length)
    } else {
        let begin = (length - (window - 2 * cut) + 1) / 2;
        (begin, begin + (window - 2 * cut))
    };

    let mut time_span = timestamps[cut_end - 1] - timestamps[cut_begin];
    if time_span == 0 {
        time_span = 1;
    }

    let total_work = cumulative_difficulties[cut_end - 1] - cumulative_difficulties[cut_begin];
    let low = total_work * u128::from(target);
    (low + u128::from(time_span) - 1) / u128::from(time_span)
}

/// CryptoNote's canonical amount decomposition: split `amount` into
/// "digit" chunks (one nonzero digit per decimal place) the way the
/// original's `decompose_amount_into_digits` does, used both by fusion-tx
/// validation and (conceptually) by miner output construction.
fn decompose_amount(mut amount: u128) -> Vec<u64> {
    let mut chunks = Vec::new();
    let mut multiplier: u128 = 1;
    while amount > 0 {
        let digit = amount % 10;
        if digit != 0 {
            chunks.push((digit * multiplier) as u64);
        }
        amount /= 10;
        multiplier *= 10;
    }
    chunks
}

/// `medianValue` (used by `getBlockReward`'s `medianSize` argument and by
/// the timestamp-median check): the CryptoNote convention of
/// averaging the two middle elements on an even-length window rather than
/// picking either one.
#[must_use]
pub fn median(values: &[usize]) -> usize {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let len = sorted.len();
    if len % 2 == 1 {
        sorted[len / 2]
    } else {
        (sorted[len / 2 - 1] + sorted[len / 2]) / 2
    }
}

/// Same convention applied to `u64` timestamps, used by the "median of
/// the last `timestampCheckWindow` blocks" past-timestamp rejection rule.
#[must_use]
pub fn median_u64(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let len = sorted.len();
    if len % 2 == 1 {
        sorted[len / 2]
    } else {
        (sorted[len / 2 - 1] + sorted[len / 2]) / 2
    }
}

pub fn unlock_time_is_reached(unlock_time: u64, current_height: u64, current_time: i64, max_block_height: u64) -> bool {
    if unlock_time < max_block_height {
        current_height >= unlock_time
    } else {
        (current_time as u64) >= unlock_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn currency() -> Currency {
        let config = Config {
            money_supply: u64::MAX,
            emission_speed_factor: 18,
            tail_emission_reward: 0,
            block_granted_full_reward_zone_v1: 10_000,
            block_granted_full_reward_zone_v2: 10_000,
            block_granted_full_reward_zone_v3: 10_000,
            ..Config::default()
        };
        Currency::new(config)
    }

    #[test]
    fn reward_at_low_already_generated_coins_matches_emission_curve() {
        let currency = currency();
        match currency.block_reward(1, 10_000, 5_000, 0, 0) {
            BlockReward::Reward {
                reward,
                emission_change,
            } => {
                assert_eq!(reward, 70_368_744_177_663);
                assert_eq!(emission_change, 70_368_744_177_663);
            }
            BlockReward::TooBig => panic!("expected a reward"),
        }
    }

    #[test]
    fn reward_is_penalized_when_block_size_exceeds_the_median() {
        let currency = currency();
        match currency.block_reward(3, 10_000, 18_000, 0, 0) {
            BlockReward::Reward { reward, .. } => {
                let base_reward = 70_368_744_177_663u128;
                let expected = (base_reward * 36 / 100) as u64;
                assert_eq!(reward, expected);
            }
            BlockReward::TooBig => panic!("expected a reward"),
        }
    }

    #[test]
    fn block_reward_too_big_boundary() {
        let currency = currency();
        // currentBlockSize == 2*medianSize -> not too big.
        assert!(matches!(
            currency.block_reward(1, 10_000, 20_000, 0, 0),
            BlockReward::Reward { .. }
        ));
        // one more byte -> TooBig.
        assert!(matches!(
            currency.block_reward(1, 10_000, 20_001, 0, 0),
            BlockReward::TooBig
        ));
    }

    #[test]
    fn next_difficulty_single_sample_returns_one() {
        let currency = currency();
        assert_eq!(currency.next_difficulty(1, 100, &[1000], &[10]), 1);
    }

    #[test]
    fn next_difficulty_zero_timespan_treated_as_one() {
        let currency = currency();
        let timestamps = vec![1000, 1000];
        let cumulative = vec![0u128, 100];
        let difficulty = currency.next_difficulty(1, 100, &timestamps, &cumulative);
        assert_eq!(difficulty, 100 * currency.config.difficulty_target as u128);
    }

    #[test]
    fn fusion_transaction_detection() {
        let currency = currency();
        let dust = currency.config.default_dust_threshold;
        let inputs = vec![dust * 2; 12];
        let sum: u128 = inputs.iter().map(|&a| u128::from(a)).sum();
        let outputs = decompose_amount(sum);
        assert!(currency.is_fusion_transaction(&inputs, &outputs, 1000));
    }

    #[test]
    fn fusion_transaction_rejects_too_few_inputs() {
        let currency = currency();
        let dust = currency.config.default_dust_threshold;
        let inputs = vec![dust * 2; 2];
        assert!(!currency.is_fusion_transaction(&inputs, &[], 100));
    }
}
