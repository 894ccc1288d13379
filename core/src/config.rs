//! `Config`/`ConfigBuilder`: every configuration-level knob the engine is
//! parameterized over, fluent builder matching
//! `obscura_core::config::ConfigBuilder`'s shape (`new()`, per-field
//! setters consuming and returning `Self`, `finish()`) since `bond-core`'s
//! own `NetworkParams` (`bond-core/src/blockchain.rs`) is a plain struct
//! with no builder.

/// Every currency/consensus constant the engine is parameterized over.
/// Defaults are mainnet-class CryptoNote-family values grounded in
/// `CryptoNoteCore/Currency.cpp`/`.h`; they are implementation choices
/// within the ranges the original uses, not asserted as wire-compatible
/// with any specific live network.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub max_block_height: u64,
    pub max_block_blob_size: usize,
    pub max_tx_size: usize,
    pub public_address_base58_prefix: u64,
    pub mined_money_unlock_window: u32,
    pub timestamp_check_window: usize,
    pub block_future_time_limit: i64,
    pub money_supply: u64,
    pub emission_speed_factor: u32,
    pub reward_blocks_window: usize,
    pub block_granted_full_reward_zone_v1: usize,
    pub block_granted_full_reward_zone_v2: usize,
    pub block_granted_full_reward_zone_v3: usize,
    pub miner_tx_blob_reserved_size: usize,
    pub max_transaction_size_limit: usize,
    pub number_of_decimal_places: u32,
    pub minimum_fee: u64,
    pub default_dust_threshold: u64,
    pub difficulty_target: u64,
    pub difficulty_window: usize,
    pub difficulty_window_v1: usize,
    pub difficulty_window_v2: usize,
    pub difficulty_lag: usize,
    pub difficulty_lag_v1: usize,
    pub difficulty_lag_v2: usize,
    pub difficulty_cut: usize,
    pub difficulty_cut_v1: usize,
    pub difficulty_cut_v2: usize,
    pub max_block_size_initial: usize,
    pub max_block_size_growth_speed_numerator: u64,
    pub max_block_size_growth_speed_denominator: u64,
    pub locked_tx_allowed_delta_seconds: i64,
    pub locked_tx_allowed_delta_blocks: u32,
    pub fusion_tx_max_size: usize,
    pub fusion_tx_min_input_count: usize,
    pub fusion_tx_min_in_out_count_ratio: usize,
    pub upgrade_height_v2: Option<u32>,
    pub upgrade_height_v3: Option<u32>,
    pub upgrade_voting_threshold: u32,
    pub upgrade_voting_window: u32,
    pub upgrade_window: u32,
    pub testnet: bool,
    pub genesis_coinbase_tx_hex: String,
    pub genesis_block_reward: u64,
    pub tail_emission_reward: u64,
    pub zawy_difficulty_start: Option<u32>,
    pub zawy_difficulty_end: Option<u32>,
    pub zawy_lwma_difficulty_start: Option<u32>,
    pub zawy_lwma_difficulty_end: Option<u32>,
    pub zawy_lwma_difficulty_n: Option<usize>,
    pub bugged_zawy_difficulty_block_index: Option<u32>,
    pub min_mixin: usize,
    pub mandatory_mixin_block_version: u8,
    pub mixin_start_height: Option<u32>,
    pub kill_height: Option<u32>,
    pub key_image_checking_block_index: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_block_height: 500_000_000,
            max_block_blob_size: 500_000_000,
            max_tx_size: 1_000_000_000,
            public_address_base58_prefix: 6_833_049, // "CryptoNote"-class varint prefix
            mined_money_unlock_window: 60,
            timestamp_check_window: 60,
            block_future_time_limit: 60 * 60 * 2,
            money_supply: u64::MAX,
            emission_speed_factor: 18,
            reward_blocks_window: 100,
            block_granted_full_reward_zone_v1: 10_000,
            block_granted_full_reward_zone_v2: 20_000,
            block_granted_full_reward_zone_v3: 20_000,
            miner_tx_blob_reserved_size: 600,
            max_transaction_size_limit: 20_000 / 2 - 600,
            number_of_decimal_places: 12,
            minimum_fee: 10_000_000,
            default_dust_threshold: 1_000_000,
            difficulty_target: 120,
            difficulty_window: 720,
            difficulty_window_v1: 720,
            difficulty_window_v2: 720,
            difficulty_lag: 15,
            difficulty_lag_v1: 15,
            difficulty_lag_v2: 15,
            difficulty_cut: 60,
            difficulty_cut_v1: 60,
            difficulty_cut_v2: 60,
            max_block_size_initial: 20_000,
            max_block_size_growth_speed_numerator: 100_000,
            max_block_size_growth_speed_denominator: 365 * 24 * 60 * 60 / 120,
            locked_tx_allowed_delta_seconds: 3 * 120,
            locked_tx_allowed_delta_blocks: 1,
            fusion_tx_max_size: 20_000 * 30 / 100,
            fusion_tx_min_input_count: 12,
            fusion_tx_min_in_out_count_ratio: 4,
            upgrade_height_v2: None,
            upgrade_height_v3: None,
            upgrade_voting_threshold: 90,
            upgrade_voting_window: 8192,
            upgrade_window: 8192,
            testnet: false,
            genesis_coinbase_tx_hex: String::new(),
            genesis_block_reward: 0,
            tail_emission_reward: 0,
            zawy_difficulty_start: None,
            zawy_difficulty_end: None,
            zawy_lwma_difficulty_start: None,
            zawy_lwma_difficulty_end: None,
            zawy_lwma_difficulty_n: None,
            bugged_zawy_difficulty_block_index: None,
            min_mixin: 0,
            mandatory_mixin_block_version: 3,
            mixin_start_height: None,
            kill_height: None,
            key_image_checking_block_index: None,
        }
    }
}

impl Config {
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    #[must_use]
    pub fn difficulty_window_for(&self, major_version: u8) -> usize {
        if major_version >= 3 {
            self.difficulty_window
        } else if major_version == 2 {
            self.difficulty_window_v2
        } else {
            self.difficulty_window_v1
        }
    }

    #[must_use]
    pub fn difficulty_lag_for(&self, major_version: u8) -> usize {
        if major_version >= 3 {
            self.difficulty_lag
        } else if major_version == 2 {
            self.difficulty_lag_v2
        } else {
            self.difficulty_lag_v1
        }
    }

    #[must_use]
    pub fn difficulty_cut_for(&self, major_version: u8) -> usize {
        if major_version >= 3 {
            self.difficulty_cut
        } else if major_version == 2 {
            self.difficulty_cut_v2
        } else {
            self.difficulty_cut_v1
        }
    }

    #[must_use]
    pub fn difficulty_blocks_count_for(&self, major_version: u8) -> usize {
        self.difficulty_window_for(major_version) + self.difficulty_lag_for(major_version)
    }

    #[must_use]
    pub fn block_granted_full_reward_zone_for(&self, major_version: u8) -> usize {
        if major_version >= 3 {
            self.block_granted_full_reward_zone_v3
        } else if major_version == 2 {
            self.block_granted_full_reward_zone_v2
        } else {
            self.block_granted_full_reward_zone_v1
        }
    }

    #[must_use]
    pub fn upgrade_height_for(&self, major_version: u8) -> Option<u32> {
        match major_version {
            2 => self.upgrade_height_v2,
            3 => self.upgrade_height_v3,
            _ => None,
        }
    }

    #[must_use]
    pub fn max_block_cumulative_size(&self, height: u64) -> usize {
        (self.max_block_size_initial as u64
            + (height * self.max_block_size_growth_speed_numerator)
                / self.max_block_size_growth_speed_denominator) as usize
    }
}

/// Fluent builder over [`Config`]. Every setter consumes and returns
/// `Self`; `finish()` yields the built `Config`.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

macro_rules! setter {
    ($field:ident, $ty:ty) => {
        #[must_use]
        pub fn $field(mut self, value: $ty) -> Self {
            self.config.$field = value;
            self
        }
    };
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    setter!(max_block_height, u64);
    setter!(max_block_blob_size, usize);
    setter!(max_tx_size, usize);
    setter!(public_address_base58_prefix, u64);
    setter!(mined_money_unlock_window, u32);
    setter!(timestamp_check_window, usize);
    setter!(block_future_time_limit, i64);
    setter!(money_supply, u64);
    setter!(emission_speed_factor, u32);
    setter!(reward_blocks_window, usize);
    setter!(miner_tx_blob_reserved_size, usize);
    setter!(max_transaction_size_limit, usize);
    setter!(number_of_decimal_places, u32);
    setter!(minimum_fee, u64);
    setter!(default_dust_threshold, u64);
    setter!(difficulty_target, u64);
    setter!(difficulty_window, usize);
    setter!(difficulty_window_v1, usize);
    setter!(difficulty_window_v2, usize);
    setter!(difficulty_lag, usize);
    setter!(difficulty_lag_v1, usize);
    setter!(difficulty_lag_v2, usize);
    setter!(difficulty_cut, usize);
    setter!(difficulty_cut_v1, usize);
    setter!(difficulty_cut_v2, usize);
    setter!(block_granted_full_reward_zone_v1, usize);
    setter!(block_granted_full_reward_zone_v2, usize);
    setter!(block_granted_full_reward_zone_v3, usize);
    setter!(max_block_size_initial, usize);
    setter!(max_block_size_growth_speed_numerator, u64);
    setter!(max_block_size_growth_speed_denominator, u64);
    setter!(locked_tx_allowed_delta_seconds, i64);
    setter!(locked_tx_allowed_delta_blocks, u32);
    setter!(fusion_tx_max_size, usize);
    setter!(fusion_tx_min_input_count, usize);
    setter!(fusion_tx_min_in_out_count_ratio, usize);
    setter!(upgrade_height_v2, Option<u32>);
    setter!(upgrade_height_v3, Option<u32>);
    setter!(upgrade_voting_threshold, u32);
    setter!(upgrade_voting_window, u32);
    setter!(upgrade_window, u32);
    setter!(testnet, bool);
    setter!(genesis_coinbase_tx_hex, String);
    setter!(genesis_block_reward, u64);
    setter!(tail_emission_reward, u64);
    setter!(zawy_difficulty_start, Option<u32>);
    setter!(zawy_difficulty_end, Option<u32>);
    setter!(zawy_lwma_difficulty_start, Option<u32>);
    setter!(zawy_lwma_difficulty_end, Option<u32>);
    setter!(zawy_lwma_difficulty_n, Option<usize>);
    setter!(bugged_zawy_difficulty_block_index, Option<u32>);
    setter!(min_mixin, usize);
    setter!(mandatory_mixin_block_version, u8);
    setter!(mixin_start_height, Option<u32>);
    setter!(kill_height, Option<u32>);
    setter!(key_image_checking_block_index, Option<u32>);

    #[must_use]
    pub fn finish(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = ConfigBuilder::new()
            .testnet(true)
            .difficulty_target(30)
            .upgrade_voting_window(10)
            .finish();
        assert!(config.testnet);
        assert_eq!(config.difficulty_target, 30);
        assert_eq!(config.upgrade_voting_window, 10);
    }

    #[test]
    fn per_version_difficulty_window_selection() {
        let config = Config::default();
        assert_eq!(config.difficulty_window_for(1), config.difficulty_window_v1);
        assert_eq!(config.difficulty_window_for(2), config.difficulty_window_v2);
        assert_eq!(config.difficulty_window_for(3), config.difficulty_window);
    }
}
