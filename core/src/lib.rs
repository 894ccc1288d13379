pub mod address;
pub mod block;
pub mod cache;
pub mod cache_tree;
pub mod cached;
pub mod config;
pub mod currency;
pub mod encoding;
pub mod error;
pub mod indices;
pub mod protocol;
pub mod raw_storage;
pub mod transaction;
pub mod upgrade;
pub mod validator;
pub mod view;

pub use address::{base58_decode, base58_encode, decode_address, encode_address, AccountPublicAddress};
pub use block::{Block, BlockHeader, ParentBlock};
pub use cache::{BlockchainCache, ParentContext, PushedBlockInfo, ResolvedKeyOutput};
pub use cache_tree::{SegmentArena, SegmentId};
pub use cached::{CachedBlock, CachedTransaction};
pub use config::{Config, ConfigBuilder};
pub use currency::{get_penalized_amount, BlockReward, Currency};
pub use encoding::{CanonicalDecode, CanonicalEncode, Cursor};
pub use error::{Error, Result, TimestampRejectReason};
pub use indices::{
    CachedBlockInfo, CachedTransactionInfo, MultisignatureIndexes, OutputGlobalIndexesForAmount,
    PackedOutIndex, PaymentIdMap, SpentKeyImage,
};
pub use protocol::{AddBlockResult, Blockchain, BlockchainObserver, PoolValidationView};
pub use raw_storage::{RawBlock, RawBlockStorage};
pub use transaction::{Transaction, TxInput, TxOutput, TxOutputTarget};
pub use upgrade::{BlockVersion, UpgradeDetector, UNDEFINED_HEIGHT};
pub use validator::TransactionValidatorState;
pub use view::{block_details, transaction_details, BlockDetails, BlockDetailsInput, TransactionDetails};
