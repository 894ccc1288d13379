//! The single flat error enum for the ledger core, grouped into
//! five doc-commented kinds rather than five separate types — matching
//! `bond-core`'s one `BlockchainError`-shaped enum rather than inventing a
//! multi-type hierarchy.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ---- Encoding errors --------------------------------
    #[error("short read: expected {expected} more bytes, {available} available")]
    ShortRead { expected: usize, available: usize },
    #[error("varint overflow decoding a {bits}-bit integer")]
    Overflow { bits: u32 },
    #[error("non-canonical varint encoding (zero continuation byte)")]
    NonCanonical,
    #[error("unknown tag {tag:#x} for {context}")]
    UnknownTag { tag: u8, context: &'static str },
    #[error("encoded size {size} exceeds limit {limit}")]
    SizeLimit { size: usize, limit: usize },
    #[error("block major version {0} exceeds the known maximum")]
    WrongVersion(u8),
    #[error("expected merge-mining tag missing from parent miner transaction extra")]
    WrongMergeMiningTag,
    #[error("merge-mining merkle branch depth exceeds 256")]
    MerkleBranchTooDeep,

    // ---- Input errors (peer/user-supplied data) ---------------------
    #[error("invalid address: {0}")]
    BadAddress(String),
    #[error("invalid payment id")]
    BadPaymentId,
    #[error("invalid transaction extra field")]
    BadTransactionExtra,
    #[error("wrong amount")]
    WrongAmount,
    #[error("sum overflow")]
    SumOverflow,
    #[error("zero destination amount")]
    ZeroDestination,
    #[error("mixin count too big: {0}")]
    MixinCountTooBig(usize),
    #[error("fee too small: {fee} < minimum {minimum}")]
    FeeTooSmall { fee: u64, minimum: u64 },
    #[error("transaction size too big: {size} > limit {limit}")]
    TransactionSizeTooBig { size: usize, limit: usize },

    // ---- State errors (checked before any mutation) ------------------
    #[error("cache not initialized")]
    NotInitialized,
    #[error("cache already initialized")]
    AlreadyInitialized,
    #[error("operation invalid in current state: {0}")]
    WrongState(String),
    #[error("wrong password")]
    WrongPassword,

    // ---- Validation errors -------------------------------------------
    #[error("block failed to deserialize")]
    DeserializationFailed,
    #[error("proof of work does not meet the required difficulty")]
    BadProofOfWork,
    #[error("ring signature verification failed")]
    BadRingSignature,
    #[error("key image already spent in this chain")]
    DuplicateKeyImage,
    #[error("double spend detected")]
    DoubleSpend,
    #[error("referenced output is still locked")]
    OutputLocked,
    #[error("global index {index} exceeds the known maximum {max}")]
    InvalidGlobalIndex { index: u64, max: u64 },
    #[error("block reward does not match the expected reward")]
    RewardMismatch,
    #[error("block exceeds the maximum cumulative size")]
    BlockTooBig,
    #[error("block timestamp rejected: {0}")]
    TimestampRejected(TimestampRejectReason),
    #[error("parent block not found for previousBlockHash")]
    ParentNotFound,
    #[error("alternative chain cumulative difficulty is not greater than the active chain")]
    AlternativeChainTooWeak,
    #[error("invalid transaction input")]
    InvalidInput,
    #[error("invalid transaction output")]
    InvalidOutput,
    #[error("unlock time overflow")]
    UnlockTimeOverflow,
    #[error("block major version does not match the version required at this height")]
    WrongMajorForHeight,

    // ---- Storage errors -------------------------------------------------
    #[error("internal storage error: {0}")]
    InternalError(String),

    // ---- Cancellation ---------------------------------------------------
    #[error("operation cancelled")]
    OperationCancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampRejectReason {
    /// Exceeds `blockFutureTimeLimit` seconds ahead of the local clock.
    TooFarInFuture,
    /// At or before the median of the last `timestampCheckWindow` blocks.
    TooFarInPast,
}

impl std::fmt::Display for TimestampRejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooFarInFuture => write!(f, "too far in the future"),
            Self::TooFarInPast => write!(f, "too far in the past (median rule)"),
        }
    }
}

impl From<shared::Error> for Error {
    fn from(err: shared::Error) -> Self {
        match err {
            shared::Error::InvalidKeyLength { .. } | shared::Error::NotOnCurve => {
                Error::BadTransactionExtra
            }
            shared::Error::InvalidHashLength { .. } => Error::ShortRead {
                expected: 32,
                available: 0,
            },
            shared::Error::InvalidSignatureLength { .. } | shared::Error::InvalidSignature => {
                Error::BadRingSignature
            }
        }
    }
}

impl From<shared::varint::VarintError> for Error {
    fn from(err: shared::varint::VarintError) -> Self {
        match err {
            shared::varint::VarintError::ShortRead => Error::ShortRead {
                expected: 1,
                available: 0,
            },
            shared::varint::VarintError::Overflow => Error::Overflow { bits: 64 },
            shared::varint::VarintError::NonCanonical => Error::NonCanonical,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
