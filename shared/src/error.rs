use thiserror::Error;

/// Primitive-level errors: malformed keys, hashes, and signatures. Chain
/// semantics (bad proof-of-work, double spend, reorg failure, ...) live in
/// `core::error::Error`, not here — this crate knows nothing about blocks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidHashLength { expected: usize, actual: usize },

    #[error("invalid signature length: expected {expected}, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    #[error("invalid signature")]
    InvalidSignature,

    #[error("point is not on the curve")]
    NotOnCurve,
}
