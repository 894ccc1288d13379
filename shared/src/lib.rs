pub mod crypto;
pub mod error;
pub mod hash;
pub mod varint;

pub use crypto::{
    is_valid_public_key, verify, KeyImage, KeyPair, ProofOfWorkHasher, PublicKey, RingSignatureScheme,
    SecretKey, Signature,
};
pub use error::Error;
pub use hash::{tree_branch_from_index, tree_hash, Hash256};

pub type Result<T> = std::result::Result<T, Error>;
