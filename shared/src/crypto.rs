//! Primitive key, signature, and key-image types plus the call boundary for
//! the ring-signature scheme and key-image derivation: EdDSA keypairs, key
//! derivation, key-image derivation, and ring signatures are specified only
//! at their interface boundary here — their actual CryptoNote math is not
//! this crate's concern. `Hash256` and `fast_hash`/`tree_hash`
//! live in [`crate::hash`]; the memory-hard PoW `slow_hash` boundary lives on
//! [`ProofOfWorkHasher`] here since it shares the "interface-only" contract.

use crate::error::Error;
use crate::Hash256;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

macro_rules! fixed_bytes_newtype {
    ($name:ident, $len:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name([u8; $len]);

        impl $name {
            #[must_use]
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
                if bytes.len() != $len {
                    return Err(Error::InvalidKeyLength {
                        expected: $len,
                        actual: bytes.len(),
                    });
                }
                let mut buf = [0u8; $len];
                buf.copy_from_slice(bytes);
                Ok(Self(buf))
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }
    };
}

fixed_bytes_newtype!(PublicKey, 32);
fixed_bytes_newtype!(KeyImage, 32);

/// 64-byte ring/EdDSA signature. One `Signature` per ring member for a
/// `KeyInput`; `signatures.len()` for that input must equal the ring size.
#[derive(Clone, Serialize, Deserialize)]
pub struct Signature([u8; 64]);

impl Signature {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 64 {
            return Err(Error::InvalidSignatureLength {
                expected: 64,
                actual: bytes.len(),
            });
        }
        let mut buf = [0u8; 64];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

/// A one-time secret key. Zeroized on drop; never implements `Debug`,
/// `Display`, `Clone`, or (de)serialization so it cannot leak into logs or
/// snapshots.
pub struct SecretKey([u8; 32]);

impl SecretKey {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != 32 {
            return Err(Error::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// An EdDSA keypair used for standard (non-ring) signing — transaction
/// public keys, address ownership proofs, and test scaffolding.
pub struct KeyPair {
    pub public_key: PublicKey,
    secret_key: SecretKey,
}

impl KeyPair {
    #[must_use]
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public_key = PublicKey::from_bytes(signing_key.verifying_key().to_bytes());
        let secret_key = SecretKey::from_bytes(signing_key.to_bytes());
        Self {
            public_key,
            secret_key,
        }
    }

    /// Signs an arbitrary message hash (e.g. a transaction prefix hash).
    ///
    /// # Errors
    ///
    /// Returns an error if the stored secret key bytes do not form a valid
    /// ed25519 scalar (never true for keys produced by [`Self::generate`]).
    pub fn sign(&self, message: &[u8]) -> Result<Signature, Error> {
        let signing_key = SigningKey::from_bytes(self.secret_key.as_bytes());
        let sig = signing_key.sign(message);
        Ok(Signature::from_bytes(sig.to_bytes()))
    }
}

/// Verifies a standard (non-ring) EdDSA signature against a public key.
///
/// # Errors
///
/// Returns [`Error::NotOnCurve`] if `public_key` is not a valid compressed
/// Edwards point, [`Error::InvalidSignature`] if `signature` is malformed.
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> Result<bool, Error> {
    let verifying_key =
        VerifyingKey::from_bytes(public_key.as_bytes()).map_err(|_| Error::NotOnCurve)?;
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    Ok(verifying_key.verify(message, &sig).is_ok())
}

/// Whether `public_key` decompresses to a valid point on the curve, the
/// same check address decoding needs before accepting a spend/view key.
#[must_use]
pub fn is_valid_public_key(public_key: &PublicKey) -> bool {
    VerifyingKey::from_bytes(public_key.as_bytes()).is_ok()
}

/// The call boundary for CryptoNote ring signatures and key-image
/// derivation. The real one-time-ring-signature scheme
/// (`generate_ring_signature`/`check_ring_signature` over ed25519 points,
/// and `Hp(P) * x` key-image derivation) is out of this crate's scope —
/// callers supply an implementation of this trait; `core` depends only on
/// the trait, never on a concrete scheme, so the engine can be wired to
/// whichever native crypto library a deployment trusts.
pub trait RingSignatureScheme {
    /// Derives the key image for a one-time keypair. Uniquely identifies a
    /// spent output across the chain without revealing which ring member
    /// was spent.
    fn derive_key_image(&self, secret_key: &SecretKey, public_key: &PublicKey) -> KeyImage;

    /// Verifies a ring signature: `signatures.len()` must equal
    /// `ring.len()`; returns `true` iff every ring signature element
    /// verifies against `prefix_hash` and the claimed `key_image`.
    fn verify_ring(
        &self,
        prefix_hash: &Hash256,
        key_image: &KeyImage,
        ring: &[PublicKey],
        signatures: &[Signature],
    ) -> bool;
}

/// The memory-hard proof-of-work hash boundary, used only by
/// `checkProofOfWork`. Deliberately not implemented here —
/// the actual algorithm (CryptoNight-family) is a primitive the core
/// consumes through this trait, never a function it defines.
pub trait ProofOfWorkHasher {
    fn slow_hash(&self, data: &[u8]) -> Hash256;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_roundtrips_sign_and_verify() {
        let keypair = KeyPair::generate();
        let message = b"CryptoNote-family ledger core";
        let signature = keypair.sign(message).unwrap();
        assert!(verify(&keypair.public_key, message, &signature).unwrap());
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign(b"original").unwrap();
        assert!(!verify(&keypair.public_key, b"tampered", &signature).unwrap());
    }

    #[test]
    fn public_key_from_slice_rejects_wrong_length() {
        let err = PublicKey::from_slice(&[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidKeyLength {
                expected: 32,
                actual: 10
            }
        );
    }
}
