//! Transaction data model and canonical encoding. Rewritten from
//! `bond-core`'s Bitcoin-style `TxInput`/`TxOutput`
//! (which referenced flat UTXOs by `OutPoint` and carried script-based
//! spending conditions); CryptoNote has no UTXO references at all — inputs
//! carry ring membership (`relativeOutputOffsets`) and a key image instead
//! of a previous-output pointer, and outputs carry a one-time public key
//! instead of a script, so the variant shapes are replaced outright while
//! the "ordered input/output `Vec` on a prefix struct" shape is kept.

use crate::encoding::{
    read_bytes_prefixed, write_bytes, CanonicalDecode, CanonicalEncode, Cursor, MAX_ARRAY_LEN,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use shared::varint;
use shared::{Hash256, KeyImage, PublicKey, Signature};

pub const TAG_BASE_INPUT: u8 = 0xFF;
pub const TAG_KEY_INPUT: u8 = 0x02;
pub const TAG_MULTISIGNATURE_INPUT: u8 = 0x03;
pub const TAG_KEY_OUTPUT: u8 = 0x02;
pub const TAG_MULTISIGNATURE_OUTPUT: u8 = 0x03;

pub const TX_EXTRA_TAG_PADDING: u8 = 0x00;
pub const TX_EXTRA_TAG_PUBKEY: u8 = 0x01;
pub const TX_EXTRA_TAG_NONCE: u8 = 0x02;
pub const TX_EXTRA_TAG_MERGE_MINING: u8 = 0x03;
pub const TX_EXTRA_NONCE_PAYMENT_ID: u8 = 0x00;

/// Every input is exactly one of these three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxInput {
    /// Legal only as the single input of a miner transaction.
    Base { height: u32 },
    Key {
        amount: u64,
        relative_output_offsets: Vec<u32>,
        key_image: KeyImage,
    },
    Multisignature {
        amount: u64,
        signature_count: u8,
        output_index: u32,
    },
}

impl TxInput {
    /// Number of ring-signature elements this input requires:
    /// 0 for `Base`, `|ring|` for `Key`, `signatureCount` for
    /// `Multisignature`).
    #[must_use]
    pub fn required_signature_count(&self) -> usize {
        match self {
            Self::Base { .. } => 0,
            Self::Key {
                relative_output_offsets,
                ..
            } => relative_output_offsets.len(),
            Self::Multisignature {
                signature_count, ..
            } => *signature_count as usize,
        }
    }

    /// Decodes `relativeOutputOffsets` into absolute global indices via
    /// prefix-sum.
    #[must_use]
    pub fn absolute_output_offsets(&self) -> Option<Vec<u64>> {
        match self {
            Self::Key {
                relative_output_offsets,
                ..
            } => {
                let mut absolute = Vec::with_capacity(relative_output_offsets.len());
                let mut running: u64 = 0;
                for (i, &offset) in relative_output_offsets.iter().enumerate() {
                    running = if i == 0 {
                        u64::from(offset)
                    } else {
                        running + u64::from(offset)
                    };
                    absolute.push(running);
                }
                Some(absolute)
            }
            _ => None,
        }
    }
}

impl CanonicalEncode for TxInput {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Base { height } => {
                out.push(TAG_BASE_INPUT);
                varint::write_u32(out, *height);
            }
            Self::Key {
                amount,
                relative_output_offsets,
                key_image,
            } => {
                out.push(TAG_KEY_INPUT);
                varint::write_u64(out, *amount);
                varint::write_usize(out, relative_output_offsets.len());
                for offset in relative_output_offsets {
                    varint::write_u32(out, *offset);
                }
                out.extend_from_slice(key_image.as_bytes());
            }
            Self::Multisignature {
                amount,
                signature_count,
                output_index,
            } => {
                out.push(TAG_MULTISIGNATURE_INPUT);
                varint::write_u64(out, *amount);
                out.push(*signature_count);
                varint::write_u32(out, *output_index);
            }
        }
    }
}

impl CanonicalDecode for TxInput {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self> {
        let tag = cursor.read_u8()?;
        match tag {
            TAG_BASE_INPUT => Ok(Self::Base {
                height: cursor.read_varint_u32()?,
            }),
            TAG_KEY_INPUT => {
                let amount = cursor.read_varint_u64()?;
                let count = cursor.read_varint_usize()?;
                if count > MAX_ARRAY_LEN {
                    return Err(Error::SizeLimit {
                        size: count,
                        limit: MAX_ARRAY_LEN,
                    });
                }
                let mut relative_output_offsets = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    relative_output_offsets.push(cursor.read_varint_u32()?);
                }
                let key_image_bytes = cursor.read_bytes(32)?;
                let key_image = KeyImage::from_slice(key_image_bytes)?;
                Ok(Self::Key {
                    amount,
                    relative_output_offsets,
                    key_image,
                })
            }
            TAG_MULTISIGNATURE_INPUT => Ok(Self::Multisignature {
                amount: cursor.read_varint_u64()?,
                signature_count: cursor.read_u8()?,
                output_index: cursor.read_varint_u32()?,
            }),
            other => Err(Error::UnknownTag {
                tag: other,
                context: "TxInput",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxOutputTarget {
    Key {
        key: PublicKey,
    },
    Multisignature {
        keys: Vec<PublicKey>,
        required_signature_count: u8,
    },
}

impl CanonicalEncode for TxOutputTarget {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Self::Key { key } => {
                out.push(TAG_KEY_OUTPUT);
                out.extend_from_slice(key.as_bytes());
            }
            Self::Multisignature {
                keys,
                required_signature_count,
            } => {
                out.push(TAG_MULTISIGNATURE_OUTPUT);
                varint::write_usize(out, keys.len());
                for key in keys {
                    out.extend_from_slice(key.as_bytes());
                }
                out.push(*required_signature_count);
            }
        }
    }
}

impl CanonicalDecode for TxOutputTarget {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self> {
        let tag = cursor.read_u8()?;
        match tag {
            TAG_KEY_OUTPUT => Ok(Self::Key {
                key: cursor.read_public_key()?,
            }),
            TAG_MULTISIGNATURE_OUTPUT => {
                let count = cursor.read_varint_usize()?;
                if count > MAX_ARRAY_LEN {
                    return Err(Error::SizeLimit {
                        size: count,
                        limit: MAX_ARRAY_LEN,
                    });
                }
                let mut keys = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    keys.push(cursor.read_public_key()?);
                }
                Ok(Self::Multisignature {
                    keys,
                    required_signature_count: cursor.read_u8()?,
                })
            }
            other => Err(Error::UnknownTag {
                tag: other,
                context: "TxOutputTarget",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount: u64,
    pub target: TxOutputTarget,
}

impl CanonicalEncode for TxOutput {
    fn encode(&self, out: &mut Vec<u8>) {
        varint::write_u64(out, self.amount);
        self.target.encode(out);
    }
}

impl CanonicalDecode for TxOutput {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            amount: cursor.read_varint_u64()?,
            target: TxOutputTarget::decode(cursor)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u8,
    /// Dual-interpreted: a height if `< maxBlockHeight`, else a Unix time.
    pub unlock_time: u64,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub extra: Vec<u8>,
    /// One signature list per input; `signatures[i].len()` must equal
    /// `inputs[i].required_signature_count()`.
    pub signatures: Vec<Vec<Signature>>,
}

impl Transaction {
    /// Encodes the prefix fields only (everything but `signatures`) — this
    /// is what a ring signature actually covers.
    pub fn encode_prefix(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        varint::write_u64(out, self.unlock_time);
        crate::encoding::write_array(out, &self.inputs);
        crate::encoding::write_array(out, &self.outputs);
        write_bytes(out, &self.extra);
    }

    #[must_use]
    pub fn prefix_hash(&self) -> Hash256 {
        let mut buf = Vec::new();
        self.encode_prefix(&mut buf);
        Hash256::fast_hash(&buf)
    }

    #[must_use]
    pub fn hash(&self) -> Hash256 {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        Hash256::fast_hash(&buf)
    }

    #[must_use]
    pub fn is_base_transaction(&self) -> bool {
        matches!(self.inputs.as_slice(), [TxInput::Base { .. }])
    }

    #[must_use]
    pub fn input_amounts_sum(&self) -> u128 {
        self.inputs
            .iter()
            .map(|i| match i {
                TxInput::Base { .. } => 0u128,
                TxInput::Key { amount, .. } | TxInput::Multisignature { amount, .. } => {
                    u128::from(*amount)
                }
            })
            .sum()
    }

    #[must_use]
    pub fn output_amounts_sum(&self) -> u128 {
        self.outputs.iter().map(|o| u128::from(o.amount)).sum()
    }

    /// `inputs amount sum - outputs amount sum`, 0 for a miner transaction.
    pub fn fee(&self) -> Result<u64> {
        if self.is_base_transaction() {
            return Ok(0);
        }
        let diff = self
            .input_amounts_sum()
            .checked_sub(self.output_amounts_sum())
            .ok_or(Error::SumOverflow)?;
        u64::try_from(diff).map_err(|_| Error::SumOverflow)
    }

    /// Extracts the payment id carried in `extra`'s nonce field, if any
    /// (tag `TX_EXTRA_TAG_NONCE`, sub-tag `TX_EXTRA_NONCE_PAYMENT_ID`,
    /// grounded on `tx_extra.h`).
    #[must_use]
    pub fn payment_id(&self) -> Option<Hash256> {
        extract_payment_id(&self.extra)
    }

    /// Extracts the transaction public key carried in `extra` (tag
    /// `TX_EXTRA_TAG_PUBKEY`), used by recipients to derive one-time keys.
    #[must_use]
    pub fn transaction_public_key(&self) -> Option<PublicKey> {
        let mut cursor = Cursor::new(&self.extra);
        while cursor.remaining() > 0 {
            let tag = cursor.read_u8().ok()?;
            match tag {
                TX_EXTRA_TAG_PUBKEY => {
                    let bytes = cursor.read_bytes(32).ok()?;
                    return PublicKey::from_slice(bytes).ok();
                }
                TX_EXTRA_TAG_PADDING => loop {
                    if cursor.remaining() == 0 {
                        break;
                    }
                    match cursor.read_u8() {
                        Ok(0) => continue,
                        _ => break,
                    }
                },
                TX_EXTRA_TAG_NONCE | TX_EXTRA_TAG_MERGE_MINING => {
                    read_bytes_prefixed(&mut cursor).ok()?;
                }
                _ => break,
            }
        }
        None
    }
}

/// Extracts a 32-byte payment id from a tx's `extra` field if a
/// `TX_EXTRA_TAG_NONCE` field with sub-tag `TX_EXTRA_NONCE_PAYMENT_ID` and a
/// 33-byte payload (sub-tag + 32 bytes) is present.
#[must_use]
pub fn extract_payment_id(extra: &[u8]) -> Option<Hash256> {
    let mut cursor = Cursor::new(extra);
    while cursor.remaining() > 0 {
        let tag = cursor.read_u8().ok()?;
        match tag {
            TX_EXTRA_TAG_PUBKEY => {
                cursor.read_bytes(32).ok()?;
            }
            TX_EXTRA_TAG_PADDING => loop {
                if cursor.remaining() == 0 {
                    break;
                }
                match cursor.read_u8() {
                    Ok(0) => continue,
                    _ => break,
                }
            },
            TX_EXTRA_TAG_NONCE => {
                let nonce = read_bytes_prefixed(&mut cursor).ok()?;
                if nonce.len() == 33 && nonce[0] == TX_EXTRA_NONCE_PAYMENT_ID {
                    return Hash256::from_slice(&nonce[1..]);
                }
            }
            TX_EXTRA_TAG_MERGE_MINING => {
                read_bytes_prefixed(&mut cursor).ok()?;
            }
            _ => break,
        }
    }
    None
}

impl CanonicalEncode for Transaction {
    fn encode(&self, out: &mut Vec<u8>) {
        self.encode_prefix(out);
        for (input, sigs) in self.inputs.iter().zip(self.signatures.iter()) {
            debug_assert_eq!(sigs.len(), input.required_signature_count());
            for sig in sigs {
                crate::encoding::write_signature(out, sig);
            }
        }
    }
}

impl CanonicalDecode for Transaction {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self> {
        let version = cursor.read_u8()?;
        let unlock_time = cursor.read_varint_u64()?;
        let inputs: Vec<TxInput> = crate::encoding::read_array(cursor, MAX_ARRAY_LEN)?;
        let outputs: Vec<TxOutput> = crate::encoding::read_array(cursor, MAX_ARRAY_LEN)?;
        let extra = read_bytes_prefixed(cursor)?.to_vec();

        let mut signatures = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let count = input.required_signature_count();
            let mut sigs = Vec::with_capacity(count);
            for _ in 0..count {
                sigs.push(cursor.read_signature()?);
            }
            signatures.push(sigs);
        }

        Ok(Self {
            version,
            unlock_time,
            inputs,
            outputs,
            extra,
            signatures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key_output(amount: u64) -> TxOutput {
        TxOutput {
            amount,
            target: TxOutputTarget::Key {
                key: PublicKey::from_bytes([7u8; 32]),
            },
        }
    }

    fn base_tx(height: u32, outputs: Vec<TxOutput>) -> Transaction {
        Transaction {
            version: 1,
            unlock_time: 0,
            inputs: vec![TxInput::Base { height }],
            outputs,
            extra: Vec::new(),
            signatures: vec![Vec::new()],
        }
    }

    #[test]
    fn base_transaction_roundtrips() {
        let tx = base_tx(42, vec![sample_key_output(1000)]);
        let bytes = tx.encode_to_vec();
        let mut cursor = Cursor::new(&bytes);
        let decoded = Transaction::decode(&mut cursor).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn key_input_roundtrips_with_ring_signatures() {
        let tx = Transaction {
            version: 1,
            unlock_time: 0,
            inputs: vec![TxInput::Key {
                amount: 500,
                relative_output_offsets: vec![5, 10, 2],
                key_image: KeyImage::from_bytes([1u8; 32]),
            }],
            outputs: vec![sample_key_output(490)],
            extra: Vec::new(),
            signatures: vec![vec![
                Signature::from_bytes([9u8; 64]),
                Signature::from_bytes([8u8; 64]),
                Signature::from_bytes([7u8; 64]),
            ]],
        };
        let bytes = tx.encode_to_vec();
        let mut cursor = Cursor::new(&bytes);
        let decoded = Transaction::decode(&mut cursor).unwrap();
        assert_eq!(decoded, tx);
    }

    #[test]
    fn absolute_output_offsets_prefix_sums_relative_offsets() {
        let input = TxInput::Key {
            amount: 10,
            relative_output_offsets: vec![5, 3, 0, 7],
            key_image: KeyImage::from_bytes([0u8; 32]),
        };
        assert_eq!(input.absolute_output_offsets().unwrap(), vec![5, 8, 8, 15]);
    }

    #[test]
    fn fee_is_input_sum_minus_output_sum() {
        let tx = Transaction {
            version: 1,
            unlock_time: 0,
            inputs: vec![TxInput::Key {
                amount: 1000,
                relative_output_offsets: vec![1],
                key_image: KeyImage::from_bytes([2u8; 32]),
            }],
            outputs: vec![sample_key_output(900)],
            extra: Vec::new(),
            signatures: vec![vec![Signature::from_bytes([0u8; 64])]],
        };
        assert_eq!(tx.fee().unwrap(), 100);
    }

    #[test]
    fn payment_id_extracted_from_nonce_field() {
        let payment_id = Hash256::fast_hash(b"order-1234");
        let mut extra = Vec::new();
        extra.push(TX_EXTRA_TAG_NONCE);
        let mut nonce = vec![TX_EXTRA_NONCE_PAYMENT_ID];
        nonce.extend_from_slice(payment_id.as_bytes());
        write_bytes(&mut extra, &nonce);

        assert_eq!(extract_payment_id(&extra), Some(payment_id));
    }

    #[test]
    fn unknown_input_tag_is_rejected() {
        let bytes = [0x05u8];
        let mut cursor = Cursor::new(&bytes);
        let err = TxInput::decode(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::UnknownTag { tag: 0x05, .. }));
    }
}
