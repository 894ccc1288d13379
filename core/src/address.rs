//! CryptoNote address codec: varint
//! network prefix plus a spend/view keypair, checksummed and encoded with
//! the CryptoNote fixed-block-size base58 alphabet. `bond-core` never
//! has addresses to ground this directly on; the block-based base58
//! scheme is hand-written rather than pulled from the `bs58` crate
//! because CryptoNote's variant encodes data in fixed 8-byte blocks with a
//! per-block-size padding table, which is incompatible with `bs58`'s
//! whole-buffer leading-zero convention (see DESIGN.md). Grounded on
//! `original_source/src/Common/Base58.cpp`'s `encode_block`/`decode_block`
//! and on `original_source/src/CryptoNoteCore/CryptoNoteTools.h`'s
//! `getAccountAddressAsStr`/`parseAccountAddressString` checksum framing.

use crate::error::{Error, Result};
use shared::{is_valid_public_key, varint, Hash256, PublicKey};

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const FULL_BLOCK_SIZE: usize = 8;
const FULL_ENCODED_BLOCK_SIZE: usize = 11;
/// `encoded_block_sizes[n]` is the base58 character count produced by an
/// `n`-byte input block, `n` in `0..=8`.
const ENCODED_BLOCK_SIZES: [usize; 9] = [0, 2, 3, 5, 6, 7, 9, 10, 11];
const CHECKSUM_SIZE: usize = 4;

/// A decoded CryptoNote address: spend and view public keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountPublicAddress {
    pub spend_public_key: PublicKey,
    pub view_public_key: PublicKey,
}

fn reverse_alphabet(c: u8) -> Option<u8> {
    ALPHABET.iter().position(|&a| a == c).map(|i| i as u8)
}

fn uint8be_to_u64(data: &[u8]) -> u64 {
    data.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

fn encode_block(data: &[u8], out: &mut [u8]) {
    debug_assert!(data.len() <= FULL_BLOCK_SIZE);
    debug_assert_eq!(out.len(), ENCODED_BLOCK_SIZES[data.len()]);
    let mut num = uint8be_to_u64(data);
    let mut i = out.len();
    while num > 0 {
        i -= 1;
        out[i] = ALPHABET[(num % 58) as usize];
        num /= 58;
    }
    for slot in out[..i].iter_mut() {
        *slot = ALPHABET[0];
    }
}

/// Decodes one base58 block back into `size` raw bytes.
///
/// # Errors
///
/// Returns [`Error::BadAddress`] if a character isn't in the alphabet, or
/// if the decoded value overflows `size` bytes (a non-canonical
/// over-length encoding).
fn decode_block(block: &[u8], size: usize, out: &mut [u8]) -> Result<()> {
    debug_assert_eq!(out.len(), size);
    let mut num: u128 = 0;
    let mut order: u128 = 1;
    for &c in block.iter().rev() {
        let digit = reverse_alphabet(c).ok_or_else(|| Error::BadAddress("invalid base58 character".to_string()))?;
        num = num
            .checked_add(
                order
                    .checked_mul(u128::from(digit))
                    .ok_or_else(|| Error::BadAddress("base58 block overflow".to_string()))?,
            )
            .ok_or_else(|| Error::BadAddress("base58 block overflow".to_string()))?;
        order = order
            .checked_mul(58)
            .ok_or_else(|| Error::BadAddress("base58 block overflow".to_string()))?;
    }
    if size < 16 && num >= (1u128 << (8 * size)) {
        return Err(Error::BadAddress("base58 block decodes past its byte width".to_string()));
    }
    let bytes = num.to_be_bytes();
    out.copy_from_slice(&bytes[bytes.len() - size..]);
    Ok(())
}

/// Raw block58 encode (no checksum framing) — CryptoNote's
/// `tools::base58::encode`.
#[must_use]
pub fn base58_encode(data: &[u8]) -> String {
    let full_blocks = data.len() / FULL_BLOCK_SIZE;
    let last_block_size = data.len() % FULL_BLOCK_SIZE;
    let encoded_len = full_blocks * FULL_ENCODED_BLOCK_SIZE + ENCODED_BLOCK_SIZES[last_block_size];

    let mut out = vec![0u8; encoded_len];
    for i in 0..full_blocks {
        let block = &data[i * FULL_BLOCK_SIZE..(i + 1) * FULL_BLOCK_SIZE];
        let out_block = &mut out[i * FULL_ENCODED_BLOCK_SIZE..(i + 1) * FULL_ENCODED_BLOCK_SIZE];
        encode_block(block, out_block);
    }
    if last_block_size > 0 {
        let block = &data[full_blocks * FULL_BLOCK_SIZE..];
        let out_block = &mut out[full_blocks * FULL_ENCODED_BLOCK_SIZE..];
        encode_block(block, out_block);
    }

    String::from_utf8(out).expect("base58 alphabet is all ASCII")
}

/// Raw base58 decode (no checksum framing) — CryptoNote's
/// `tools::base58::decode`.
///
/// # Errors
///
/// Returns [`Error::BadAddress`] if `text` contains a character outside
/// the alphabet, has a final block of an invalid length, or any block
/// overflows its byte width.
pub fn base58_decode(text: &str) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    let full_blocks = bytes.len() / FULL_ENCODED_BLOCK_SIZE;
    let last_block_encoded_size = bytes.len() % FULL_ENCODED_BLOCK_SIZE;
    let last_block_size = ENCODED_BLOCK_SIZES
        .iter()
        .position(|&s| s == last_block_encoded_size)
        .ok_or_else(|| Error::BadAddress("invalid base58 string length".to_string()))?;

    let decoded_len = full_blocks * FULL_BLOCK_SIZE + last_block_size;
    let mut out = vec![0u8; decoded_len];
    for i in 0..full_blocks {
        let block = &bytes[i * FULL_ENCODED_BLOCK_SIZE..(i + 1) * FULL_ENCODED_BLOCK_SIZE];
        let out_block = &mut out[i * FULL_BLOCK_SIZE..(i + 1) * FULL_BLOCK_SIZE];
        decode_block(block, FULL_BLOCK_SIZE, out_block)?;
    }
    if last_block_size > 0 {
        let block = &bytes[full_blocks * FULL_ENCODED_BLOCK_SIZE..];
        let out_block = &mut out[full_blocks * FULL_BLOCK_SIZE..];
        decode_block(block, last_block_size, out_block)?;
    }
    Ok(out)
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let hash = Hash256::fast_hash(payload);
    let mut out = [0u8; CHECKSUM_SIZE];
    out.copy_from_slice(&hash.as_bytes()[..CHECKSUM_SIZE]);
    out
}

/// Encodes `address` under network `prefix`: `base58(prefix ||
/// AccountPublicAddress || checksum)`, prefix as a varint.
#[must_use]
pub fn encode_address(prefix: u64, address: &AccountPublicAddress) -> String {
    let mut payload = Vec::with_capacity(1 + 64);
    varint::write_u64(&mut payload, prefix);
    payload.extend_from_slice(address.spend_public_key.as_bytes());
    payload.extend_from_slice(address.view_public_key.as_bytes());
    let sum = checksum(&payload);
    payload.extend_from_slice(&sum);
    base58_encode(&payload)
}

/// Decodes and validates an address string: checks the checksum and that
/// both keys decompress to valid curve points.
///
/// # Errors
///
/// Returns [`Error::BadAddress`] if the base58 framing, checksum, varint
/// prefix, or either public key is malformed.
pub fn decode_address(text: &str) -> Result<(u64, AccountPublicAddress)> {
    let raw = base58_decode(text)?;
    if raw.len() < CHECKSUM_SIZE {
        return Err(Error::BadAddress("address payload shorter than a checksum".to_string()));
    }
    let (payload, expected_checksum) = raw.split_at(raw.len() - CHECKSUM_SIZE);
    if checksum(payload) != expected_checksum {
        return Err(Error::BadAddress("checksum mismatch".to_string()));
    }

    let (prefix, prefix_len) = varint::read_u64(payload)
        .map_err(|_| Error::BadAddress("malformed network prefix varint".to_string()))?;
    let keys = &payload[prefix_len..];
    if keys.len() != 64 {
        return Err(Error::BadAddress("expected 64 bytes of spend/view keys".to_string()));
    }
    let spend_public_key = PublicKey::from_slice(&keys[..32])
        .map_err(|_| Error::BadAddress("malformed spend public key".to_string()))?;
    let view_public_key = PublicKey::from_slice(&keys[32..])
        .map_err(|_| Error::BadAddress("malformed view public key".to_string()))?;
    if !is_valid_public_key(&spend_public_key) || !is_valid_public_key(&view_public_key) {
        return Err(Error::BadAddress("public key is not on the curve".to_string()));
    }

    Ok((
        prefix,
        AccountPublicAddress {
            spend_public_key,
            view_public_key,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::KeyPair;

    fn valid_key() -> PublicKey {
        KeyPair::generate().public_key
    }

    #[test]
    fn base58_roundtrips_arbitrary_lengths() {
        for len in 0..20usize {
            let data: Vec<u8> = (0..len as u8).collect();
            let encoded = base58_encode(&data);
            assert_eq!(base58_decode(&encoded).unwrap(), data);
        }
    }

    #[test]
    fn address_roundtrips_with_checksum() {
        let address = AccountPublicAddress {
            spend_public_key: valid_key(),
            view_public_key: valid_key(),
        };
        let encoded = encode_address(0x18, &address);
        let (prefix, decoded) = decode_address(&encoded).unwrap();
        assert_eq!(prefix, 0x18);
        assert_eq!(decoded, address);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let address = AccountPublicAddress {
            spend_public_key: valid_key(),
            view_public_key: valid_key(),
        };
        let mut encoded = encode_address(0x18, &address).into_bytes();
        let last = encoded.len() - 1;
        encoded[last] = if encoded[last] == b'1' { b'2' } else { b'1' };
        let text = String::from_utf8(encoded).unwrap();
        assert!(decode_address(&text).is_err());
    }

    #[test]
    fn off_curve_key_is_rejected() {
        let mut payload = Vec::new();
        varint::write_u64(&mut payload, 0x18);
        // All-0xFF bytes is extremely unlikely to be a valid compressed
        // Edwards point.
        payload.extend_from_slice(&[0xFFu8; 32]);
        payload.extend_from_slice(valid_key().as_bytes());
        let hash = Hash256::fast_hash(&payload);
        payload.extend_from_slice(&hash.as_bytes()[..CHECKSUM_SIZE]);
        let encoded = base58_encode(&payload);
        assert!(decode_address(&encoded).is_err());
    }
}
