//! Canonical, deterministic binary encoding: the format used
//! both for hashing (transaction hash, block id) and for on-disk
//! persistence. `bond-core` hashes via `serde_json`, which is rejected
//! here because its framing is not this protocol's wire format; grounded
//! instead on `CryptoNoteCore/CryptoNoteSerialization.cpp`'s
//! tag scheme.

use crate::error::{Error, Result};
use shared::{varint, Hash256};

/// A `&[u8]` position wrapper used for decoding. Generalizes the source's
/// iterator-pair `read_varint(first, last, ...)` calls into a struct with a
/// cursor, so decode functions don't need to thread two iterators through
/// every call.
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::ShortRead {
                expected: len,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u32_fixed(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_varint_u64(&mut self) -> Result<u64> {
        let (value, read) = varint::read_u64(&self.data[self.pos..])?;
        self.pos += read;
        Ok(value)
    }

    pub fn read_varint_u32(&mut self) -> Result<u32> {
        let (value, read) = varint::read_u32(&self.data[self.pos..])?;
        self.pos += read;
        Ok(value)
    }

    pub fn read_varint_usize(&mut self) -> Result<usize> {
        Ok(self.read_varint_u64()? as usize)
    }

    /// `cumulativeDifficulty` and similar fields widen past 64 bits in
    /// practice (difficulty arithmetic here is explicitly 128-bit);
    /// persisted as two consecutive varint `u64` halves (high, then low).
    pub fn read_varint_u128(&mut self) -> Result<u128> {
        let hi = self.read_varint_u64()?;
        let lo = self.read_varint_u64()?;
        Ok((u128::from(hi) << 64) | u128::from(lo))
    }

    pub fn read_hash(&mut self) -> Result<Hash256> {
        let bytes = self.read_bytes(32)?;
        Ok(Hash256::from_slice(bytes).expect("exactly 32 bytes read"))
    }

    pub fn read_signature(&mut self) -> Result<shared::Signature> {
        let bytes = self.read_bytes(64)?;
        shared::Signature::from_slice(bytes).map_err(Into::into)
    }

    pub fn read_public_key(&mut self) -> Result<shared::PublicKey> {
        let bytes = self.read_bytes(32)?;
        shared::PublicKey::from_slice(bytes).map_err(Into::into)
    }
}

/// Companion writer to [`Cursor::read_varint_u128`]: high half then low half.
pub fn write_u128(out: &mut Vec<u8>, value: u128) {
    varint::write_u64(out, (value >> 64) as u64);
    varint::write_u64(out, value as u64);
}

/// Appends a varint-length-prefixed byte string.
pub fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    varint::write_usize(out, bytes.len());
    out.extend_from_slice(bytes);
}

pub fn read_bytes_prefixed<'a>(cursor: &mut Cursor<'a>) -> Result<&'a [u8]> {
    let len = cursor.read_varint_usize()?;
    cursor.read_bytes(len)
}

pub fn write_hash(out: &mut Vec<u8>, hash: &Hash256) {
    out.extend_from_slice(hash.as_bytes());
}

pub fn write_public_key(out: &mut Vec<u8>, key: &shared::PublicKey) {
    out.extend_from_slice(key.as_bytes());
}

pub fn write_signature(out: &mut Vec<u8>, sig: &shared::Signature) {
    out.extend_from_slice(sig.as_bytes());
}

/// Deterministic binary encoding: every wire type in this model
/// implements this pair. `encode` appends to an existing buffer (so nested
/// types don't allocate per field); `decode` consumes from a `Cursor`.
pub trait CanonicalEncode: Sized {
    fn encode(&self, out: &mut Vec<u8>);

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

pub trait CanonicalDecode: Sized {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self>;
}

/// Varint-length-prefixed array encoding/decoding for any `CanonicalEncode`
/// element type: arrays begin with a varint length followed by the
/// element encodings, with no per-element delimiters.
pub fn write_array<T: CanonicalEncode>(out: &mut Vec<u8>, items: &[T]) {
    varint::write_usize(out, items.len());
    for item in items {
        item.encode(out);
    }
}

pub fn read_array<T: CanonicalDecode>(cursor: &mut Cursor<'_>, size_limit: usize) -> Result<Vec<T>> {
    let len = cursor.read_varint_usize()?;
    if len > size_limit {
        return Err(Error::SizeLimit {
            size: len,
            limit: size_limit,
        });
    }
    let mut items = Vec::with_capacity(len.min(4096));
    for _ in 0..len {
        items.push(T::decode(cursor)?);
    }
    Ok(items)
}

/// A sane ceiling on array lengths decoded from untrusted bytes, so a
/// corrupt or hostile length prefix can't force an enormous allocation.
pub const MAX_ARRAY_LEN: usize = 1_000_000;

impl CanonicalEncode for Hash256 {
    fn encode(&self, out: &mut Vec<u8>) {
        write_hash(out, self);
    }
}

impl CanonicalDecode for Hash256 {
    fn decode(cursor: &mut Cursor<'_>) -> Result<Self> {
        cursor.read_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_of_hashes_roundtrips() {
        let hashes = vec![
            Hash256::fast_hash(b"a"),
            Hash256::fast_hash(b"b"),
            Hash256::fast_hash(b"c"),
        ];
        let mut buf = Vec::new();
        write_array(&mut buf, &hashes);
        let mut cursor = Cursor::new(&buf);
        let decoded: Vec<Hash256> = read_array(&mut cursor, MAX_ARRAY_LEN).unwrap();
        assert_eq!(decoded, hashes);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn oversized_array_length_is_rejected() {
        let mut buf = Vec::new();
        varint::write_usize(&mut buf, 10);
        let mut cursor = Cursor::new(&buf);
        let result: Result<Vec<Hash256>> = read_array(&mut cursor, 5);
        assert!(matches!(result, Err(Error::SizeLimit { size: 10, limit: 5 })));
    }

    #[test]
    fn short_read_reports_expected_and_available() {
        let buf = [1u8, 2, 3];
        let mut cursor = Cursor::new(&buf);
        let err = cursor.read_bytes(10).unwrap_err();
        assert_eq!(
            err,
            Error::ShortRead {
                expected: 10,
                available: 3
            }
        );
    }
}
