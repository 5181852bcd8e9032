//! Canonical recursive-length-prefix encoding.
//!
//! Only the encoder subset that consensus hashing needs: byte strings,
//! unsigned integers (minimal big-endian), big integers, and lists.

use num_bigint::BigUint;

/// Encode a byte string with its length prefix.
pub fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 9);
    append_bytes(&mut out, bytes);
    out
}

/// Encode an unsigned integer as its minimal big-endian byte string.
pub fn encode_u64(value: u64) -> Vec<u8> {
    encode_bytes(&to_minimal_be(value))
}

/// Encode a big integer as its minimal big-endian byte string.
pub fn encode_biguint(value: &BigUint) -> Vec<u8> {
    if value.bits() == 0 {
        encode_bytes(&[])
    } else {
        encode_bytes(&value.to_bytes_be())
    }
}

fn to_minimal_be(value: u64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let be = value.to_be_bytes();
    let skip = be.iter().take_while(|b| **b == 0).count();
    be[skip..].to_vec()
}

fn append_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        out.push(bytes[0]);
    } else if bytes.len() < 56 {
        out.push(0x80 + bytes.len() as u8);
        out.extend_from_slice(bytes);
    } else {
        let len_be = to_minimal_be(bytes.len() as u64);
        out.push(0xb7 + len_be.len() as u8);
        out.extend_from_slice(&len_be);
        out.extend_from_slice(bytes);
    }
}

/// A list under construction. Items are appended pre-encoded; `finish`
/// wraps the payload with the list header.
#[derive(Default)]
pub struct RlpList {
    payload: Vec<u8>,
}

impl RlpList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        append_bytes(&mut self.payload, bytes);
        self
    }

    pub fn append_u64(&mut self, value: u64) -> &mut Self {
        append_bytes(&mut self.payload, &to_minimal_be(value));
        self
    }

    pub fn append_biguint(&mut self, value: &BigUint) -> &mut Self {
        self.payload.extend_from_slice(&encode_biguint(value));
        self
    }

    /// Append an already-encoded item (e.g. a nested list).
    pub fn append_raw(&mut self, encoded: &[u8]) -> &mut Self {
        self.payload.extend_from_slice(encoded);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + 9);
        if self.payload.len() < 56 {
            out.push(0xc0 + self.payload.len() as u8);
        } else {
            let len_be = to_minimal_be(self.payload.len() as u64);
            out.push(0xf7 + len_be.len() as u8);
            out.extend_from_slice(&len_be);
        }
        out.extend_from_slice(&self.payload);
        out
    }
}
