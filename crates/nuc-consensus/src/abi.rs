//! Minimal ABI codec for the registry contract's view methods.
//!
//! Call encoding is selector + 32-byte big-endian words. Decoding covers
//! exactly the shapes the registry returns: single words, address arrays,
//! and arrays of (possibly dynamic) tuples, all addressed by absolute byte
//! offsets into the return buffer.

use num_bigint::BigUint;
use nuc_types::{keccak256, Address};
use thiserror::Error;

/// ABI decoding errors. Any of these downgrades a registry call to an empty
/// participant set.
#[derive(Error, Debug)]
pub enum AbiError {
    #[error("truncated ABI data at offset {0}")]
    Truncated(usize),

    #[error("ABI length or offset out of range")]
    OutOfRange,
}

/// The 4-byte method selector: the leading bytes of the signature's
/// Keccak-256.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    [digest.0[0], digest.0[1], digest.0[2], digest.0[3]]
}

/// Pack a call: selector followed by each argument as a 32-byte word.
pub fn encode_call(signature: &str, args: &[BigUint]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + args.len() * 32);
    out.extend_from_slice(&selector(signature));
    for arg in args {
        out.extend_from_slice(&encode_uint(arg));
    }
    out
}

fn encode_uint(value: &BigUint) -> [u8; 32] {
    let mut word = [0u8; 32];
    let be = value.to_bytes_be();
    // Values wider than a word cannot be call arguments here.
    let n = be.len().min(32);
    word[32 - n..].copy_from_slice(&be[be.len() - n..]);
    word
}

/// Cursor over a return buffer.
pub struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data }
    }

    fn word(&self, offset: usize) -> Result<&'a [u8], AbiError> {
        self.data
            .get(offset..offset + 32)
            .ok_or(AbiError::Truncated(offset))
    }

    pub fn uint(&self, offset: usize) -> Result<BigUint, AbiError> {
        Ok(BigUint::from_bytes_be(self.word(offset)?))
    }

    /// A word interpreted as a length or relative offset. Rejects values
    /// that cannot index the buffer.
    pub fn usize_at(&self, offset: usize) -> Result<usize, AbiError> {
        let word = self.word(offset)?;
        if word[..24].iter().any(|b| *b != 0) {
            return Err(AbiError::OutOfRange);
        }
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&word[24..32]);
        let value = u64::from_be_bytes(raw);
        if value > self.data.len() as u64 {
            return Err(AbiError::OutOfRange);
        }
        Ok(value as usize)
    }

    pub fn address(&self, offset: usize) -> Result<Address, AbiError> {
        Ok(Address::from_slice(self.word(offset)?))
    }

    /// An `address[]` whose length word sits at `offset`.
    pub fn address_array(&self, offset: usize) -> Result<Vec<Address>, AbiError> {
        let len = self.usize_at(offset)?;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            out.push(self.address(offset + 32 + 32 * i)?);
        }
        Ok(out)
    }
}
