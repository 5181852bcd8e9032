//! Fixed-width byte primitives and Keccak hashing.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256, Keccak512};
use std::fmt;

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

fn deserialize_hex<'de, D: Deserializer<'de>, const N: usize>(
    deserializer: D,
) -> Result<[u8; N], D::Error> {
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    let raw = hex::decode(s).map_err(D::Error::custom)?;
    raw.try_into()
        .map_err(|_| D::Error::custom(format!("expected {} bytes", N)))
}

/// Compute the Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    H256(hasher.finalize().into())
}

/// Compute the Keccak-512 digest of `data` (64 bytes).
pub fn keccak512(data: &[u8]) -> [u8; 64] {
    let mut hasher = Keccak512::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// A 32-byte hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct H256(pub [u8; 32]);

impl H256 {
    /// The all-zero hash.
    pub const ZERO: H256 = H256([0u8; 32]);

    /// Interpret a slice as a hash, right-aligned and zero-padded on the left.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut out = [0u8; 32];
        let n = bytes.len().min(32);
        out[32 - n..].copy_from_slice(&bytes[bytes.len() - n..]);
        H256(out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }
}

impl Serialize for H256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_hex(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for H256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_hex::<D, 32>(deserializer).map(H256)
    }
}

/// A 20-byte account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The all-zero address. Absorbs undistributed rewards and team fees.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Interpret a slice as an address, right-aligned and zero-padded on the
    /// left (so a 32-byte ABI word decodes to its low 20 bytes).
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut out = [0u8; 20];
        let n = bytes.len().min(20);
        out[20 - n..].copy_from_slice(&bytes[bytes.len() - n..]);
        Address(out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_hex(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_hex::<D, 20>(deserializer).map(Address)
    }
}

/// The 256-byte log bloom filter carried in each header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bloom(pub [u8; 256]);

impl Bloom {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Default for Bloom {
    fn default() -> Self {
        Bloom([0u8; 256])
    }
}

/// The 8-byte proof-of-work nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockNonce(pub [u8; 8]);

impl BlockNonce {
    /// Encode a u64 as a big-endian nonce.
    pub fn from_u64(n: u64) -> Self {
        BlockNonce(n.to_be_bytes())
    }

    /// The nonce as a u64 (big-endian interpretation).
    pub fn to_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}
