//! Block header.

use crate::hash::{keccak256, Address, BlockNonce, Bloom, H256};
use crate::rlp::RlpList;
use num_bigint::BigUint;

/// Hash of an empty uncle list, `keccak256(rlp([]))`.
pub const EMPTY_UNCLE_HASH: H256 = H256([
    0x1d, 0xcc, 0x4d, 0xe8, 0xde, 0xc7, 0x5d, 0x7a, 0xab, 0x85, 0xb5, 0x67, 0xb6, 0xcc, 0xd4,
    0x1a, 0xd3, 0x12, 0x45, 0x1b, 0x94, 0x8a, 0x74, 0x13, 0xf0, 0xa1, 0x42, 0xfd, 0x40, 0xd4,
    0x93, 0x47,
]);

/// A block header. Immutable once sealed; the engine fills `difficulty`,
/// `nuc_difficulty`, `coinbase_txs` and `state_root` during preparation and
/// finalization, and the miner fills `mix_digest` and `nonce`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub version: u32,
    pub parent_hash: H256,
    pub uncle_hash: H256,
    pub coinbase: Address,
    pub state_root: H256,
    pub tx_hash: H256,
    pub receipt_hash: H256,
    pub bloom: Bloom,
    /// Chain retarget difficulty.
    pub difficulty: BigUint,
    /// Per-miner adjusted difficulty; the proof-of-work target derives from it.
    pub nuc_difficulty: BigUint,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    /// Seconds since the Unix epoch.
    pub time: u64,
    pub extra: Vec<u8>,
    /// Serialized per-address reward records, produced by finalization.
    pub coinbase_txs: Vec<u8>,
    pub mix_digest: H256,
    pub nonce: BlockNonce,
}

impl Header {
    /// The header hash: Keccak-256 of the canonical encoding of every field,
    /// seal fields included.
    pub fn hash(&self) -> H256 {
        let mut list = self.encode_preseal_fields();
        list.append_bytes(self.mix_digest.as_bytes());
        list.append_bytes(self.nonce.as_bytes());
        keccak256(&list.finish())
    }

    /// Canonical encoding of the consensus-critical fields, excluding the
    /// seal (`mix_digest`, `nonce`). Keccak-256 of this encoding is the
    /// proof-of-work search preimage.
    pub fn seal_encoding(&self) -> Vec<u8> {
        self.encode_preseal_fields().finish()
    }

    fn encode_preseal_fields(&self) -> RlpList {
        let mut list = RlpList::new();
        list.append_u64(self.version as u64);
        list.append_bytes(self.parent_hash.as_bytes());
        list.append_bytes(self.uncle_hash.as_bytes());
        list.append_bytes(self.coinbase.as_bytes());
        list.append_bytes(self.state_root.as_bytes());
        list.append_bytes(self.tx_hash.as_bytes());
        list.append_bytes(self.receipt_hash.as_bytes());
        list.append_bytes(self.bloom.as_bytes());
        list.append_biguint(&self.difficulty);
        list.append_biguint(&self.nuc_difficulty);
        list.append_bytes(&self.coinbase_txs);
        list.append_u64(self.number);
        list.append_u64(self.gas_limit);
        list.append_u64(self.gas_used);
        list.append_u64(self.time);
        list.append_bytes(&self.extra);
        list
    }
}
