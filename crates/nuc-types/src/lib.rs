//! # nuc-types
//!
//! Core chain types for the NUC blockchain.
//!
//! This crate provides:
//! - Fixed-width byte primitives (`Address`, `H256`, `Bloom`, `BlockNonce`)
//! - Keccak-256 / Keccak-512 hashing helpers
//! - A canonical recursive-length-prefix encoder for consensus hashing
//! - The block `Header`, `Block`, `Transaction` and `Receipt` types

mod block;
mod hash;
mod header;
pub mod rlp;
mod transaction;

pub use block::Block;
pub use hash::{keccak256, keccak512, Address, BlockNonce, Bloom, H256};
pub use header::{Header, EMPTY_UNCLE_HASH};
pub use transaction::{Receipt, Transaction};
