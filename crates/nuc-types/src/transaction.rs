//! Transactions and receipts, to the extent the consensus engine needs them.

use crate::hash::Address;
use num_bigint::BigUint;

/// A transaction. The engine only reads the sender and gas accounting
/// fields; execution lives elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Transaction {
    pub from: Address,
    pub nonce: u64,
    pub gas_price: BigUint,
    pub gas: u64,
    pub to: Option<Address>,
    pub value: BigUint,
    pub data: Vec<u8>,
}

impl Transaction {
    /// The fee this transaction contributes to the block: `gas_price * gas`.
    pub fn fee(&self) -> BigUint {
        &self.gas_price * BigUint::from(self.gas)
    }
}

/// An execution receipt. Carried through block assembly unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Receipt {
    pub succeeded: bool,
    pub gas_used: u64,
}
