//! Blocks.

use crate::hash::H256;
use crate::header::Header;
use crate::transaction::{Receipt, Transaction};

/// A full block: header plus ordered transactions and uncles.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
    pub uncles: Vec<Header>,
    pub receipts: Vec<Receipt>,
}

impl Block {
    pub fn new(
        header: Header,
        transactions: Vec<Transaction>,
        uncles: Vec<Header>,
        receipts: Vec<Receipt>,
    ) -> Self {
        Block {
            header,
            transactions,
            uncles,
            receipts,
        }
    }

    pub fn hash(&self) -> H256 {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn parent_hash(&self) -> H256 {
        self.header.parent_hash
    }
}
