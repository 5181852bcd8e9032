//! Per-miner adjustments to the proof-of-work target.
//!
//! The retarget difficulty applies chain-wide; the per-miner target halves
//! for miners that recently carried enough transactions, or that hold a
//! large enough balance.

use crate::chain::ChainReader;
use num_bigint::BigUint;
use nuc_types::{Address, Transaction, H256};
use tracing::warn;

/// Current block format version.
pub const BLOCK_VERSION: u32 = 1;

/// Whether a header's version field is acceptable.
pub fn check_block_version(version: u32) -> bool {
    version == BLOCK_VERSION
}

/// Recent transactions a miner must have carried for the halved target.
const REDUCTION_TX_THRESHOLD: u64 = 10;

/// How many ancestor blocks the transaction count looks back through.
const REDUCTION_BLOCK_WINDOW: usize = 5;

/// Balance in whole coins above which the target halves.
const REDUCTION_BALANCE_THRESHOLD: u32 = 1000;

fn miner_tx_count(miner: Address, txs: &[Transaction]) -> u64 {
    txs.iter().filter(|tx| tx.from == miner).count() as u64
}

/// Halve the node difficulty for miners that recently carried enough
/// transactions. A non-zero `miner_tx_count_hint` short-circuits the chain
/// walk when the caller already counted; pass zero to walk the ancestors.
pub fn nuc_difficulty_by_tx_count(
    node_diff: &BigUint,
    chain: &dyn ChainReader,
    header_hash: H256,
    number: u64,
    miner: Address,
    miner_tx_count_hint: u64,
) -> (BigUint, u64) {
    let mut recent = miner_tx_count_hint;
    if recent == 0 {
        recent = miner_recent_tx_count(chain, header_hash, number, miner);
    }
    if recent >= REDUCTION_TX_THRESHOLD {
        (node_diff / 2u32, recent)
    } else {
        (node_diff.clone(), recent)
    }
}

/// Count the miner's transactions across the recent ancestor window,
/// stopping early once the threshold is met.
pub fn miner_recent_tx_count(
    chain: &dyn ChainReader,
    mut header_hash: H256,
    mut number: u64,
    miner: Address,
) -> u64 {
    let mut count = 0u64;
    let mut walked = 0usize;
    loop {
        if count >= REDUCTION_TX_THRESHOLD || walked > REDUCTION_BLOCK_WINDOW {
            break;
        }
        let Some(block) = chain.get_block(header_hash, number) else {
            warn!(number, hash = %header_hash, "block not found while counting miner transactions");
            break;
        };
        count += miner_tx_count(miner, &block.transactions);
        header_hash = block.parent_hash();
        let Some(parent_number) = block.number().checked_sub(1) else {
            break;
        };
        number = parent_number;
        walked += 1;
    }
    count
}

/// Halve the node difficulty for miners holding more than the balance
/// threshold, read from the state at the parent block.
pub fn nuc_difficulty_by_balance(
    node_diff: &BigUint,
    miner: Address,
    chain: &dyn ChainReader,
    parent_hash: H256,
    number: u64,
) -> BigUint {
    let Some(parent) = chain.get_block(parent_hash, number) else {
        return node_diff.clone();
    };
    let Some(state) = chain.state_at(parent.header.state_root) else {
        return node_diff.clone();
    };
    let one_coin = BigUint::from(10u32).pow(18);
    let whole_coins = state.get_balance(miner) / one_coin;
    if whole_coins > BigUint::from(REDUCTION_BALANCE_THRESHOLD) {
        node_diff / 2u32
    } else {
        node_diff.clone()
    }
}
