//! # nuc-consensus
//!
//! The NUC proof-of-work consensus engine.
//!
//! This crate provides:
//! - Header admission: timestamp, gas, difficulty, ancestry, uncle and
//!   seal rules, with a concurrent ordered pipeline for header batches
//! - The difficulty retarget (Frontier default, later variants behind
//!   chain-config gates) with the exponential bomb term
//! - Ethash seal verification over epoch caches and optional datasets
//! - Reward finalization: a four-class split (PoW, PoC, Pool, PoST) read
//!   from the on-chain staking registry, serialized into the header and
//!   persisted to the mining-rewards side store
//!
//! External collaborators are traits in [`chain`]: the chain reader, the
//! state database and the virtual machine executing registry view calls.

mod abi;
mod algorithm;
mod cache;
mod chain;
mod difficulty;
mod engine;
mod error;
mod miner_difficulty;
mod registry;
mod reward;

#[cfg(test)]
pub(crate) mod testutil;

pub use abi::{encode_call, selector, AbiError};
pub use algorithm::{
    cache_size, calc_dataset_item, dataset_size, generate_cache, generate_dataset, hashimoto_full,
    hashimoto_light, seed_hash, EPOCH_LENGTH,
};
pub use cache::{EpochCache, EpochDataset};
pub use chain::{
    CallMessage, ChainConfig, ChainReader, StateDb, VmError, VmExecutor, DAO_FORK_EXTRA,
    DAO_FORK_EXTRA_RANGE,
};
pub use difficulty::calc_difficulty;
pub use engine::{AbortHandle, Ethash, EthashConfig, PowMode};
pub use error::{ConsensusError, ConsensusResult};
pub use miner_difficulty::{
    check_block_version, miner_recent_tx_count, nuc_difficulty_by_balance,
    nuc_difficulty_by_tx_count, BLOCK_VERSION,
};
pub use registry::{
    ContractRegistry, PocMember, PoolMember, PostMember, PowMember, RegistryError, RegistryResult,
    RegistryView, StakeRecord, REGISTRY_ADDR, REGISTRY_PAGE_SIZE,
};
pub use reward::{
    accumulate_rewards, base_block_reward, compute_rewards, poc_block_reward, pool_block_reward,
    post_block_reward, pow_block_reward, CoinbaseRecord, CoinbaseRecords, MinerClass, MiningUser,
    MiningUsers, COINBASE_SINK, RECORD_ENTRY_BYTES,
};

/// Consensus protocol parameters.
pub mod params {
    /// Maximum number of uncles allowed in a single block.
    pub const MAX_UNCLES: usize = 2;

    /// How far into the future a header timestamp may run, in seconds.
    pub const ALLOWED_FUTURE_BLOCK_SECS: u64 = 60;

    /// Generations of ancestors considered for uncle validity.
    pub const UNCLE_ANCESTRY_DEPTH: usize = 7;
}
