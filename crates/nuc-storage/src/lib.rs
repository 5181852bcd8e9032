//! # nuc-storage
//!
//! Side stores for the NUC node.
//!
//! Currently this is the mining-rewards record database: a small RocksDB
//! keyed by block number, holding the serialized per-address reward records
//! that finalization also embeds in the header. The store is advisory; a
//! failed write never blocks block assembly.

mod error;
mod reward;

pub use error::{StorageError, StorageResult};
pub use reward::{shared_reward_store, RewardStore};
