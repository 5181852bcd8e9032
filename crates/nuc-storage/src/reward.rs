//! The mining-rewards record store.

use crate::{StorageError, StorageResult};
use rocksdb::{Options, DB};
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

/// Store directory under the user's home, mirroring the node data layout.
const REWARD_STORE_DIR: &str = ".nuc/mining-rewards";

/// Key-value store of `block number -> serialized coinbase records`.
///
/// Writes are single-keyed by block number, so no batching is needed.
pub struct RewardStore {
    db: DB,
}

impl RewardStore {
    /// Open (or create) the store at the default location,
    /// `<home>/.nuc/mining-rewards`.
    pub fn open_default() -> StorageResult<Self> {
        let home = dirs::home_dir().ok_or(StorageError::NoHomeDir)?;
        Self::open(home.join(REWARD_STORE_DIR))
    }

    /// Open (or create) the store at an explicit path.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();
        info!("Opening mining-rewards store at {:?}", path);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(32);
        opts.set_keep_log_file_num(1);

        let db = DB::open(&opts, path)?;
        Ok(RewardStore { db })
    }

    /// Persist the reward records for a block.
    pub fn put(&self, number: u64, records: &[u8]) -> StorageResult<()> {
        self.db.put(number_key(number), records)?;
        Ok(())
    }

    /// Fetch the reward records for a block. A miss returns empty bytes.
    pub fn rewards_by_number(&self, number: u64) -> Vec<u8> {
        match self.db.get(number_key(number)) {
            Ok(Some(bytes)) => bytes,
            _ => Vec::new(),
        }
    }
}

/// Minimal big-endian encoding of the block number, matching the key layout
/// used on the existing chain (block 0 maps to the empty key).
fn number_key(number: u64) -> Vec<u8> {
    let be = number.to_be_bytes();
    let skip = be.iter().take_while(|b| **b == 0).count();
    be[skip..].to_vec()
}

static SHARED: OnceLock<StorageResult<RewardStore>> = OnceLock::new();

/// The process-wide reward store, opened lazily at the default location and
/// reused thereafter. Returns an error each time if the initial open failed.
pub fn shared_reward_store() -> Result<&'static RewardStore, &'static StorageError> {
    SHARED
        .get_or_init(RewardStore::open_default)
        .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, RewardStore) {
        let dir = TempDir::new().unwrap();
        let store = RewardStore::open(dir.path().join("rewards")).unwrap();
        (dir, store)
    }

    #[test]
    fn put_then_get_round_trips() {
        let (_dir, store) = open_temp();
        let records = vec![0xaa; 44];
        store.put(110, &records).unwrap();
        assert_eq!(store.rewards_by_number(110), records);
    }

    #[test]
    fn miss_returns_empty() {
        let (_dir, store) = open_temp();
        assert!(store.rewards_by_number(999).is_empty());
    }

    #[test]
    fn overwrite_replaces_value() {
        let (_dir, store) = open_temp();
        store.put(5, &[1, 2, 3]).unwrap();
        store.put(5, &[4, 5, 6]).unwrap();
        assert_eq!(store.rewards_by_number(5), vec![4, 5, 6]);
    }

    #[test]
    fn number_key_is_minimal_big_endian() {
        assert_eq!(number_key(0), Vec::<u8>::new());
        assert_eq!(number_key(110), vec![110]);
        assert_eq!(number_key(0x0102), vec![1, 2]);
    }
}
