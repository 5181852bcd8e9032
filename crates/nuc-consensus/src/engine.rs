//! The proof-of-work engine facade.
//!
//! `Ethash` is what the chain importer talks to: header admission (single,
//! batched and uncle-graph), seal verification against the epoch cache or
//! dataset, difficulty preparation, and reward finalization.

use crate::algorithm::{self, EPOCH_LENGTH};
use crate::cache::{EpochCache, EpochDataset, EpochLru};
use crate::chain::{ChainConfig, ChainReader, StateDb, VmExecutor, DAO_FORK_EXTRA, DAO_FORK_EXTRA_RANGE};
use crate::difficulty::calc_difficulty;
use crate::miner_difficulty::{
    check_block_version, nuc_difficulty_by_balance, nuc_difficulty_by_tx_count,
};
use crate::params::{ALLOWED_FUTURE_BLOCK_SECS, MAX_UNCLES, UNCLE_ANCESTRY_DEPTH};
use crate::registry::{ContractRegistry, RegistryView};
use crate::reward::accumulate_rewards;
use crate::{ConsensusError, ConsensusResult};
use num_bigint::BigUint;
use num_traits::Zero;
use nuc_storage::RewardStore;
use nuc_types::{keccak256, Address, Block, Header, Receipt, Transaction, H256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, OnceLock};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Engine operating modes. The fake modes short-circuit seal verification
/// for tests and private networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowMode {
    /// Full verification against real epoch sizes.
    Normal,
    /// Delegate seal verification to a parent engine's caches.
    Shared,
    /// Real verification over tiny test-sized caches.
    Test,
    /// Accept every seal (headers still fully checked).
    Fake,
    /// Accept everything, headers included.
    FullFake,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EthashConfig {
    pub mode: PowMode,
    /// Epoch caches kept in memory.
    pub caches_in_mem: usize,
    /// Epoch datasets kept in memory.
    pub datasets_in_mem: usize,
}

impl Default for EthashConfig {
    fn default() -> Self {
        EthashConfig {
            mode: PowMode::Normal,
            caches_in_mem: 2,
            datasets_in_mem: 1,
        }
    }
}

enum RewardStoreMode {
    /// Open the default store under the user's home on first use.
    LazyDefault(OnceLock<Option<RewardStore>>),
    Explicit(Box<RewardStore>),
    Disabled,
}

/// Handle for cancelling an in-flight batch verification.
#[derive(Clone)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    fn new() -> Self {
        AbortHandle {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// The consensus engine.
pub struct Ethash {
    config: EthashConfig,
    caches: EpochLru<EpochCache>,
    datasets: EpochLru<EpochDataset>,
    fake_fail: Option<u64>,
    fake_delay: Duration,
    shared: Option<Arc<Ethash>>,
    reward_store: RewardStoreMode,
}

impl Ethash {
    /// A fully operational engine.
    pub fn new(config: EthashConfig) -> Self {
        let caches = EpochLru::new(config.caches_in_mem);
        let datasets = EpochLru::new(config.datasets_in_mem);
        Ethash {
            config,
            caches,
            datasets,
            fake_fail: None,
            fake_delay: Duration::ZERO,
            shared: None,
            reward_store: RewardStoreMode::LazyDefault(OnceLock::new()),
        }
    }

    /// Real verification over small test-sized caches; no side store.
    pub fn tester() -> Self {
        Ethash {
            reward_store: RewardStoreMode::Disabled,
            ..Self::new(EthashConfig {
                mode: PowMode::Test,
                ..Default::default()
            })
        }
    }

    /// Accept every seal.
    pub fn fake() -> Self {
        Ethash {
            reward_store: RewardStoreMode::Disabled,
            ..Self::new(EthashConfig {
                mode: PowMode::Fake,
                ..Default::default()
            })
        }
    }

    /// Accept every seal except the one at `fail_number`.
    pub fn fake_failing(fail_number: u64) -> Self {
        Ethash {
            fake_fail: Some(fail_number),
            ..Self::fake()
        }
    }

    /// Accept every seal after sleeping `delay`.
    pub fn fake_delayed(delay: Duration) -> Self {
        Ethash {
            fake_delay: delay,
            ..Self::fake()
        }
    }

    /// Accept everything, headers included.
    pub fn full_fake() -> Self {
        Ethash {
            reward_store: RewardStoreMode::Disabled,
            ..Self::new(EthashConfig {
                mode: PowMode::FullFake,
                ..Default::default()
            })
        }
    }

    /// Delegate seal verification to `parent`, sharing its caches.
    pub fn shared_from(parent: Arc<Ethash>) -> Self {
        Ethash {
            shared: Some(parent),
            ..Self::new(EthashConfig {
                mode: PowMode::Shared,
                ..Default::default()
            })
        }
    }

    /// Persist reward records to an explicit store instead of the default
    /// location.
    pub fn with_reward_store(mut self, store: RewardStore) -> Self {
        self.reward_store = RewardStoreMode::Explicit(Box::new(store));
        self
    }

    /// Skip reward-record persistence entirely.
    pub fn without_reward_store(mut self) -> Self {
        self.reward_store = RewardStoreMode::Disabled;
        self
    }

    pub fn mode(&self) -> PowMode {
        self.config.mode
    }

    /// The proof-of-work verified author of the block.
    pub fn author(&self, header: &Header) -> Address {
        header.coinbase
    }

    /// The proof-of-work search preimage of a header.
    pub fn seal_hash(&self, header: &Header) -> H256 {
        keccak256(&header.seal_encoding())
    }

    /// The difficulty a block created at `time` on `parent` must declare.
    pub fn calc_difficulty(&self, chain: &dyn ChainReader, time: u64, parent: &Header) -> BigUint {
        calc_difficulty(chain.config(), time, parent)
    }

    /// Initialize the difficulty fields of a header under preparation: the
    /// chain retarget, then the per-miner reductions on the sealing target.
    pub fn prepare(&self, chain: &dyn ChainReader, header: &mut Header) -> ConsensusResult<()> {
        let parent = header
            .number
            .checked_sub(1)
            .and_then(|n| chain.get_header(header.parent_hash, n))
            .ok_or(ConsensusError::UnknownAncestor)?;
        header.difficulty = calc_difficulty(chain.config(), header.time, &parent);
        let (by_tx, _) = nuc_difficulty_by_tx_count(
            &header.difficulty,
            chain,
            header.parent_hash,
            parent.number,
            header.coinbase,
            0,
        );
        header.nuc_difficulty = nuc_difficulty_by_balance(
            &by_tx,
            header.coinbase,
            chain,
            header.parent_hash,
            parent.number,
        );
        Ok(())
    }

    /// Check a single header against the chain rules.
    pub fn verify_header(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        check_seal: bool,
    ) -> ConsensusResult<()> {
        if self.config.mode == PowMode::FullFake {
            return Ok(());
        }
        // Known headers short-circuit; a missing parent ends verification.
        if chain.get_header(header.hash(), header.number).is_some() {
            return Ok(());
        }
        let parent = header
            .number
            .checked_sub(1)
            .and_then(|n| chain.get_header(header.parent_hash, n))
            .ok_or(ConsensusError::UnknownAncestor)?;
        self.verify_header_against(chain, header, &parent, false, check_seal)
    }

    /// Verify a batch of headers concurrently. Results arrive on the
    /// returned channel in input order; the handle aborts all workers.
    pub fn verify_headers(
        self: &Arc<Self>,
        chain: Arc<dyn ChainReader>,
        headers: Vec<Header>,
        seals: Vec<bool>,
    ) -> (AbortHandle, mpsc::Receiver<ConsensusResult<()>>) {
        let (results_tx, results_rx) = mpsc::channel();
        let abort = AbortHandle::new();

        if self.config.mode == PowMode::FullFake || headers.is_empty() {
            for _ in 0..headers.len() {
                let _ = results_tx.send(Ok(()));
            }
            return (abort, results_rx);
        }

        let total = headers.len();
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(total);

        let headers = Arc::new(headers);
        let seals = Arc::new(seals);
        let next = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = mpsc::channel::<(usize, ConsensusResult<()>)>();

        for _ in 0..workers {
            let engine = Arc::clone(self);
            let chain = Arc::clone(&chain);
            let headers = Arc::clone(&headers);
            let seals = Arc::clone(&seals);
            let next = Arc::clone(&next);
            let abort_flag = abort.flag();
            let done = done_tx.clone();
            thread::spawn(move || loop {
                if abort_flag.load(Ordering::Relaxed) {
                    break;
                }
                let index = next.fetch_add(1, Ordering::Relaxed);
                if index >= total {
                    break;
                }
                let result = engine.verify_header_worker(chain.as_ref(), &headers, &seals, index);
                if done.send((index, result)).is_err() {
                    break;
                }
            });
        }
        drop(done_tx);

        // Reorder buffer: emit result k only once all results below k are out.
        thread::spawn(move || {
            let mut pending: Vec<Option<ConsensusResult<()>>> = (0..total).map(|_| None).collect();
            let mut out = 0;
            while out < total {
                let Ok((index, result)) = done_rx.recv() else {
                    break;
                };
                pending[index] = Some(result);
                while out < total {
                    let Some(ready) = pending[out].take() else {
                        break;
                    };
                    if results_tx.send(ready).is_err() {
                        return;
                    }
                    out += 1;
                }
            }
        });

        (abort, results_rx)
    }

    fn verify_header_worker(
        &self,
        chain: &dyn ChainReader,
        headers: &[Header],
        seals: &[bool],
        index: usize,
    ) -> ConsensusResult<()> {
        let header = &headers[index];
        let parent = if index == 0 {
            header
                .number
                .checked_sub(1)
                .and_then(|n| chain.get_header(header.parent_hash, n))
        } else if headers[index - 1].hash() == header.parent_hash {
            Some(headers[index - 1].clone())
        } else {
            None
        };
        let Some(parent) = parent else {
            return Err(ConsensusError::UnknownAncestor);
        };
        if chain.get_header(header.hash(), header.number).is_some() {
            return Ok(());
        }
        self.verify_header_against(chain, header, &parent, false, seals[index])
    }

    /// The ordered per-header rule checks; the first failure surfaces.
    fn verify_header_against(
        &self,
        chain: &dyn ChainReader,
        header: &Header,
        parent: &Header,
        is_uncle: bool,
        check_seal: bool,
    ) -> ConsensusResult<()> {
        let config = chain.config();

        if header.extra.len() > config.max_extra_size {
            return Err(ConsensusError::ExtraTooLong {
                have: header.extra.len(),
                max: config.max_extra_size,
            });
        }
        if !is_uncle {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            if header.time > now + ALLOWED_FUTURE_BLOCK_SECS {
                return Err(ConsensusError::FutureBlock);
            }
        }
        if header.time <= parent.time {
            return Err(ConsensusError::ZeroBlockTime);
        }

        let expected = calc_difficulty(config, header.time, parent);
        if expected != header.difficulty {
            return Err(ConsensusError::InvalidDifficulty {
                have: header.difficulty.clone(),
                want: expected,
            });
        }

        let cap = u64::MAX / 2;
        if header.gas_limit > cap {
            return Err(ConsensusError::GasLimitTooHigh {
                have: header.gas_limit,
                max: cap,
            });
        }
        if header.gas_used > header.gas_limit {
            return Err(ConsensusError::InvalidGasUsed {
                have: header.gas_used,
                limit: header.gas_limit,
            });
        }
        let step = parent.gas_limit.abs_diff(header.gas_limit);
        let bound = parent.gas_limit / config.gas_limit_bound_divisor;
        if step >= bound || header.gas_limit < config.min_gas_limit {
            return Err(ConsensusError::InvalidGasLimit {
                have: header.gas_limit,
                want: parent.gas_limit,
                bound,
            });
        }

        if header.number != parent.number + 1 {
            return Err(ConsensusError::InvalidNumber);
        }

        if check_seal {
            self.verify_seal(header)?;
        }

        verify_dao_extra(config, header)?;
        verify_fork_hashes(config, header, is_uncle)?;

        if !check_block_version(header.version) {
            return Err(ConsensusError::InvalidVersion(header.version));
        }
        Ok(())
    }

    /// Validate the uncles attached to a block against the last seven
    /// generations of ancestors.
    pub fn verify_uncles(&self, chain: &dyn ChainReader, block: &Block) -> ConsensusResult<()> {
        if self.config.mode == PowMode::FullFake {
            return Ok(());
        }
        if block.uncles.len() > MAX_UNCLES {
            return Err(ConsensusError::TooManyUncles);
        }
        if block.uncles.is_empty() {
            return Ok(());
        }

        let mut ancestors: HashMap<H256, Header> = HashMap::new();
        let mut seen: HashSet<H256> = HashSet::new();

        let mut parent = block.parent_hash();
        let mut number = block.number().saturating_sub(1);
        for _ in 0..UNCLE_ANCESTRY_DEPTH {
            let Some(ancestor) = chain.get_block(parent, number) else {
                break;
            };
            for uncle in &ancestor.uncles {
                seen.insert(uncle.hash());
            }
            parent = ancestor.parent_hash();
            let ancestor_number = ancestor.number();
            ancestors.insert(ancestor.hash(), ancestor.header);
            let Some(next_number) = ancestor_number.checked_sub(1) else {
                break;
            };
            number = next_number;
        }
        ancestors.insert(block.hash(), block.header.clone());
        seen.insert(block.hash());

        for uncle in &block.uncles {
            let hash = uncle.hash();
            if !seen.insert(hash) {
                return Err(ConsensusError::DuplicateUncle);
            }
            if ancestors.contains_key(&hash) {
                return Err(ConsensusError::UncleIsAncestor);
            }
            let uncle_parent = ancestors
                .get(&uncle.parent_hash)
                .ok_or(ConsensusError::DanglingUncle)?;
            if uncle.parent_hash == block.parent_hash() {
                return Err(ConsensusError::DanglingUncle);
            }
            self.verify_header_against(chain, uncle, uncle_parent, true, true)?;
        }
        Ok(())
    }

    /// Check that the header's seal satisfies its difficulty target, using
    /// the epoch cache.
    pub fn verify_seal(&self, header: &Header) -> ConsensusResult<()> {
        self.seal_check(header, false)
    }

    /// Seal check preferring the full dataset when one is ready; kicks off
    /// background generation otherwise and falls back to the cache.
    pub fn verify_seal_with_dataset(&self, header: &Header) -> ConsensusResult<()> {
        self.seal_check(header, true)
    }

    fn seal_check(&self, header: &Header, fulldag: bool) -> ConsensusResult<()> {
        if matches!(self.config.mode, PowMode::Fake | PowMode::FullFake) {
            if !self.fake_delay.is_zero() {
                thread::sleep(self.fake_delay);
            }
            if self.fake_fail == Some(header.number) {
                return Err(ConsensusError::InvalidPoW);
            }
            return Ok(());
        }
        if let Some(shared) = &self.shared {
            return shared.seal_check(header, fulldag);
        }
        if header.nuc_difficulty.is_zero() {
            return Err(ConsensusError::NonPositiveDifficulty);
        }

        let number = header.number;
        let seal_hash = self.seal_hash(header);
        let nonce = header.nonce.to_u64();

        let mut mixed: Option<(H256, H256)> = None;
        if fulldag {
            let dataset = self.dataset(number, true);
            if let Some(data) = dataset.data() {
                mixed = Some(algorithm::hashimoto_full(data, &seal_hash, nonce));
            }
        }
        let (digest, result) = match mixed {
            Some(pair) => pair,
            None => {
                // Dataset not ready (or not requested): the cache path.
                let cache = self.cache(number);
                let size = self.dataset_bytes(number);
                algorithm::hashimoto_light(size, cache.data(), &seal_hash, nonce)
            }
        };

        if digest != header.mix_digest {
            return Err(ConsensusError::InvalidMixDigest);
        }
        let target = (BigUint::from(1u32) << 256usize) / &header.nuc_difficulty;
        if BigUint::from_bytes_be(result.as_bytes()) > target {
            return Err(ConsensusError::InvalidPoW);
        }
        Ok(())
    }

    fn cache_bytes(&self, number: u64) -> u64 {
        if self.config.mode == PowMode::Test {
            1024
        } else {
            algorithm::cache_size(number)
        }
    }

    fn dataset_bytes(&self, number: u64) -> u64 {
        if self.config.mode == PowMode::Test {
            32 * 1024
        } else {
            algorithm::dataset_size(number)
        }
    }

    fn cache(&self, number: u64) -> Arc<EpochCache> {
        let epoch = number / EPOCH_LENGTH;
        let size = self.cache_bytes(number);
        self.caches
            .get_or_insert(epoch, || EpochCache::generate(epoch, size))
    }

    fn dataset(&self, number: u64, spawn: bool) -> Arc<EpochDataset> {
        let epoch = number / EPOCH_LENGTH;
        let size = self.dataset_bytes(number);
        let dataset = self
            .datasets
            .get_or_insert(epoch, || EpochDataset::new(epoch, size));
        if spawn && !dataset.generated() && dataset.claim_generation() {
            let cache = self.cache(number);
            let background = Arc::clone(&dataset);
            thread::spawn(move || {
                background.generate(&cache);
            });
        }
        dataset
    }

    /// Distribute block rewards through the on-chain registry and commit
    /// the final state root into the header.
    pub fn finalize(
        &self,
        chain: &dyn ChainReader,
        header: &mut Header,
        state: &mut dyn StateDb,
        txs: &[Transaction],
        uncles: &[Header],
        vm: &dyn VmExecutor,
    ) {
        let view = header.clone();
        let registry = ContractRegistry::new(vm, &view);
        self.finalize_with_registry(chain, header, state, txs, uncles, &registry);
    }

    /// Finalization against an explicit registry view.
    pub fn finalize_with_registry(
        &self,
        chain: &dyn ChainReader,
        header: &mut Header,
        state: &mut dyn StateDb,
        txs: &[Transaction],
        uncles: &[Header],
        registry: &dyn RegistryView,
    ) {
        accumulate_rewards(header, state, txs, uncles, registry, self.reward_store());
        header.state_root = state.intermediate_root(chain.config().is_eip158(header.number));
    }

    /// Finalize and bundle the block.
    pub fn finalize_and_assemble(
        &self,
        chain: &dyn ChainReader,
        header: &mut Header,
        state: &mut dyn StateDb,
        txs: &[Transaction],
        uncles: &[Header],
        receipts: &[Receipt],
        vm: &dyn VmExecutor,
    ) -> Block {
        self.finalize(chain, header, state, txs, uncles, vm);
        Block::new(
            header.clone(),
            txs.to_vec(),
            uncles.to_vec(),
            receipts.to_vec(),
        )
    }

    fn reward_store(&self) -> Option<&RewardStore> {
        match &self.reward_store {
            RewardStoreMode::Disabled => None,
            RewardStoreMode::Explicit(store) => Some(store.as_ref()),
            RewardStoreMode::LazyDefault(cell) => cell
                .get_or_init(|| match RewardStore::open_default() {
                    Ok(store) => Some(store),
                    Err(err) => {
                        warn!(%err, "cannot open mining-rewards store");
                        None
                    }
                })
                .as_ref(),
        }
    }
}

fn verify_dao_extra(config: &ChainConfig, header: &Header) -> ConsensusResult<()> {
    let Some(dao_block) = config.dao_fork_block else {
        return Ok(());
    };
    if header.number < dao_block || header.number >= dao_block + DAO_FORK_EXTRA_RANGE {
        return Ok(());
    }
    let matches_fork = header.extra == DAO_FORK_EXTRA;
    if config.dao_fork_support != matches_fork {
        return Err(ConsensusError::DaoExtraMismatch);
    }
    Ok(())
}

fn verify_fork_hashes(config: &ChainConfig, header: &Header, is_uncle: bool) -> ConsensusResult<()> {
    if is_uncle {
        return Ok(());
    }
    for (number, hash) in &config.fork_hashes {
        if *number == header.number && header.hash() != *hash {
            return Err(ConsensusError::ForkHashMismatch { number: *number });
        }
    }
    Ok(())
}
