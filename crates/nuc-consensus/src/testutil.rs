//! In-memory test doubles for the engine's collaborators.

use crate::chain::{CallMessage, ChainConfig, ChainReader, StateDb, VmError, VmExecutor};
use crate::registry::{
    PocMember, PoolMember, PostMember, PowMember, RegistryError, RegistryResult, RegistryView,
};
use num_bigint::BigUint;
use num_traits::Zero;
use nuc_types::{keccak256, Address, Block, Header, H256};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Ledger fake: plain maps for balances and the PoC counters.
#[derive(Debug, Default)]
pub struct InMemoryState {
    balances: std::collections::BTreeMap<Address, BigUint>,
    poc_balances: std::collections::BTreeMap<Address, BigUint>,
}

impl InMemoryState {
    pub fn balance(&self, addr: Address) -> BigUint {
        self.balances.get(&addr).cloned().unwrap_or_default()
    }

    pub fn all_poc_balance(&self, addr: Address) -> BigUint {
        self.poc_balances.get(&addr).cloned().unwrap_or_default()
    }

    pub fn set_all_poc_balance(&mut self, addr: Address, amount: BigUint) {
        self.poc_balances.insert(addr, amount);
    }

    /// Sum of every credited balance, the sink included.
    pub fn total_credited(&self) -> BigUint {
        self.balances.values().fold(BigUint::zero(), |a, b| a + b)
    }
}

impl StateDb for InMemoryState {
    fn get_balance(&self, addr: Address) -> BigUint {
        self.balance(addr)
    }

    fn add_balance(&mut self, addr: Address, amount: &BigUint) {
        let entry = self.balances.entry(addr).or_default();
        *entry += amount;
    }

    fn get_all_poc_balance(&self, addr: Address) -> BigUint {
        self.all_poc_balance(addr)
    }

    fn add_all_poc_balance(&mut self, addr: Address, amount: &BigUint) {
        let entry = self.poc_balances.entry(addr).or_default();
        *entry += amount;
    }

    fn intermediate_root(&mut self, eip158: bool) -> H256 {
        let mut preimage = vec![u8::from(eip158)];
        for (addr, balance) in &self.balances {
            preimage.extend_from_slice(addr.as_bytes());
            preimage.extend_from_slice(&balance.to_bytes_be());
        }
        for (addr, balance) in &self.poc_balances {
            preimage.extend_from_slice(addr.as_bytes());
            preimage.extend_from_slice(&balance.to_bytes_be());
        }
        keccak256(&preimage)
    }
}

/// Registry fake backed by plain vectors. Paging serves the whole set on
/// the first page.
#[derive(Debug, Default)]
pub struct FakeRegistry {
    pub powers: Vec<PowMember>,
    pub pocers: Vec<PocMember>,
    pub poolers: Vec<PoolMember>,
    pub posters: Vec<PostMember>,
    pub ratio: BigUint,
    /// When set, every call fails; exercises the graceful-degradation path.
    pub fail_calls: bool,
}

impl FakeRegistry {
    fn guard(&self) -> RegistryResult<()> {
        if self.fail_calls {
            Err(RegistryError::Vm(VmError::Other("registry down".into())))
        } else {
            Ok(())
        }
    }

    fn page<T: Clone>(items: &[T], offset: u64, page_size: u64) -> Vec<T> {
        let start = (offset as usize).min(items.len());
        let end = (offset + page_size).min(items.len() as u64) as usize;
        items[start..end].to_vec()
    }
}

impl RegistryView for FakeRegistry {
    fn pow_count(&self, _state: &mut dyn StateDb) -> RegistryResult<BigUint> {
        self.guard()?;
        Ok(BigUint::from(self.powers.len()))
    }

    fn all_powers(
        &self,
        _state: &mut dyn StateDb,
        offset: u64,
        page_size: u64,
    ) -> RegistryResult<Vec<PowMember>> {
        self.guard()?;
        Ok(Self::page(&self.powers, offset, page_size))
    }

    fn poc_count(&self, _state: &mut dyn StateDb) -> RegistryResult<BigUint> {
        self.guard()?;
        Ok(BigUint::from(self.pocers.len()))
    }

    fn all_pocers(
        &self,
        _state: &mut dyn StateDb,
        offset: u64,
        page_size: u64,
    ) -> RegistryResult<Vec<PocMember>> {
        self.guard()?;
        Ok(Self::page(&self.pocers, offset, page_size))
    }

    fn pool_count(&self, _state: &mut dyn StateDb) -> RegistryResult<BigUint> {
        self.guard()?;
        Ok(BigUint::from(self.poolers.len()))
    }

    fn all_poolers(
        &self,
        _state: &mut dyn StateDb,
        offset: u64,
        page_size: u64,
    ) -> RegistryResult<Vec<PoolMember>> {
        self.guard()?;
        Ok(Self::page(&self.poolers, offset, page_size))
    }

    fn post_count(&self, _state: &mut dyn StateDb) -> RegistryResult<BigUint> {
        self.guard()?;
        Ok(BigUint::from(self.posters.len()))
    }

    fn all_posters(
        &self,
        _state: &mut dyn StateDb,
        offset: u64,
        page_size: u64,
    ) -> RegistryResult<Vec<PostMember>> {
        self.guard()?;
        Ok(Self::page(&self.posters, offset, page_size))
    }

    fn reward_ratio(&self, _state: &mut dyn StateDb) -> RegistryResult<BigUint> {
        self.guard()?;
        Ok(self.ratio.clone())
    }
}

/// Chain reader fake over hash-indexed maps.
#[derive(Default)]
pub struct MemoryChain {
    config: ChainConfig,
    headers: RwLock<HashMap<(H256, u64), Header>>,
    blocks: RwLock<HashMap<(H256, u64), Block>>,
}

impl MemoryChain {
    pub fn new(config: ChainConfig) -> Self {
        MemoryChain {
            config,
            ..Default::default()
        }
    }

    pub fn insert_header(&self, header: Header) {
        self.headers
            .write()
            .insert((header.hash(), header.number), header);
    }

    pub fn insert_block(&self, block: Block) {
        self.insert_header(block.header.clone());
        self.blocks
            .write()
            .insert((block.hash(), block.number()), block);
    }
}

impl ChainReader for MemoryChain {
    fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn get_header(&self, hash: H256, number: u64) -> Option<Header> {
        self.headers.read().get(&(hash, number)).cloned()
    }

    fn get_block(&self, hash: H256, number: u64) -> Option<Block> {
        self.blocks.read().get(&(hash, number)).cloned()
    }

    fn state_at(&self, _root: H256) -> Option<Box<dyn StateDb>> {
        None
    }
}

/// VM fake that returns a canned buffer, or reverts.
pub struct CannedVm {
    pub output: Vec<u8>,
    pub fail: bool,
}

impl VmExecutor for CannedVm {
    fn apply_message(
        &self,
        _msg: &CallMessage,
        _header: &Header,
        _state: &mut dyn StateDb,
        _gas_pool: u64,
    ) -> Result<Vec<u8>, VmError> {
        if self.fail {
            Err(VmError::Reverted)
        } else {
            Ok(self.output.clone())
        }
    }
}
