//! Chain configuration and the seams to the engine's collaborators:
//! the chain reader, the state database and the virtual machine.

use num_bigint::BigUint;
use nuc_types::{Address, Block, Header, H256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Extra-data value that pro-fork clients must carry across the DAO fork
/// window ("dao-hard-fork").
pub const DAO_FORK_EXTRA: &[u8] = b"dao-hard-fork";

/// Number of blocks after the DAO fork during which the extra-data rule
/// applies.
pub const DAO_FORK_EXTRA_RANGE: u64 = 10;

/// Static chain parameters. A default configuration has every fork gate
/// closed, which keeps the Frontier difficulty rules active for all blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,

    /// Fork gates: the rule set applies from the given number onward.
    pub homestead_block: Option<u64>,
    pub byzantium_block: Option<u64>,
    pub constantinople_block: Option<u64>,
    pub eip158_block: Option<u64>,

    /// DAO fork block and whether this node supports the fork.
    pub dao_fork_block: Option<u64>,
    pub dao_fork_support: bool,

    /// Canonical header hashes pinned at specific numbers.
    pub fork_hashes: Vec<(u64, H256)>,

    /// Maximum length of the header extra-data section.
    pub max_extra_size: usize,
    /// Divisor bounding per-block gas-limit movement.
    pub gas_limit_bound_divisor: u64,
    /// Minimum gas limit any block may declare.
    pub min_gas_limit: u64,
    /// Floor for the retarget difficulty.
    pub minimum_difficulty: u64,
    /// Divisor for the per-block retarget step.
    pub difficulty_bound_divisor: u64,
    /// Block interval (seconds) separating step-up from step-down in the
    /// Frontier retarget.
    pub duration_limit: u64,
}

impl ChainConfig {
    /// The NUC main network configuration.
    pub fn mainnet() -> Self {
        ChainConfig {
            chain_id: 1,
            homestead_block: None,
            byzantium_block: None,
            constantinople_block: None,
            eip158_block: None,
            dao_fork_block: None,
            dao_fork_support: false,
            fork_hashes: Vec::new(),
            max_extra_size: 32,
            gas_limit_bound_divisor: 1024,
            min_gas_limit: 5000,
            minimum_difficulty: 131_072,
            difficulty_bound_divisor: 2048,
            duration_limit: 13,
        }
    }

    fn active(gate: Option<u64>, number: u64) -> bool {
        gate.map_or(false, |g| number >= g)
    }

    pub fn is_homestead(&self, number: u64) -> bool {
        Self::active(self.homestead_block, number)
    }

    pub fn is_byzantium(&self, number: u64) -> bool {
        Self::active(self.byzantium_block, number)
    }

    pub fn is_constantinople(&self, number: u64) -> bool {
        Self::active(self.constantinople_block, number)
    }

    pub fn is_eip158(&self, number: u64) -> bool {
        Self::active(self.eip158_block, number)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::mainnet()
    }
}

/// Read access to the canonical chain. Implementations must be safe for
/// concurrent reads; batch verification calls in from worker threads.
pub trait ChainReader: Send + Sync {
    fn config(&self) -> &ChainConfig;

    /// Fetch a header by hash and number, if known.
    fn get_header(&self, hash: H256, number: u64) -> Option<Header>;

    /// Fetch a full block by hash and number, if known.
    fn get_block(&self, hash: H256, number: u64) -> Option<Block>;

    /// Open the state as of the given root, if available.
    fn state_at(&self, root: H256) -> Option<Box<dyn StateDb>>;
}

/// The ledger the engine mutates during finalization.
pub trait StateDb {
    fn get_balance(&self, addr: Address) -> BigUint;
    fn add_balance(&mut self, addr: Address, amount: &BigUint);

    /// Cumulative PoC reward counter, used to enforce the 120% stake cap.
    fn get_all_poc_balance(&self, addr: Address) -> BigUint;
    fn add_all_poc_balance(&mut self, addr: Address, amount: &BigUint);

    /// Compute the state root over all mutations so far.
    fn intermediate_root(&mut self, eip158: bool) -> H256;
}

/// A call message executed against pre-state by the virtual machine.
#[derive(Debug, Clone)]
pub struct CallMessage {
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub value: BigUint,
    pub gas: u64,
    pub gas_price: BigUint,
    pub input: Vec<u8>,
    pub check_nonce: bool,
}

/// Errors surfaced by the virtual machine.
#[derive(Error, Debug)]
pub enum VmError {
    #[error("execution reverted")]
    Reverted,

    #[error("vm error: {0}")]
    Other(String),
}

/// The virtual machine seam. The engine only issues read-style calls
/// through it; `gas_pool` caps the total gas the execution may draw.
pub trait VmExecutor {
    fn apply_message(
        &self,
        msg: &CallMessage,
        header: &Header,
        state: &mut dyn StateDb,
        gas_pool: u64,
    ) -> Result<Vec<u8>, VmError>;
}
