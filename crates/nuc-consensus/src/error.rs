//! Error types for consensus validation.

use num_bigint::BigUint;
use thiserror::Error;

/// Consensus validation errors.
#[derive(Error, Debug)]
pub enum ConsensusError {
    /// Parent header is not known to the chain.
    #[error("unknown ancestor")]
    UnknownAncestor,

    /// Header timestamp is beyond the allowed future window.
    #[error("block in the future")]
    FutureBlock,

    /// Header timestamp does not advance past the parent's.
    #[error("timestamp equals parent's")]
    ZeroBlockTime,

    /// Header difficulty does not match the retarget calculation.
    #[error("invalid difficulty: have {have}, want {want}")]
    InvalidDifficulty { have: BigUint, want: BigUint },

    /// Sealed difficulty is zero.
    #[error("non-positive difficulty")]
    NonPositiveDifficulty,

    /// Block number is not parent number + 1.
    #[error("invalid block number")]
    InvalidNumber,

    /// Gas limit exceeds the 2^63-1 cap.
    #[error("invalid gasLimit: have {have}, max {max}")]
    GasLimitTooHigh { have: u64, max: u64 },

    /// Gas used exceeds the gas limit.
    #[error("invalid gasUsed: have {have}, gasLimit {limit}")]
    InvalidGasUsed { have: u64, limit: u64 },

    /// Gas limit moved outside the allowed bound from the parent.
    #[error("invalid gas limit: have {have}, want {want} +-= {bound}")]
    InvalidGasLimit { have: u64, want: u64, bound: u64 },

    /// Extra-data section exceeds the configured maximum.
    #[error("extra-data too long: {have} > {max}")]
    ExtraTooLong { have: usize, max: usize },

    /// More than the allowed number of uncles.
    #[error("too many uncles")]
    TooManyUncles,

    /// The same uncle appears twice in the recent chain.
    #[error("duplicate uncle")]
    DuplicateUncle,

    /// An uncle is a direct ancestor of the block.
    #[error("uncle is ancestor")]
    UncleIsAncestor,

    /// An uncle's parent is not a recent ancestor.
    #[error("uncle's parent is not ancestor")]
    DanglingUncle,

    /// Recomputed mix digest does not match the header.
    #[error("invalid mix digest")]
    InvalidMixDigest,

    /// The proof-of-work result misses the difficulty target.
    #[error("invalid proof-of-work")]
    InvalidPoW,

    /// Extra-data conflicts with the DAO hard-fork rules.
    #[error("DAO fork extra-data mismatch")]
    DaoExtraMismatch,

    /// Header hash differs from the pinned canonical hash at this number.
    #[error("fork hash mismatch at block {number}")]
    ForkHashMismatch { number: u64 },

    /// Header declares an unsupported block format version.
    #[error("invalid block version: {0}")]
    InvalidVersion(u32),
}

/// Result type for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
