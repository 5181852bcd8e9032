//! Difficulty retarget.
//!
//! Four rule variants are implemented: Frontier (the default on NUC),
//! Homestead, and the bomb-delayed Byzantium / Constantinople calculators.
//! Variant selection follows the chain-config fork gates; with no gates set
//! every block retargets under Frontier rules.

use crate::chain::ChainConfig;
use num_bigint::{BigInt, BigUint};
use nuc_types::{Header, EMPTY_UNCLE_HASH};

/// The bomb raises difficulty once per this many blocks.
const EXP_DIFF_PERIOD: u64 = 100_000;

/// Bomb delay for the Byzantium rules.
const BYZANTIUM_BOMB_DELAY: u64 = 3_000_000;

/// Bomb delay for the Constantinople rules.
const CONSTANTINOPLE_BOMB_DELAY: u64 = 5_000_000;

/// Calculate the difficulty a block created at `time` on top of `parent`
/// must declare. Deterministic: equal inputs give bitwise-equal outputs.
pub fn calc_difficulty(config: &ChainConfig, time: u64, parent: &Header) -> BigUint {
    let next = parent.number + 1;
    if config.is_constantinople(next) {
        calc_difficulty_bomb_delayed(config, time, parent, CONSTANTINOPLE_BOMB_DELAY)
    } else if config.is_byzantium(next) {
        calc_difficulty_bomb_delayed(config, time, parent, BYZANTIUM_BOMB_DELAY)
    } else if config.is_homestead(next) {
        calc_difficulty_homestead(config, time, parent)
    } else {
        calc_difficulty_frontier(config, time, parent)
    }
}

fn minimum(config: &ChainConfig) -> BigUint {
    BigUint::from(config.minimum_difficulty)
}

/// Frontier rules: a fixed 1/2048 step up or down depending on whether the
/// block arrived within the duration limit.
fn calc_difficulty_frontier(config: &ChainConfig, time: u64, parent: &Header) -> BigUint {
    let adjust = &parent.difficulty / config.difficulty_bound_divisor;
    let elapsed = time as i128 - parent.time as i128;

    let mut diff = if elapsed < config.duration_limit as i128 {
        &parent.difficulty + &adjust
    } else {
        &parent.difficulty - &adjust
    };

    let min = minimum(config);
    if diff < min {
        diff = min.clone();
    }

    let period = (parent.number + 1) / EXP_DIFF_PERIOD;
    if period > 1 {
        diff += BigUint::from(1u32) << ((period - 2) as usize);
        if diff < min {
            diff = min;
        }
    }
    diff
}

/// Homestead rules: the step scales with how far the block time missed a
/// ten-second slot, clamped at -99 steps.
fn calc_difficulty_homestead(config: &ChainConfig, time: u64, parent: &Header) -> BigUint {
    let elapsed = BigInt::from(time as i128 - parent.time as i128);

    let mut x = BigInt::from(1) - elapsed / 10;
    if x < BigInt::from(-99) {
        x = BigInt::from(-99);
    }

    let step = BigInt::from(&parent.difficulty / config.difficulty_bound_divisor);
    let adjusted = BigInt::from(parent.difficulty.clone()) + step * x;

    let mut diff = clamp_to_minimum(config, adjusted);

    let period = (parent.number + 1) / EXP_DIFF_PERIOD;
    if period > 1 {
        diff += BigUint::from(1u32) << ((period - 2) as usize);
    }
    diff
}

/// Byzantium-style rules with a configurable bomb delay: uncles widen the
/// target window by one slot, and the bomb counts from a delayed fake block
/// number.
fn calc_difficulty_bomb_delayed(
    config: &ChainConfig,
    time: u64,
    parent: &Header,
    bomb_delay: u64,
) -> BigUint {
    let elapsed = BigInt::from(time as i128 - parent.time as i128);

    let base = if parent.uncle_hash == EMPTY_UNCLE_HASH {
        BigInt::from(1)
    } else {
        BigInt::from(2)
    };
    let mut x = base - elapsed / 9;
    if x < BigInt::from(-99) {
        x = BigInt::from(-99);
    }

    let step = BigInt::from(&parent.difficulty / config.difficulty_bound_divisor);
    let adjusted = BigInt::from(parent.difficulty.clone()) + step * x;

    let mut diff = clamp_to_minimum(config, adjusted);

    // The delay is measured against the parent number, one below the block
    // being created.
    let fake_number = parent.number.saturating_sub(bomb_delay - 1);
    let period = fake_number / EXP_DIFF_PERIOD;
    if period > 1 {
        diff += BigUint::from(1u32) << ((period - 2) as usize);
    }
    diff
}

fn clamp_to_minimum(config: &ChainConfig, value: BigInt) -> BigUint {
    let min = minimum(config);
    match value.to_biguint() {
        Some(v) if v >= min => v,
        _ => min,
    }
}
