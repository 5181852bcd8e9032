//! Reward finalization.
//!
//! Block income is split across four participant classes read from the
//! staking registry: PoW miners, PoC stakers, pool operators and PoST
//! stakers. Class membership, stake and binding come from paged registry
//! view calls against the block's pre-state; the outcome is a set of
//! per-address reward records credited to the ledger, embedded in the
//! header and persisted to the mining-rewards side store.
//!
//! Amount arithmetic reproduces the historical chain bit-for-bit, including
//! the compounding 70% fee scale applied inside the per-transaction loop.

use crate::chain::StateDb;
use crate::registry::{RegistryView, REGISTRY_PAGE_SIZE};
use num_bigint::BigUint;
use num_traits::{ToPrimitive, Zero};
use nuc_storage::RewardStore;
use nuc_types::{Address, Header, Transaction};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Address absorbing undistributed block reward and the team fee.
pub const COINBASE_SINK: Address = Address::ZERO;

fn pow10(exp: u32) -> BigUint {
    BigUint::from(10u32).pow(exp)
}

/// Base block reward backing the shortfall guarantee, 12 * 10^36 wei.
pub fn base_block_reward() -> BigUint {
    BigUint::from(12u32) * pow10(36)
}

/// PoW class base reward, 2 * 10^18 wei.
pub fn pow_block_reward() -> BigUint {
    BigUint::from(2u32) * pow10(18)
}

/// PoC class base reward, 10 * 10^36 wei.
pub fn poc_block_reward() -> BigUint {
    BigUint::from(10u32) * pow10(36)
}

/// Pool class base reward, 10^18 wei.
pub fn pool_block_reward() -> BigUint {
    pow10(18)
}

/// PoST class base reward, 10^18 wei.
pub fn post_block_reward() -> BigUint {
    pow10(18)
}

/// The four reward classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MinerClass {
    Pow,
    Poc,
    Pool,
    Post,
}

/// One participant while finalization runs.
#[derive(Debug, Clone)]
pub struct MiningUser {
    pub address: Address,
    pub pool_address: Address,
    pub has_bind: bool,
    pub weight: u64,
    pub reward: BigUint,
    pub mortage_balance: BigUint,
    /// Lifetime PoC income cap: 120% of the staked balance.
    pub can_poc_balance: BigUint,
    pub children: BTreeSet<Address>,
}

impl MiningUser {
    fn new(address: Address) -> Self {
        MiningUser {
            address,
            pool_address: Address::ZERO,
            has_bind: false,
            weight: 1,
            reward: BigUint::zero(),
            mortage_balance: BigUint::zero(),
            can_poc_balance: BigUint::zero(),
            children: BTreeSet::new(),
        }
    }

    pub fn add_child(&mut self, addr: Address) {
        self.children.insert(addr);
    }
}

/// A class's participant set, keyed by address. Iteration order is the
/// ascending address order used for serialization.
#[derive(Debug, Default)]
pub struct MiningUsers {
    users: BTreeMap<Address, MiningUser>,
}

impl MiningUsers {
    pub fn has(&self, addr: Address) -> bool {
        self.users.contains_key(&addr)
    }

    /// Insert a fresh participant. The zero address never participates.
    pub fn add(&mut self, addr: Address) {
        if addr.is_zero() {
            return;
        }
        self.users.entry(addr).or_insert_with(|| MiningUser::new(addr));
    }

    pub fn get(&self, addr: Address) -> Option<&MiningUser> {
        self.users.get(&addr)
    }

    pub fn get_mut(&mut self, addr: Address) -> Option<&mut MiningUser> {
        self.users.get_mut(&addr)
    }

    pub fn set_bind_addr(&mut self, addr: Address, pool: Address) {
        if let Some(user) = self.users.get_mut(&addr) {
            user.has_bind = true;
            user.pool_address = pool;
        }
    }

    pub fn set_mortage_balance(&mut self, addr: Address, balance: BigUint) {
        if let Some(user) = self.users.get_mut(&addr) {
            user.can_poc_balance = &balance * BigUint::from(120u32) / BigUint::from(100u32);
            user.mortage_balance = balance;
        }
    }

    pub fn set_weight(&mut self, addr: Address, weight: u64) {
        if let Some(user) = self.users.get_mut(&addr) {
            user.weight = weight;
        }
    }

    pub fn total_weight(&self) -> u64 {
        self.users.values().map(|u| u.weight).sum()
    }

    pub fn total_mortage(&self) -> BigUint {
        self.users
            .values()
            .fold(BigUint::zero(), |acc, u| acc + &u.mortage_balance)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MiningUser> {
        self.users.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MiningUser> {
        self.users.values_mut()
    }
}

/// Per-address reward amounts for one block. The PoST amount is credited to
/// the ledger but excluded from the canonical serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoinbaseRecord {
    pub poc: BigUint,
    pub pow: BigUint,
    pub pool: BigUint,
    pub post: BigUint,
}

/// Width of one serialized record entry: address plus three amounts.
pub const RECORD_ENTRY_BYTES: usize = 20 + 8 + 8 + 8;

/// The full reward record set of a block, in ascending address order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CoinbaseRecords {
    records: BTreeMap<Address, CoinbaseRecord>,
}

impl CoinbaseRecords {
    pub fn entry(&mut self, addr: Address) -> &mut CoinbaseRecord {
        self.records.entry(addr).or_default()
    }

    pub fn get(&self, addr: Address) -> Option<&CoinbaseRecord> {
        self.records.get(&addr)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &CoinbaseRecord)> {
        self.records.iter()
    }

    /// Serialize as `address || poc || pow || pool` entries, addresses
    /// ascending by big-endian byte order.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.records.len() * RECORD_ENTRY_BYTES);
        for (addr, record) in &self.records {
            out.extend_from_slice(addr.as_bytes());
            out.extend_from_slice(&format_reward_bytes(&record.poc));
            out.extend_from_slice(&format_reward_bytes(&record.pow));
            out.extend_from_slice(&format_reward_bytes(&record.pool));
        }
        out
    }

    /// Parse the wire layout back into a record set. Trailing bytes shorter
    /// than one entry are ignored.
    pub fn decode(bytes: &[u8]) -> Self {
        let mut records = CoinbaseRecords::default();
        let mut at = 0;
        while at + RECORD_ENTRY_BYTES <= bytes.len() {
            let addr = Address::from_slice(&bytes[at..at + 20]);
            let record = records.entry(addr);
            record.poc = BigUint::from_bytes_be(&bytes[at + 20..at + 28]);
            record.pow = BigUint::from_bytes_be(&bytes[at + 28..at + 36]);
            record.pool = BigUint::from_bytes_be(&bytes[at + 36..at + 44]);
            at += RECORD_ENTRY_BYTES;
        }
        records
    }
}

/// Amounts serialize as 8 bytes: left-padded when narrow, high-order bytes
/// when wider. The truncation for oversized amounts is consensus-locked.
fn format_reward_bytes(value: &BigUint) -> [u8; 8] {
    let be = value.to_bytes_be();
    let mut out = [0u8; 8];
    if value.is_zero() {
        return out;
    }
    if be.len() < 8 {
        out[8 - be.len()..].copy_from_slice(&be);
    } else {
        out.copy_from_slice(&be[..8]);
    }
    out
}

fn pages_for(count: u64) -> u64 {
    count.div_ceil(REGISTRY_PAGE_SIZE)
}

fn class_count(
    registry: &dyn RegistryView,
    state: &mut dyn StateDb,
    count: impl Fn(&dyn RegistryView, &mut dyn StateDb) -> crate::registry::RegistryResult<BigUint>,
    class: &str,
) -> u64 {
    match count(registry, state) {
        Ok(c) => c.to_u64().unwrap_or(0),
        Err(err) => {
            warn!(class, %err, "registry count call failed");
            0
        }
    }
}

/// Enumerate PoC stakers, skipping members whose cumulative PoC income has
/// reached the 120% cap.
fn gather_pocers(registry: &dyn RegistryView, state: &mut dyn StateDb) -> MiningUsers {
    let mut users = MiningUsers::default();
    let count = class_count(registry, state, |r, s| r.poc_count(s), "poc");
    for page in 0..pages_for(count) {
        let members =
            match registry.all_pocers(state, page * REGISTRY_PAGE_SIZE, REGISTRY_PAGE_SIZE) {
                Ok(m) => m,
                Err(err) => {
                    warn!(page, %err, "AllPocers call failed");
                    return users;
                }
            };
        if members.is_empty() {
            break;
        }
        for m in members {
            let drawn = state.get_all_poc_balance(m.user_addr);
            if m.max_lifetime_reward() <= drawn {
                continue;
            }
            users.add(m.user_addr);
            if !m.bind_pool_addr.is_zero() {
                users.set_bind_addr(m.user_addr, m.bind_pool_addr);
            }
            users.set_mortage_balance(m.user_addr, m.mortage_balance.clone());
            users.set_weight(m.user_addr, (m.records.len() as u64).max(1));
        }
    }
    users
}

fn gather_powers(registry: &dyn RegistryView, state: &mut dyn StateDb) -> MiningUsers {
    let mut users = MiningUsers::default();
    let count = class_count(registry, state, |r, s| r.pow_count(s), "pow");
    for page in 0..pages_for(count) {
        let members =
            match registry.all_powers(state, page * REGISTRY_PAGE_SIZE, REGISTRY_PAGE_SIZE) {
                Ok(m) => m,
                Err(err) => {
                    warn!(page, %err, "AllPowers call failed");
                    return users;
                }
            };
        if members.is_empty() {
            break;
        }
        for m in members {
            users.add(m.user_addr);
            users.set_weight(m.user_addr, (m.records.len() as u64).max(1));
            if !m.bind_pool_addr.is_zero() {
                users.set_bind_addr(m.user_addr, m.bind_pool_addr);
            }
            if let Some(user) = users.get_mut(m.user_addr) {
                for poc in m.poc_addrs {
                    user.add_child(poc);
                }
            }
        }
    }
    users
}

fn gather_poolers(registry: &dyn RegistryView, state: &mut dyn StateDb) -> MiningUsers {
    let mut users = MiningUsers::default();
    let count = class_count(registry, state, |r, s| r.pool_count(s), "pool");
    for page in 0..pages_for(count) {
        let members =
            match registry.all_poolers(state, page * REGISTRY_PAGE_SIZE, REGISTRY_PAGE_SIZE) {
                Ok(m) => m,
                Err(err) => {
                    warn!(page, %err, "AllPoolers call failed");
                    return users;
                }
            };
        if members.is_empty() {
            break;
        }
        for m in members {
            users.add(m.user_addr);
            if let Some(user) = users.get_mut(m.user_addr) {
                for bound in m.pow_addrs.into_iter().chain(m.poc_addrs) {
                    user.add_child(bound);
                }
            }
        }
    }
    users
}

fn gather_posters(registry: &dyn RegistryView, state: &mut dyn StateDb) -> MiningUsers {
    let mut users = MiningUsers::default();
    let count = class_count(registry, state, |r, s| r.post_count(s), "post");
    for page in 0..pages_for(count) {
        let members =
            match registry.all_posters(state, page * REGISTRY_PAGE_SIZE, REGISTRY_PAGE_SIZE) {
                Ok(m) => m,
                Err(err) => {
                    warn!(page, %err, "AllPosters call failed");
                    return users;
                }
            };
        if members.is_empty() {
            break;
        }
        for m in members {
            users.add(m.user_addr);
            users.set_mortage_balance(m.user_addr, m.mortage_balance.clone());
        }
    }
    users
}

/// A class base reward scaled by the registry ratio: division by 2^ratio,
/// skipped for ratios of one or less. A ratio of 25 below block 10_000
/// reads as zero.
fn scaled_class_reward(
    base: BigUint,
    registry: &dyn RegistryView,
    state: &mut dyn StateDb,
    block_number: u64,
) -> BigUint {
    let ratio = match registry.reward_ratio(state) {
        Ok(r) => r.to_u64().unwrap_or(0),
        Err(err) => {
            warn!(%err, "GetRewardRatio call failed");
            return BigUint::zero();
        }
    };
    let ratio = if ratio == 25 && block_number < 10_000 {
        0
    } else {
        ratio
    };
    if ratio > 1 {
        base / (BigUint::from(1u32) << ratio as usize)
    } else {
        base
    }
}

/// Distribute a class reward by weight. Unbound members forfeit half;
/// bound members forward a tenth of their share to their pool operator.
fn distribute_bound_class(
    members: &mut MiningUsers,
    poolers: &mut MiningUsers,
    class_reward: BigUint,
) {
    let total_weight = members.total_weight();
    let share = if total_weight > 0 {
        &class_reward / total_weight
    } else {
        class_reward
    };
    for user in members.iter_mut() {
        let mut r = &share * user.weight;
        if !user.has_bind {
            r /= 2u32;
        } else {
            let pool_cut = &r * BigUint::from(10u32) / BigUint::from(100u32);
            r -= &pool_cut;
            if let Some(pool) = poolers.get_mut(user.pool_address) {
                pool.reward += pool_cut;
            }
        }
        user.reward += r;
    }
}

/// Distribute a class reward by weight with no binding rules.
fn distribute_plain_class(members: &mut MiningUsers, class_reward: BigUint) {
    let total_weight = members.total_weight();
    let share = if total_weight > 0 {
        &class_reward / total_weight
    } else {
        class_reward
    };
    for user in members.iter_mut() {
        user.reward += &share * user.weight;
    }
}

/// Run the four-class split against the registry and fold the results into
/// per-address records.
pub fn compute_rewards(
    header: &Header,
    state: &mut dyn StateDb,
    registry: &dyn RegistryView,
) -> CoinbaseRecords {
    compute_rewards_inner(header, state, registry).0
}

/// The split plus the fee-split union: every address gathered into the PoC,
/// PoW or Pool class. PoST stakers are not part of the fee split.
fn compute_rewards_inner(
    header: &Header,
    state: &mut dyn StateDb,
    registry: &dyn RegistryView,
) -> (CoinbaseRecords, BTreeSet<Address>) {
    let number = header.number;

    let mut poolers = gather_poolers(registry, state);

    let mut pocers = gather_pocers(registry, state);
    let poc_reward = scaled_class_reward(poc_block_reward(), registry, state, number);
    distribute_bound_class(&mut pocers, &mut poolers, poc_reward);

    let mut powers = gather_powers(registry, state);
    let pow_reward = scaled_class_reward(pow_block_reward(), registry, state, number);
    distribute_bound_class(&mut powers, &mut poolers, pow_reward);

    let pool_reward = scaled_class_reward(pool_block_reward(), registry, state, number);
    distribute_plain_class(&mut poolers, pool_reward);

    let mut posters = gather_posters(registry, state);
    let post_reward = scaled_class_reward(post_block_reward(), registry, state, number);
    distribute_plain_class(&mut posters, post_reward);

    debug!(
        number,
        pocers = pocers.len(),
        powers = powers.len(),
        poolers = poolers.len(),
        posters = posters.len(),
        "gathered reward participants"
    );

    let mut fee_recipients = BTreeSet::new();
    for users in [&pocers, &powers, &poolers] {
        for user in users.iter() {
            fee_recipients.insert(user.address);
        }
    }

    let mut records = CoinbaseRecords::default();
    for (class, users) in [
        (MinerClass::Poc, &pocers),
        (MinerClass::Pow, &powers),
        (MinerClass::Pool, &poolers),
        (MinerClass::Post, &posters),
    ] {
        for user in users.iter() {
            let record = records.entry(user.address);
            let slot = match class {
                MinerClass::Poc => &mut record.poc,
                MinerClass::Pow => &mut record.pow,
                MinerClass::Pool => &mut record.pool,
                MinerClass::Post => &mut record.post,
            };
            *slot += &user.reward;
        }
    }
    (records, fee_recipients)
}

/// Accumulate all block income into the state: uncle rewards, the fee pool
/// split, the four-class registry rewards, the sink shortfall and the team
/// fee. Writes the serialized records into the header and the side store.
pub fn accumulate_rewards(
    header: &mut Header,
    state: &mut dyn StateDb,
    txs: &[Transaction],
    uncles: &[Header],
    registry: &dyn RegistryView,
    store: Option<&RewardStore>,
) {
    let block_reward = base_block_reward();

    let mut fee = BigUint::zero();
    for uncle in uncles {
        let depth_factor = (uncle.number + 8).saturating_sub(header.number);
        let r = &block_reward * depth_factor / 8u32;
        state.add_balance(uncle.coinbase, &r);
        fee += &block_reward / 32u32;
    }
    for tx in txs {
        fee += tx.fee();
        // The scale sits inside the loop and compounds across transactions.
        // Historical chain state depends on it; do not hoist.
        fee = fee * 70u32 / 100u32;
    }

    let team_fee = &fee * 5u32 / 100u32;
    let mut pow_fee = &fee * 95u32 / 100u32;

    let (records, fee_recipients) = compute_rewards_inner(header, state, registry);
    if !fee_recipients.is_empty() {
        pow_fee /= fee_recipients.len() as u64;
    }

    let mut paid = BigUint::zero();
    for (addr, record) in records.iter() {
        if !record.poc.is_zero() {
            state.add_all_poc_balance(*addr, &record.poc);
        }
        let mut total = &record.poc + &record.pow + &record.pool + &record.post;
        if fee_recipients.contains(addr) {
            total += &pow_fee;
        }
        if !total.is_zero() {
            state.add_balance(*addr, &total);
        }
        paid += total;
    }

    if paid < block_reward {
        let shortfall = &block_reward - &paid;
        state.add_balance(COINBASE_SINK, &shortfall);
    }
    if !team_fee.is_zero() {
        state.add_balance(COINBASE_SINK, &team_fee);
    }

    header.coinbase_txs = records.encode();
    if let Some(store) = store {
        if let Err(err) = store.put(header.number, &header.coinbase_txs) {
            warn!(number = header.number, %err, "failed to persist mining rewards");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeRegistry, InMemoryState};
    use crate::registry::{PocMember, PoolMember, PowMember, StakeRecord};

    fn addr(b: u8) -> Address {
        Address([b; 20])
    }

    fn records_of(n: usize) -> Vec<StakeRecord> {
        (0..n)
            .map(|i| StakeRecord {
                create_time: BigUint::from(i as u32),
            })
            .collect()
    }

    fn header_at(number: u64) -> Header {
        Header {
            number,
            ..Default::default()
        }
    }

    #[test]
    fn record_round_trip_preserves_amounts() {
        let mut records = CoinbaseRecords::default();
        let r = records.entry(addr(0x42));
        r.poc = BigUint::from(0x0102_0304u32);
        r.pow = BigUint::from(7u32);
        let r = records.entry(addr(0x10));
        r.pool = BigUint::from(0xffff_ffff_ffffu64);

        let encoded = records.encode();
        assert_eq!(encoded.len(), 2 * RECORD_ENTRY_BYTES);
        assert_eq!(CoinbaseRecords::decode(&encoded), records);
    }

    #[test]
    fn encoding_orders_addresses_ascending() {
        let mut records = CoinbaseRecords::default();
        records.entry(addr(0xcc)).pow = BigUint::from(1u32);
        records.entry(addr(0x01)).pow = BigUint::from(2u32);
        records.entry(addr(0x7f)).pow = BigUint::from(3u32);

        let encoded = records.encode();
        let first = Address::from_slice(&encoded[..20]);
        let second = Address::from_slice(&encoded[RECORD_ENTRY_BYTES..RECORD_ENTRY_BYTES + 20]);
        let third = Address::from_slice(&encoded[2 * RECORD_ENTRY_BYTES..2 * RECORD_ENTRY_BYTES + 20]);
        assert_eq!((first, second, third), (addr(0x01), addr(0x7f), addr(0xcc)));
    }

    #[test]
    fn oversized_amount_serializes_high_bytes() {
        // 10^36 needs more than 8 bytes; the high-order 8 survive.
        let value = pow10(36);
        let bytes = format_reward_bytes(&value);
        assert_eq!(&value.to_bytes_be()[..8], &bytes);
    }

    #[test]
    fn empty_registry_credits_sink_with_base_and_team_fee() {
        let registry = FakeRegistry::default();
        let mut state = InMemoryState::default();
        let mut header = header_at(50);
        let tx = Transaction {
            gas_price: BigUint::from(1_000u32),
            gas: 100,
            ..Default::default()
        };

        accumulate_rewards(&mut header, &mut state, &[tx], &[], &registry, None);

        assert!(header.coinbase_txs.is_empty());
        // One transaction: fee = 100_000 * 70% = 70_000.
        let fee = BigUint::from(70_000u32);
        let team_fee = &fee * 5u32 / 100u32;
        assert_eq!(
            state.balance(COINBASE_SINK),
            base_block_reward() + team_fee
        );
    }

    #[test]
    fn fee_scaling_compounds_per_transaction() {
        let registry = FakeRegistry::default();
        let mut state = InMemoryState::default();
        let mut header = header_at(50);
        let tx = Transaction {
            gas_price: BigUint::from(1_000u32),
            gas: 100,
            ..Default::default()
        };

        accumulate_rewards(
            &mut header,
            &mut state,
            &[tx.clone(), tx],
            &[],
            &registry,
            None,
        );

        // fee = ((100_000 * 0.7) + 100_000) * 0.7 = 119_000.
        let fee = BigUint::from(119_000u32);
        let team_fee = &fee * 5u32 / 100u32;
        assert_eq!(
            state.balance(COINBASE_SINK),
            base_block_reward() + team_fee
        );
    }

    #[test]
    fn unbound_member_gets_half_share() {
        let registry = FakeRegistry {
            powers: vec![PowMember {
                user_addr: addr(0x01),
                records: records_of(1),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut state = InMemoryState::default();
        let header = header_at(50);

        let records = compute_rewards(&header, &mut state, &registry);
        assert_eq!(
            records.get(addr(0x01)).unwrap().pow,
            pow_block_reward() / 2u32
        );
    }

    #[test]
    fn bound_member_forwards_tenth_to_pool() {
        let pool = addr(0x99);
        let registry = FakeRegistry {
            powers: vec![PowMember {
                user_addr: addr(0x01),
                bind_pool_addr: pool,
                records: records_of(1),
                ..Default::default()
            }],
            poolers: vec![PoolMember {
                user_addr: pool,
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut state = InMemoryState::default();
        let header = header_at(50);

        let records = compute_rewards(&header, &mut state, &registry);
        let share = pow_block_reward();
        let pool_cut = &share * BigUint::from(10u32) / BigUint::from(100u32);
        assert_eq!(records.get(addr(0x01)).unwrap().pow, &share - &pool_cut);
        // The pool operator collects the pass-through on top of the pool
        // class base.
        assert_eq!(
            records.get(pool).unwrap().pool,
            pool_cut + pool_block_reward()
        );
    }

    #[test]
    fn weight_scales_member_share() {
        let registry = FakeRegistry {
            powers: vec![
                PowMember {
                    user_addr: addr(0x01),
                    records: records_of(3),
                    ..Default::default()
                },
                PowMember {
                    user_addr: addr(0x02),
                    records: records_of(1),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let mut state = InMemoryState::default();
        let records = compute_rewards(&header_at(50), &mut state, &registry);

        let share = pow_block_reward() / 4u32;
        assert_eq!(
            records.get(addr(0x01)).unwrap().pow,
            &share * 3u32 / 2u32
        );
        assert_eq!(records.get(addr(0x02)).unwrap().pow, share / 2u32);
    }

    #[test]
    fn capped_poc_member_is_skipped_entirely() {
        let capped = addr(0x01);
        let active = addr(0x02);
        let registry = FakeRegistry {
            pocers: vec![
                PocMember {
                    user_addr: capped,
                    mortage_balance: BigUint::from(1000u32),
                    records: records_of(1),
                    ..Default::default()
                },
                PocMember {
                    user_addr: active,
                    mortage_balance: BigUint::from(1000u32),
                    records: records_of(1),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let mut state = InMemoryState::default();
        // The capped member has already drawn 120% of its stake.
        state.set_all_poc_balance(capped, BigUint::from(1200u32));

        let mut header = header_at(50);
        accumulate_rewards(&mut header, &mut state, &[], &[], &registry, None);

        let records = CoinbaseRecords::decode(&header.coinbase_txs);
        assert!(records.get(capped).is_none());
        assert!(records.get(active).is_some());
        // No further PoC counter movement for the capped member.
        assert_eq!(state.all_poc_balance(capped), BigUint::from(1200u32));
        assert!(state.all_poc_balance(active) > BigUint::zero());
    }

    #[test]
    fn pow_fee_splits_equally_across_rewarded_addresses() {
        let registry = FakeRegistry {
            powers: vec![
                PowMember {
                    user_addr: addr(0x01),
                    records: records_of(1),
                    ..Default::default()
                },
                PowMember {
                    user_addr: addr(0x02),
                    records: records_of(1),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let mut state = InMemoryState::default();
        let mut header = header_at(50);
        let tx = Transaction {
            gas_price: BigUint::from(10_000u32),
            gas: 1000,
            ..Default::default()
        };

        accumulate_rewards(&mut header, &mut state, &[tx], &[], &registry, None);

        // fee = 10^7 * 0.7; each of the two addresses gets half of the 95%
        // share on top of its class reward.
        let fee = BigUint::from(7_000_000u32);
        let pow_fee = &fee * 95u32 / 100u32 / 2u32;
        let class_share = pow_block_reward() / 2u32 / 2u32;
        assert_eq!(state.balance(addr(0x01)), &class_share + &pow_fee);
        assert_eq!(state.balance(addr(0x02)), class_share + pow_fee);
    }

    #[test]
    fn uncle_coinbase_is_rewarded_by_depth() {
        let registry = FakeRegistry::default();
        let mut state = InMemoryState::default();
        let mut header = header_at(10);
        let uncle = Header {
            number: 8,
            coinbase: addr(0x0a),
            ..Default::default()
        };

        accumulate_rewards(&mut header, &mut state, &[], &[uncle], &registry, None);

        // Depth factor (8 + 8 - 10) / 8 of the base reward.
        assert_eq!(
            state.balance(addr(0x0a)),
            base_block_reward() * 6u32 / 8u32
        );
    }

    #[test]
    fn reward_ratio_halves_class_rewards() {
        let registry = FakeRegistry {
            powers: vec![PowMember {
                user_addr: addr(0x01),
                records: records_of(1),
                ..Default::default()
            }],
            ratio: BigUint::from(3u32),
            ..Default::default()
        };
        let mut state = InMemoryState::default();
        let records = compute_rewards(&header_at(50_000), &mut state, &registry);

        assert_eq!(
            records.get(addr(0x01)).unwrap().pow,
            pow_block_reward() / 8u32 / 2u32
        );
    }

    #[test]
    fn ratio_25_reads_as_zero_in_early_chain() {
        let registry = FakeRegistry {
            powers: vec![PowMember {
                user_addr: addr(0x01),
                records: records_of(1),
                ..Default::default()
            }],
            ratio: BigUint::from(25u32),
            ..Default::default()
        };
        let mut state = InMemoryState::default();

        let early = compute_rewards(&header_at(9_999), &mut state, &registry);
        assert_eq!(early.get(addr(0x01)).unwrap().pow, pow_block_reward() / 2u32);

        // The clamp ends at block 10_000 exactly.
        let late = compute_rewards(&header_at(10_000), &mut state, &registry);
        assert_eq!(
            late.get(addr(0x01)).unwrap().pow,
            pow_block_reward() / (BigUint::from(1u32) << 25usize) / 2u32
        );
    }

    #[test]
    fn post_rewards_accumulate_but_do_not_serialize() {
        let registry = FakeRegistry {
            posters: vec![crate::registry::PostMember {
                user_addr: addr(0x05),
                mortage_balance: BigUint::from(500u32),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut state = InMemoryState::default();
        let mut header = header_at(50);

        accumulate_rewards(&mut header, &mut state, &[], &[], &registry, None);

        // The PoST share reaches the ledger.
        assert_eq!(state.balance(addr(0x05)), post_block_reward());
        // The serialized entry carries only the three canonical fields.
        let decoded = CoinbaseRecords::decode(&header.coinbase_txs);
        let record = decoded.get(addr(0x05)).unwrap();
        assert!(record.poc.is_zero() && record.pow.is_zero() && record.pool.is_zero());
        assert!(record.post.is_zero());
    }

    #[test]
    fn post_members_neither_dilute_nor_receive_the_fee_split() {
        let registry = FakeRegistry {
            powers: vec![PowMember {
                user_addr: addr(0x01),
                records: records_of(1),
                ..Default::default()
            }],
            posters: vec![crate::registry::PostMember {
                user_addr: addr(0x05),
                mortage_balance: BigUint::from(500u32),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut state = InMemoryState::default();
        let mut header = header_at(50);
        let tx = Transaction {
            gas_price: BigUint::from(1_000u32),
            gas: 100,
            ..Default::default()
        };

        accumulate_rewards(&mut header, &mut state, &[tx], &[], &registry, None);

        // fee = 70_000; the 95% share goes undivided to the single PoW
        // member. The PoST staker keeps its class reward and nothing more.
        let pow_fee = BigUint::from(70_000u32) * 95u32 / 100u32;
        assert_eq!(
            state.balance(addr(0x01)),
            pow_block_reward() / 2u32 + pow_fee
        );
        assert_eq!(state.balance(addr(0x05)), post_block_reward());
    }

    #[test]
    fn total_credit_conserves_base_reward_plus_team_fee() {
        let registry = FakeRegistry {
            powers: vec![PowMember {
                user_addr: addr(0x01),
                records: records_of(1),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut state = InMemoryState::default();
        let mut header = header_at(50);
        let tx = Transaction {
            gas_price: BigUint::from(1_000u32),
            gas: 100,
            ..Default::default()
        };

        accumulate_rewards(&mut header, &mut state, &[tx], &[], &registry, None);

        // fee = 70_000. The participant's income sits inside the base
        // reward envelope (the sink absorbs the shortfall), so the total
        // credit is the base reward plus the team fee.
        let fee = BigUint::from(70_000u32);
        let team_fee = &fee * 5u32 / 100u32;
        assert_eq!(
            state.total_credited(),
            base_block_reward() + team_fee
        );
    }

    #[test]
    fn persists_records_to_side_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RewardStore::open(dir.path().join("rewards")).unwrap();
        let registry = FakeRegistry {
            powers: vec![PowMember {
                user_addr: addr(0x01),
                records: records_of(1),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut state = InMemoryState::default();
        let mut header = header_at(110);

        accumulate_rewards(&mut header, &mut state, &[], &[], &registry, Some(&store));

        assert_eq!(store.rewards_by_number(110), header.coinbase_txs);
        assert!(!header.coinbase_txs.is_empty());
    }
}
