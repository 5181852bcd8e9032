//! Typed access to the staking registry contract.
//!
//! The registry lives at a fixed in-chain address and exposes paged view
//! methods enumerating the four participant classes plus the reward ratio.
//! `ContractRegistry` packs each call, executes it through the VM seam
//! against the block's pre-state, and decodes the returned tuple arrays.
//! Tests substitute a pure in-memory `RegistryView`.

use crate::abi::{self, AbiError, Reader};
use crate::chain::{CallMessage, StateDb, VmError, VmExecutor};
use num_bigint::BigUint;
use num_traits::Zero;
use nuc_types::{Address, Header};
use thiserror::Error;

/// Fixed address of the registry contract.
pub const REGISTRY_ADDR: Address = Address([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x11,
]);

/// Members fetched per registry page.
pub const REGISTRY_PAGE_SIZE: u64 = 1000;

/// Gas attached to a registry call; effectively unlimited.
const CALL_GAS: u64 = u64::MAX / 2;

/// Errors from the registry seam. The reward engine downgrades every one of
/// these to an empty participant set.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Vm(#[from] VmError),

    #[error(transparent)]
    Abi(#[from] AbiError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// One staking record attached to a member.
#[derive(Debug, Clone, Default)]
pub struct StakeRecord {
    pub create_time: BigUint,
}

/// A PoC stakeholder as returned by `AllPocers`.
#[derive(Debug, Clone, Default)]
pub struct PocMember {
    pub records: Vec<StakeRecord>,
    pub user_addr: Address,
    /// Lifetime reward already drawn, per the contract's own accounting.
    pub reward_drawn: BigUint,
    pub index: BigUint,
    pub mortage_balance: BigUint,
    pub bind_pool_addr: Address,
}

impl PocMember {
    /// Lifetime PoC reward cap: 120% of the staked balance.
    pub fn max_lifetime_reward(&self) -> BigUint {
        &self.mortage_balance * BigUint::from(120u32) / BigUint::from(100u32)
    }
}

/// A PoW miner as returned by `AllPowers`.
#[derive(Debug, Clone, Default)]
pub struct PowMember {
    pub create_time: BigUint,
    pub index: BigUint,
    pub buy_balance: BigUint,
    pub bind_pool_addr: Address,
    pub poc_addrs: Vec<Address>,
    pub user_addr: Address,
    pub records: Vec<StakeRecord>,
}

/// A pool operator as returned by `AllPoolers`.
#[derive(Debug, Clone, Default)]
pub struct PoolMember {
    pub create_time: BigUint,
    pub index: BigUint,
    pub buy_balance: BigUint,
    pub pow_addrs: Vec<Address>,
    pub poc_addrs: Vec<Address>,
    pub user_addr: Address,
}

/// A PoST stakeholder as returned by `AllPosters`.
#[derive(Debug, Clone, Default)]
pub struct PostMember {
    pub create_time: BigUint,
    pub index: BigUint,
    pub mortage_balance: BigUint,
    pub user_addr: Address,
}

/// The view the reward engine needs over the registry. Methods take the
/// pre-state explicitly because the production implementation executes
/// contract code against it.
pub trait RegistryView {
    fn pow_count(&self, state: &mut dyn StateDb) -> RegistryResult<BigUint>;
    fn all_powers(
        &self,
        state: &mut dyn StateDb,
        offset: u64,
        page_size: u64,
    ) -> RegistryResult<Vec<PowMember>>;

    fn poc_count(&self, state: &mut dyn StateDb) -> RegistryResult<BigUint>;
    fn all_pocers(
        &self,
        state: &mut dyn StateDb,
        offset: u64,
        page_size: u64,
    ) -> RegistryResult<Vec<PocMember>>;

    fn pool_count(&self, state: &mut dyn StateDb) -> RegistryResult<BigUint>;
    fn all_poolers(
        &self,
        state: &mut dyn StateDb,
        offset: u64,
        page_size: u64,
    ) -> RegistryResult<Vec<PoolMember>>;

    fn post_count(&self, state: &mut dyn StateDb) -> RegistryResult<BigUint>;
    fn all_posters(
        &self,
        state: &mut dyn StateDb,
        offset: u64,
        page_size: u64,
    ) -> RegistryResult<Vec<PostMember>>;

    fn reward_ratio(&self, state: &mut dyn StateDb) -> RegistryResult<BigUint>;
}

/// The production registry: ABI calls executed through the VM.
pub struct ContractRegistry<'a> {
    vm: &'a dyn VmExecutor,
    header: &'a Header,
}

impl<'a> ContractRegistry<'a> {
    pub fn new(vm: &'a dyn VmExecutor, header: &'a Header) -> Self {
        ContractRegistry { vm, header }
    }

    fn call(&self, state: &mut dyn StateDb, input: Vec<u8>) -> RegistryResult<Vec<u8>> {
        let msg = CallMessage {
            from: REGISTRY_ADDR,
            to: REGISTRY_ADDR,
            nonce: 0,
            value: BigUint::zero(),
            gas: CALL_GAS,
            gas_price: BigUint::zero(),
            input,
            check_nonce: false,
        };
        Ok(self.vm.apply_message(&msg, self.header, state, u64::MAX)?)
    }

    fn call_uint(&self, state: &mut dyn StateDb, signature: &str) -> RegistryResult<BigUint> {
        let out = self.call(state, abi::encode_call(signature, &[]))?;
        Ok(Reader::new(&out).uint(0)?)
    }

    fn call_page(
        &self,
        state: &mut dyn StateDb,
        signature: &str,
        offset: u64,
        page_size: u64,
    ) -> RegistryResult<Vec<u8>> {
        let input = abi::encode_call(
            signature,
            &[BigUint::from(offset), BigUint::from(page_size)],
        );
        self.call(state, input)
    }
}

impl RegistryView for ContractRegistry<'_> {
    fn pow_count(&self, state: &mut dyn StateDb) -> RegistryResult<BigUint> {
        self.call_uint(state, "PowCount()")
    }

    fn all_powers(
        &self,
        state: &mut dyn StateDb,
        offset: u64,
        page_size: u64,
    ) -> RegistryResult<Vec<PowMember>> {
        let out = self.call_page(state, "AllPowers(uint256,uint256)", offset, page_size)?;
        Ok(decode_pow_members(&out)?)
    }

    fn poc_count(&self, state: &mut dyn StateDb) -> RegistryResult<BigUint> {
        self.call_uint(state, "PocCount()")
    }

    fn all_pocers(
        &self,
        state: &mut dyn StateDb,
        offset: u64,
        page_size: u64,
    ) -> RegistryResult<Vec<PocMember>> {
        let out = self.call_page(state, "AllPocers(uint256,uint256)", offset, page_size)?;
        Ok(decode_poc_members(&out)?)
    }

    fn pool_count(&self, state: &mut dyn StateDb) -> RegistryResult<BigUint> {
        self.call_uint(state, "PoolCount()")
    }

    fn all_poolers(
        &self,
        state: &mut dyn StateDb,
        offset: u64,
        page_size: u64,
    ) -> RegistryResult<Vec<PoolMember>> {
        let out = self.call_page(state, "AllPoolers(uint256,uint256)", offset, page_size)?;
        Ok(decode_pool_members(&out)?)
    }

    fn post_count(&self, state: &mut dyn StateDb) -> RegistryResult<BigUint> {
        self.call_uint(state, "PostCount()")
    }

    fn all_posters(
        &self,
        state: &mut dyn StateDb,
        offset: u64,
        page_size: u64,
    ) -> RegistryResult<Vec<PostMember>> {
        let out = self.call_page(state, "AllPosters(uint256,uint256)", offset, page_size)?;
        Ok(decode_post_members(&out)?)
    }

    fn reward_ratio(&self, state: &mut dyn StateDb) -> RegistryResult<BigUint> {
        self.call_uint(state, "GetRewardRatio()")
    }
}

fn read_records(r: &Reader<'_>, offset: usize) -> Result<Vec<StakeRecord>, AbiError> {
    let len = r.usize_at(offset)?;
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        out.push(StakeRecord {
            create_time: r.uint(offset + 32 + 32 * i)?,
        });
    }
    Ok(out)
}

/// Walk a `tuple[]` of dynamic tuples: outer offset, length, then one
/// relative offset per element.
fn decode_dynamic_tuple_array<T>(
    out: &[u8],
    parse: impl Fn(&Reader<'_>, usize) -> Result<T, AbiError>,
) -> Result<Vec<T>, AbiError> {
    let r = Reader::new(out);
    let base = r.usize_at(0)?;
    let len = r.usize_at(base)?;
    let elems = base + 32;
    let mut items = Vec::with_capacity(len);
    for i in 0..len {
        let offset = elems + r.usize_at(elems + 32 * i)?;
        items.push(parse(&r, offset)?);
    }
    Ok(items)
}

fn decode_pow_members(out: &[u8]) -> Result<Vec<PowMember>, AbiError> {
    decode_dynamic_tuple_array(out, |r, at| {
        Ok(PowMember {
            create_time: r.uint(at)?,
            index: r.uint(at + 32)?,
            buy_balance: r.uint(at + 64)?,
            bind_pool_addr: r.address(at + 96)?,
            poc_addrs: r.address_array(at + r.usize_at(at + 128)?)?,
            user_addr: r.address(at + 160)?,
            records: read_records(r, at + r.usize_at(at + 192)?)?,
        })
    })
}

fn decode_poc_members(out: &[u8]) -> Result<Vec<PocMember>, AbiError> {
    decode_dynamic_tuple_array(out, |r, at| {
        Ok(PocMember {
            records: read_records(r, at + r.usize_at(at)?)?,
            user_addr: r.address(at + 32)?,
            reward_drawn: r.uint(at + 64)?,
            index: r.uint(at + 96)?,
            mortage_balance: r.uint(at + 128)?,
            bind_pool_addr: r.address(at + 160)?,
        })
    })
}

fn decode_pool_members(out: &[u8]) -> Result<Vec<PoolMember>, AbiError> {
    decode_dynamic_tuple_array(out, |r, at| {
        Ok(PoolMember {
            create_time: r.uint(at)?,
            index: r.uint(at + 32)?,
            buy_balance: r.uint(at + 64)?,
            pow_addrs: r.address_array(at + r.usize_at(at + 96)?)?,
            poc_addrs: r.address_array(at + r.usize_at(at + 128)?)?,
            user_addr: r.address(at + 160)?,
        })
    })
}

/// `AllPosters` returns fully static tuples, laid out inline without
/// per-element offsets.
fn decode_post_members(out: &[u8]) -> Result<Vec<PostMember>, AbiError> {
    let r = Reader::new(out);
    let base = r.usize_at(0)?;
    let len = r.usize_at(base)?;
    let elems = base + 32;
    let mut items = Vec::with_capacity(len);
    for i in 0..len {
        let at = elems + 128 * i;
        items.push(PostMember {
            create_time: r.uint(at)?,
            index: r.uint(at + 32)?,
            mortage_balance: r.uint(at + 64)?,
            user_addr: r.address(at + 96)?,
        });
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_uint(v: u64) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[24..].copy_from_slice(&v.to_be_bytes());
        w
    }

    fn word_addr(b: u8) -> [u8; 32] {
        let mut w = [0u8; 32];
        w[12..].copy_from_slice(&[b; 20]);
        w
    }

    /// Hand-built `AllPocers` return: one member with two records.
    fn poc_return_one_member() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&word_uint(32)); // offset to array
        out.extend_from_slice(&word_uint(1)); // length
        out.extend_from_slice(&word_uint(32)); // element 0 offset
        // element: records-offset, userAddr, getReward, Index, mortage, bind
        out.extend_from_slice(&word_uint(192));
        out.extend_from_slice(&word_addr(0xaa));
        out.extend_from_slice(&word_uint(7));
        out.extend_from_slice(&word_uint(0));
        out.extend_from_slice(&word_uint(500));
        out.extend_from_slice(&word_addr(0xbb));
        // records tail: length 2, then createTime words
        out.extend_from_slice(&word_uint(2));
        out.extend_from_slice(&word_uint(111));
        out.extend_from_slice(&word_uint(222));
        out
    }

    #[test]
    fn decodes_poc_member_tuple() {
        let members = decode_poc_members(&poc_return_one_member()).unwrap();
        assert_eq!(members.len(), 1);
        let m = &members[0];
        assert_eq!(m.user_addr, Address([0xaa; 20]));
        assert_eq!(m.bind_pool_addr, Address([0xbb; 20]));
        assert_eq!(m.mortage_balance, BigUint::from(500u32));
        assert_eq!(m.reward_drawn, BigUint::from(7u32));
        assert_eq!(m.records.len(), 2);
        assert_eq!(m.records[1].create_time, BigUint::from(222u32));
    }

    #[test]
    fn poc_cap_is_120_percent_of_stake() {
        let m = PocMember {
            mortage_balance: BigUint::from(1000u32),
            ..Default::default()
        };
        assert_eq!(m.max_lifetime_reward(), BigUint::from(1200u32));
    }

    #[test]
    fn decodes_static_poster_array() {
        let mut out = Vec::new();
        out.extend_from_slice(&word_uint(32));
        out.extend_from_slice(&word_uint(2));
        for (i, b) in [(1u64, 0x01u8), (2, 0x02)] {
            out.extend_from_slice(&word_uint(100 + i));
            out.extend_from_slice(&word_uint(i));
            out.extend_from_slice(&word_uint(1000 * i));
            out.extend_from_slice(&word_addr(b));
        }
        let members = decode_post_members(&out).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].user_addr, Address([0x01; 20]));
        assert_eq!(members[1].mortage_balance, BigUint::from(2000u32));
    }

    #[test]
    fn garbage_return_is_an_error_not_a_panic() {
        assert!(decode_pow_members(&[0xff; 40]).is_err());
        assert!(decode_poc_members(&[]).is_err());
        assert!(decode_post_members(&[0x01]).is_err());
    }

    #[test]
    fn empty_array_decodes_to_no_members() {
        let mut out = Vec::new();
        out.extend_from_slice(&word_uint(32));
        out.extend_from_slice(&word_uint(0));
        assert!(decode_pow_members(&out).unwrap().is_empty());
        assert!(decode_pool_members(&out).unwrap().is_empty());
    }
}
