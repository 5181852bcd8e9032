//! The ethash mixing algorithm.
//!
//! Verification runs `hashimoto` over a pseudo-random dataset derived from
//! the block's epoch. The small cache is always generated; the full dataset
//! is optional and only consulted when already built. All word arithmetic is
//! little-endian u32, matching the wire definition of the algorithm.

use nuc_types::{keccak256, keccak512, H256};

/// Blocks per cache/dataset epoch.
pub const EPOCH_LENGTH: u64 = 30_000;

/// Width of a single mix in bytes.
const MIX_BYTES: usize = 128;
/// Width of a cache/dataset node in bytes.
const HASH_BYTES: usize = 64;
/// u32 words per node.
const HASH_WORDS: usize = 16;
/// Parent nodes sampled when deriving a dataset item from the cache.
const DATASET_PARENTS: u32 = 256;
/// Rounds of the memory-hard cache production pass.
const CACHE_ROUNDS: usize = 3;
/// Dataset accesses per hashimoto run.
const ACCESSES: usize = 64;

const FNV_PRIME: u32 = 0x0100_0193;

const CACHE_BYTES_INIT: u64 = 1 << 24;
const CACHE_BYTES_GROWTH: u64 = 1 << 17;
const DATASET_BYTES_INIT: u64 = 1 << 30;
const DATASET_BYTES_GROWTH: u64 = 1 << 23;

#[inline]
fn fnv(a: u32, b: u32) -> u32 {
    a.wrapping_mul(FNV_PRIME) ^ b
}

#[inline]
fn fnv_hash(mix: &mut [u32], data: &[u32]) {
    for (m, d) in mix.iter_mut().zip(data) {
        *m = fnv(*m, *d);
    }
}

/// Byte size of the verification cache for a block number. The node count
/// is kept prime to avoid cycles in the mixing walk.
pub fn cache_size(block_number: u64) -> u64 {
    let epoch = block_number / EPOCH_LENGTH;
    let mut size = CACHE_BYTES_INIT + CACHE_BYTES_GROWTH * epoch - HASH_BYTES as u64;
    while !is_prime(size / HASH_BYTES as u64) {
        size -= 2 * HASH_BYTES as u64;
    }
    size
}

/// Byte size of the full dataset for a block number.
pub fn dataset_size(block_number: u64) -> u64 {
    let epoch = block_number / EPOCH_LENGTH;
    let mut size = DATASET_BYTES_INIT + DATASET_BYTES_GROWTH * epoch - MIX_BYTES as u64;
    while !is_prime(size / MIX_BYTES as u64) {
        size -= 2 * MIX_BYTES as u64;
    }
    size
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

/// Seed for the cache of the epoch containing `block_number`: 32 zero bytes
/// hashed once per elapsed epoch.
pub fn seed_hash(block_number: u64) -> H256 {
    let mut seed = H256::ZERO;
    for _ in 0..block_number / EPOCH_LENGTH {
        seed = keccak256(seed.as_bytes());
    }
    seed
}

/// Generate the verification cache: a Keccak-512 chain over the seed,
/// followed by the low-round memory-hard production pass.
pub fn generate_cache(size: u64, seed: &H256) -> Vec<u32> {
    let n = size as usize / HASH_BYTES;

    let mut rows: Vec<[u8; HASH_BYTES]> = Vec::with_capacity(n);
    rows.push(keccak512(seed.as_bytes()));
    for i in 1..n {
        let prev = rows[i - 1];
        rows.push(keccak512(&prev));
    }

    for _ in 0..CACHE_ROUNDS {
        for i in 0..n {
            let src = (i + n - 1) % n;
            let xor_row =
                u32::from_le_bytes([rows[i][0], rows[i][1], rows[i][2], rows[i][3]]) as usize % n;
            let mut tmp = [0u8; HASH_BYTES];
            for (t, (a, b)) in tmp.iter_mut().zip(rows[src].iter().zip(rows[xor_row].iter())) {
                *t = a ^ b;
            }
            rows[i] = keccak512(&tmp);
        }
    }

    let mut out = Vec::with_capacity(n * HASH_WORDS);
    for row in &rows {
        for w in 0..HASH_WORDS {
            out.push(u32::from_le_bytes([
                row[w * 4],
                row[w * 4 + 1],
                row[w * 4 + 2],
                row[w * 4 + 3],
            ]));
        }
    }
    out
}

fn node_to_bytes(words: &[u32; HASH_WORDS]) -> [u8; HASH_BYTES] {
    let mut out = [0u8; HASH_BYTES];
    for (i, w) in words.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
    }
    out
}

fn bytes_to_node(bytes: &[u8; HASH_BYTES]) -> [u32; HASH_WORDS] {
    let mut out = [0u32; HASH_WORDS];
    for (i, w) in out.iter_mut().enumerate() {
        *w = u32::from_le_bytes([
            bytes[i * 4],
            bytes[i * 4 + 1],
            bytes[i * 4 + 2],
            bytes[i * 4 + 3],
        ]);
    }
    out
}

/// Derive one 64-byte dataset node from the cache.
pub fn calc_dataset_item(cache: &[u32], index: u64) -> [u32; HASH_WORDS] {
    let rows = cache.len() / HASH_WORDS;

    let base = (index as usize % rows) * HASH_WORDS;
    let mut mix = [0u32; HASH_WORDS];
    mix.copy_from_slice(&cache[base..base + HASH_WORDS]);
    mix[0] ^= index as u32;

    let hashed = keccak512(&node_to_bytes(&mix));
    let mut mix = bytes_to_node(&hashed);

    for p in 0..DATASET_PARENTS {
        let parent = fnv(index as u32 ^ p, mix[p as usize % HASH_WORDS]) as usize % rows;
        let pbase = parent * HASH_WORDS;
        fnv_hash(&mut mix, &cache[pbase..pbase + HASH_WORDS]);
    }

    bytes_to_node(&keccak512(&node_to_bytes(&mix)))
}

/// Materialize the full dataset for an epoch from its cache.
pub fn generate_dataset(size: u64, cache: &[u32]) -> Vec<u32> {
    let items = size as usize / HASH_BYTES;
    let mut out = Vec::with_capacity(items * HASH_WORDS);
    for i in 0..items {
        out.extend_from_slice(&calc_dataset_item(cache, i as u64));
    }
    out
}

/// The hashimoto mix: derive a seed from the seal hash and nonce, walk the
/// dataset, and compress to a `(digest, result)` pair.
fn hashimoto<L>(seal_hash: &H256, nonce: u64, full_size: u64, lookup: L) -> (H256, H256)
where
    L: Fn(u64) -> [u32; HASH_WORDS],
{
    let rows = full_size / MIX_BYTES as u64;

    let mut seed_input = [0u8; 40];
    seed_input[..32].copy_from_slice(seal_hash.as_bytes());
    seed_input[32..].copy_from_slice(&nonce.to_le_bytes());
    let seed = keccak512(&seed_input);
    let seed_head = u32::from_le_bytes([seed[0], seed[1], seed[2], seed[3]]);

    const MIX_WORDS: usize = MIX_BYTES / 4;
    let mut mix = [0u32; MIX_WORDS];
    for (i, w) in mix.iter_mut().enumerate() {
        let b = (i % HASH_WORDS) * 4;
        *w = u32::from_le_bytes([seed[b], seed[b + 1], seed[b + 2], seed[b + 3]]);
    }

    let mut temp = [0u32; MIX_WORDS];
    for i in 0..ACCESSES {
        let parent = fnv(i as u32 ^ seed_head, mix[i % MIX_WORDS]) as u64 % rows;
        for j in 0..MIX_BYTES / HASH_BYTES {
            let node = lookup(2 * parent + j as u64);
            temp[j * HASH_WORDS..(j + 1) * HASH_WORDS].copy_from_slice(&node);
        }
        fnv_hash(&mut mix, &temp);
    }

    let mut digest = [0u8; 32];
    for i in 0..MIX_WORDS / 4 {
        let w = fnv(fnv(fnv(mix[i * 4], mix[i * 4 + 1]), mix[i * 4 + 2]), mix[i * 4 + 3]);
        digest[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
    }

    let mut result_input = Vec::with_capacity(seed.len() + digest.len());
    result_input.extend_from_slice(&seed);
    result_input.extend_from_slice(&digest);
    (H256(digest), keccak256(&result_input))
}

/// Hashimoto over the cache alone: dataset nodes are derived on demand.
pub fn hashimoto_light(
    full_size: u64,
    cache: &[u32],
    seal_hash: &H256,
    nonce: u64,
) -> (H256, H256) {
    hashimoto(seal_hash, nonce, full_size, |i| calc_dataset_item(cache, i))
}

/// Hashimoto over a materialized dataset.
pub fn hashimoto_full(dataset: &[u32], seal_hash: &H256, nonce: u64) -> (H256, H256) {
    let full_size = dataset.len() as u64 * 4;
    hashimoto(seal_hash, nonce, full_size, |i| {
        let base = i as usize * HASH_WORDS;
        let mut node = [0u32; HASH_WORDS];
        node.copy_from_slice(&dataset[base..base + HASH_WORDS]);
        node
    })
}
