//! The BLAKE3 compression primitive and the chaining-value computations
//! built on top of it.
//!
//! Everything in this crate reduces to [`compress`]: chunks are compressed
//! block by block with a running chaining value, parent nodes are a single
//! compression over two concatenated child CVs, and whole subtrees combine
//! the two with the left-balanced split from [`crate::tree`]. Only the base
//! hash is implemented; the keyed and key-derivation modes are not needed
//! for verified streaming.
//!
//! Chunk CVs are independent of each other: the CV for chunk index `i`
//! depends only on that chunk's bytes and `i`. Callers that want to farm
//! chunk hashing out to threads or SIMD lanes can rely on that, as long as
//! the results are bit-identical.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::tree::left_len;

/// Size of a hash or chaining value in bytes.
pub const HASH_SIZE: usize = 32;
/// Size of one compression block in bytes.
pub const BLOCK_LEN: usize = 64;
/// Size of one chunk, the leaf unit of the tree, in bytes.
pub const CHUNK_LEN: usize = 1024;

const CHUNK_START: u32 = 1 << 0;
const CHUNK_END: u32 = 1 << 1;
const PARENT: u32 = 1 << 2;
const ROOT: u32 = 1 << 3;

/// The BLAKE3 IV, shared with SHA-256.
const IV: [u32; 8] = [
    0x6A09E667, 0xBB67AE85, 0x3C6EF372, 0xA54FF53A, 0x510E527F, 0x9B05688C, 0x1F83D9AB, 0x5BE0CD19,
];

const MSG_PERMUTATION: [usize; 16] = [2, 6, 3, 10, 7, 0, 4, 13, 1, 11, 12, 5, 9, 14, 15, 8];

// The G mixing function, applied to either a column or a diagonal of the
// 4x4 state.
fn g(state: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize, mx: u32, my: u32) {
    state[a] = state[a].wrapping_add(state[b]).wrapping_add(mx);
    state[d] = (state[d] ^ state[a]).rotate_right(16);
    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_right(12);
    state[a] = state[a].wrapping_add(state[b]).wrapping_add(my);
    state[d] = (state[d] ^ state[a]).rotate_right(8);
    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_right(7);
}

fn round(state: &mut [u32; 16], m: &[u32; 16]) {
    // Mix the columns.
    g(state, 0, 4, 8, 12, m[0], m[1]);
    g(state, 1, 5, 9, 13, m[2], m[3]);
    g(state, 2, 6, 10, 14, m[4], m[5]);
    g(state, 3, 7, 11, 15, m[6], m[7]);
    // Mix the diagonals.
    g(state, 0, 5, 10, 15, m[8], m[9]);
    g(state, 1, 6, 11, 12, m[10], m[11]);
    g(state, 2, 7, 8, 13, m[12], m[13]);
    g(state, 3, 4, 9, 14, m[14], m[15]);
}

fn permute(m: &mut [u32; 16]) {
    let mut permuted = [0; 16];
    for i in 0..16 {
        permuted[i] = m[MSG_PERMUTATION[i]];
    }
    *m = permuted;
}

/// The BLAKE3 compression function, truncated to the 8-word chaining value.
///
/// Seven rounds of G over a 16-word state initialized from the input CV,
/// the first four IV words, the split counter, the block length and the
/// flags; the message words are permuted between rounds. The extended
/// output (the upper half of the state) is never needed here.
pub fn compress(
    chaining_value: &[u32; 8],
    block_words: &[u32; 16],
    counter: u64,
    block_len: u32,
    flags: u32,
) -> [u32; 8] {
    #[rustfmt::skip]
    let mut state = [
        chaining_value[0], chaining_value[1], chaining_value[2], chaining_value[3],
        chaining_value[4], chaining_value[5], chaining_value[6], chaining_value[7],
        IV[0],             IV[1],             IV[2],             IV[3],
        counter as u32,    (counter >> 32) as u32, block_len,    flags,
    ];
    let mut block = *block_words;

    round(&mut state, &block); // round 1
    permute(&mut block);
    round(&mut state, &block); // round 2
    permute(&mut block);
    round(&mut state, &block); // round 3
    permute(&mut block);
    round(&mut state, &block); // round 4
    permute(&mut block);
    round(&mut state, &block); // round 5
    permute(&mut block);
    round(&mut state, &block); // round 6
    permute(&mut block);
    round(&mut state, &block); // round 7

    let mut cv = [0; 8];
    for i in 0..8 {
        cv[i] = state[i] ^ state[i + 8];
    }
    cv
}

// Pack up to 64 bytes into 16 little-endian message words, zero-padded.
fn block_words(block: &[u8]) -> [u32; 16] {
    debug_assert!(block.len() <= BLOCK_LEN);
    let mut words = [0; 16];
    for (i, chunk) in block.chunks(4).enumerate() {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        words[i] = u32::from_le_bytes(word);
    }
    words
}

fn cv_to_bytes(cv: &[u32; 8]) -> [u8; HASH_SIZE] {
    let mut bytes = [0; HASH_SIZE];
    for (i, word) in cv.iter().enumerate() {
        bytes[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }
    bytes
}

/// A 32-byte BLAKE3 hash or chaining value.
///
/// Equality is constant-time: the comparison accumulates XOR differences
/// over all 32 bytes before deciding, so an adversary cannot learn how many
/// leading bytes of a CV matched.
#[derive(Clone, Copy)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Create a hash from its raw bytes.
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// The raw bytes of the hash.
    pub const fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Lowercase hex representation, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hash from a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::Malformed(format!("invalid hex: {e}")))?;
        Self::try_from(bytes.as_slice())
    }
}

impl PartialEq for Hash {
    fn eq(&self, other: &Self) -> bool {
        let mut diff = 0u8;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl Eq for Hash {}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; HASH_SIZE]> for Hash {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<Hash> for [u8; HASH_SIZE] {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

impl TryFrom<&[u8]> for Hash {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; HASH_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::InvalidHashLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Compute the chaining value of one chunk of up to [`CHUNK_LEN`] bytes.
///
/// The chunk index is the compression counter for every block of the chunk.
/// `is_root` must only be set when the chunk is the entire tree.
pub fn chunk_cv(data: &[u8], chunk_index: u64, is_root: bool) -> Hash {
    debug_assert!(data.len() <= CHUNK_LEN);
    let num_blocks = data.len().div_ceil(BLOCK_LEN).max(1);
    let mut cv = IV;
    for i in 0..num_blocks {
        let block = &data[i * BLOCK_LEN..data.len().min((i + 1) * BLOCK_LEN)];
        let mut flags = 0;
        if i == 0 {
            flags |= CHUNK_START;
        }
        if i == num_blocks - 1 {
            flags |= CHUNK_END;
            if is_root {
                flags |= ROOT;
            }
        }
        cv = compress(&cv, &block_words(block), chunk_index, block.len() as u32, flags);
    }
    Hash(cv_to_bytes(&cv))
}

/// Compute the chaining value of a parent node from its two child CVs.
pub fn parent_cv(left: &Hash, right: &Hash, is_root: bool) -> Hash {
    let mut block = [0u8; BLOCK_LEN];
    block[..HASH_SIZE].copy_from_slice(left.as_bytes());
    block[HASH_SIZE..].copy_from_slice(right.as_bytes());
    let flags = PARENT | if is_root { ROOT } else { 0 };
    let cv = compress(&IV, &block_words(&block), 0, BLOCK_LEN as u32, flags);
    Hash(cv_to_bytes(&cv))
}

/// Compute the chaining value of a whole left-balanced subtree whose first
/// chunk has index `start_chunk`.
///
/// With `(0, data, true)` this is the BLAKE3 hash of `data`; with a nonzero
/// start chunk it is the CV a chunk group contributes to the outer tree.
pub fn hash_subtree(start_chunk: u64, data: &[u8], is_root: bool) -> Hash {
    if data.len() <= CHUNK_LEN {
        return chunk_cv(data, start_chunk, is_root);
    }
    let split = left_len(data.len() as u64) as usize;
    let left = hash_subtree(start_chunk, &data[..split], false);
    let right = hash_subtree(start_chunk + (split / CHUNK_LEN) as u64, &data[split..], false);
    parent_cv(&left, &right, is_root)
}

/// The BLAKE3 hash of `data`.
pub fn hash(data: &[u8]) -> Hash {
    hash_subtree(0, data, true)
}
