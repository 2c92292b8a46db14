//! Tree geometry: how a content length maps onto the left-balanced chunk
//! tree and its serialized encodings.
//!
//! All functions here are pure integer math. The tree over a given content
//! length is fully deterministic: the left subtree always covers the
//! largest power-of-two number of chunks that still leaves at least one
//! byte for the right subtree.

use std::fmt;

use crate::hash::CHUNK_LEN;

/// Size of the little-endian length header in bytes.
pub const HEADER_SIZE: usize = 8;
/// Size of a serialized parent node (two concatenated CVs) in bytes.
pub const PARENT_SIZE: usize = 64;

pub(crate) fn encode_len(len: u64) -> [u8; HEADER_SIZE] {
    len.to_le_bytes()
}

pub(crate) fn decode_len(bytes: &[u8; HEADER_SIZE]) -> u64 {
    u64::from_le_bytes(*bytes)
}

/// Number of chunks for a content length. The empty input still counts as
/// one (empty) chunk.
pub fn count_chunks(len: u64) -> u64 {
    if len == 0 {
        1
    } else {
        len.div_ceil(CHUNK_LEN as u64)
    }
}

// Find the largest power of two that is less than or equal to `n`. Used for
// subtree sizes below.
pub(crate) fn largest_power_of_two_leq(n: u64) -> u64 {
    ((n / 2) + 1).next_power_of_two()
}

/// Given a content length larger than one chunk, the number of bytes
/// covered by the left subtree.
///
/// Always a positive multiple of [`CHUNK_LEN`], strictly less than `len`.
pub fn left_len(len: u64) -> u64 {
    debug_assert!(len > CHUNK_LEN as u64);
    // Subtract 1 to reserve at least one byte for the right side.
    let full_chunks = (len - 1) / CHUNK_LEN as u64;
    largest_power_of_two_leq(full_chunks) * CHUNK_LEN as u64
}

/// Size of the pre-order tree encoding for a content length, excluding the
/// 8-byte header.
///
/// A tree of `n` chunks has exactly `n - 1` parent nodes; the combined
/// form additionally carries the content itself.
pub fn encoded_size(len: u64, outboard: bool) -> u64 {
    let parents = (count_chunks(len) - 1) * PARENT_SIZE as u64;
    if outboard {
        parents
    } else {
        parents + len
    }
}

/// A chunk-group size, `2^g` chunks per group.
///
/// Encoded as the power of 2: `BlockSize(0)` groups one chunk (the plain
/// tree), `BlockSize(4)` groups 16 chunks, shrinking a grouped outboard by
/// the same factor at the cost of coarser verification granularity.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockSize(pub(crate) u8);

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self, f)
    }
}

impl BlockSize {
    /// One chunk per group, the plain Bao tree.
    pub const ZERO: BlockSize = BlockSize(0);

    /// Create a block size from the log2 of the number of chunks per group.
    pub const fn from_chunk_log(chunk_log: u8) -> Self {
        Self(chunk_log)
    }

    /// The log2 of the number of chunks per group.
    pub const fn chunk_log(self) -> u8 {
        self.0
    }

    /// Number of chunks in one group.
    pub const fn chunks(self) -> u64 {
        1 << self.0
    }

    /// Number of bytes in one full group.
    pub const fn bytes(self) -> u64 {
        (CHUNK_LEN as u64) << self.0
    }

    /// Number of groups for a content length. The empty input counts as one
    /// (empty) group.
    pub fn groups(self, len: u64) -> u64 {
        if len == 0 {
            1
        } else {
            len.div_ceil(self.bytes())
        }
    }
}

/// Size of a grouped outboard encoding including the header.
///
/// The outer tree over `n` group CVs has `n - 1` parent nodes and stores
/// nothing else.
pub fn group_outboard_size(len: u64, block_size: BlockSize) -> u64 {
    HEADER_SIZE as u64 + (block_size.groups(len) - 1) * PARENT_SIZE as u64
}
