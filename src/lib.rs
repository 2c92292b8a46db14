//! Verified streaming over BLAKE3.
//!
//! This crate computes BLAKE3 hashes of byte streams and produces an
//! encoding of the underlying Merkle tree so that any contiguous byte
//! range of the content can later be transmitted with a compact proof and
//! verified byte for byte against a single 32-byte root hash, without
//! trusting the sender and without fetching the rest of the content.
//!
//! The building blocks, bottom up:
//!
//! - [`hash()`], [`chunk_cv`], [`parent_cv`], [`hash_subtree`]: the
//!   compression primitive and the chaining values of chunks, parents and
//!   whole subtrees.
//! - [`encode()`]/[`outboard()`] and [`Encoder`]: one-shot and streaming
//!   producers of the combined (self-contained) and outboard (tree-only)
//!   encodings.
//! - [`Decoder`], [`decode()`], [`verify_outboard`]: incremental
//!   verification that never emits an unverified byte.
//! - [`extract_slice`]/[`decode_slice`]: minimal encodings proving one
//!   byte range.
//! - [`GroupOutboard`]: the chunk-group variant, the same root at a
//!   fraction of the outboard size.
//! - [`PartialBao`]: a resumable tracker for chunk groups arriving out of
//!   order, with sibling-path proofs and serializable state.
//! - [`HashSequence`]: an ordered hash collection with its own BLAKE3
//!   collection hash.
//!
//! All encodings share one wire vocabulary: an 8-byte little-endian length
//! header, 64-byte parent nodes (left CV then right CV), and 1024-byte
//! chunks, laid out in pre-order over a left-balanced tree.

mod error;
mod hash;
mod tree;

pub mod decode;
pub mod encode;
pub mod group;
pub mod hash_seq;
pub mod partial;
pub mod slice;

#[cfg(test)]
mod tests;

pub use decode::{decode, verify_outboard, Decoder};
pub use encode::{encode, outboard, Encoder};
pub use error::{Error, Result};
pub use group::GroupOutboard;
pub use hash::{
    chunk_cv, compress, hash, hash_subtree, parent_cv, Hash, BLOCK_LEN, CHUNK_LEN, HASH_SIZE,
};
pub use hash_seq::HashSequence;
pub use partial::PartialBao;
pub use slice::{decode_slice, extract_slice, extract_slice_outboard};
pub use tree::{
    count_chunks, encoded_size, group_outboard_size, left_len, BlockSize, HEADER_SIZE, PARENT_SIZE,
};
