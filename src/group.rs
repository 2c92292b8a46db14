//! Chunk-group outboards: the same tree at coarser granularity.
//!
//! Grouping `2^g` chunks into one leaf shrinks the outboard by the same
//! factor. Because a group's CV is by construction the subtree CV of its
//! chunks, the outer tree over group CVs has the same root as the plain
//! Bao tree, so one root hash serves both shapes.

use crate::error::{Error, Result};
use crate::hash::{hash_subtree, parent_cv, Hash};
use crate::tree::{
    decode_len, encode_len, group_outboard_size, largest_power_of_two_leq, BlockSize, HEADER_SIZE,
    PARENT_SIZE,
};

/// An outboard over chunk groups: the length header plus the outer tree's
/// parent nodes, with the root hash and group size carried alongside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOutboard {
    encoded: Vec<u8>,
    root: Hash,
    content_len: u64,
    block_size: BlockSize,
}

impl GroupOutboard {
    /// Build the grouped outboard for `data`.
    pub fn create(data: &[u8], block_size: BlockSize) -> Self {
        let content_len = data.len() as u64;
        let num_groups = block_size.groups(content_len);
        let total = group_outboard_size(content_len, block_size) as usize;
        let mut encoded = vec![0u8; total];
        encoded[..HEADER_SIZE].copy_from_slice(&encode_len(content_len));
        let root = if num_groups == 1 {
            // The whole content fits one group; its subtree is the tree.
            hash_subtree(0, data, true)
        } else {
            let cvs = group_cvs(data, block_size);
            let mut writer = OuterWriter {
                out: &mut encoded,
                pos: HEADER_SIZE,
            };
            let root = writer.subtree(&cvs, true);
            debug_assert_eq!(writer.pos, total);
            root
        };
        Self {
            encoded,
            root,
            content_len,
            block_size,
        }
    }

    /// Adopt an untrusted outboard encoding. Only the size laws are
    /// checked here; [`verify`](GroupOutboard::verify) does the rest.
    pub fn from_parts(encoded: Vec<u8>, root: Hash, block_size: BlockSize) -> Result<Self> {
        if encoded.len() < HEADER_SIZE {
            return Err(Error::UnexpectedEof);
        }
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&encoded[..HEADER_SIZE]);
        let content_len = decode_len(&header);
        let expected = group_outboard_size(content_len, block_size);
        if encoded.len() as u64 != expected {
            return Err(Error::Malformed(format!(
                "outboard is {} bytes, expected {expected}",
                encoded.len()
            )));
        }
        Ok(Self {
            encoded,
            root,
            content_len,
            block_size,
        })
    }

    /// The root hash, equal to the plain Bao root of the same content.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// The content length from the header.
    pub fn content_len(&self) -> u64 {
        self.content_len
    }

    /// The chunk-group size of the outer tree.
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// The wire form: header followed by the outer parent nodes.
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    /// Verify `data` against this outboard and its root hash.
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        if data.len() as u64 != self.content_len {
            return Err(Error::LengthMismatch {
                header: self.content_len,
                expected: data.len() as u64,
            });
        }
        let num_groups = self.block_size.groups(self.content_len);
        if num_groups == 1 {
            if hash_subtree(0, data, true) != self.root {
                return Err(Error::GroupHashMismatch { index: 0 });
            }
            return Ok(());
        }
        let cvs = group_cvs(data, self.block_size);
        let mut verifier = OuterVerifier {
            nodes: &self.encoded[HEADER_SIZE..],
            pos: 0,
            block_size: self.block_size,
        };
        verifier.subtree(&cvs, 0, &self.root, true)?;
        debug_assert_eq!(verifier.pos, verifier.nodes.len());
        Ok(())
    }
}

// One CV per group, each the root of its own chunk subtree. None of them
// is the overall root; the caller handles the single-group case.
fn group_cvs(data: &[u8], block_size: BlockSize) -> Vec<Hash> {
    let group_bytes = block_size.bytes() as usize;
    let num_groups = block_size.groups(data.len() as u64) as usize;
    (0..num_groups)
        .map(|i| {
            let start = i * group_bytes;
            let end = data.len().min(start + group_bytes);
            hash_subtree(i as u64 * block_size.chunks(), &data[start..end], false)
        })
        .collect()
}

struct OuterWriter<'a> {
    out: &'a mut [u8],
    pos: usize,
}

impl OuterWriter<'_> {
    fn subtree(&mut self, cvs: &[Hash], is_root: bool) -> Hash {
        if cvs.len() == 1 {
            return cvs[0];
        }
        let node_at = self.pos;
        self.pos += PARENT_SIZE;
        let split = largest_power_of_two_leq(cvs.len() as u64 - 1) as usize;
        let left = self.subtree(&cvs[..split], false);
        let right = self.subtree(&cvs[split..], false);
        self.out[node_at..node_at + 32].copy_from_slice(left.as_bytes());
        self.out[node_at + 32..node_at + PARENT_SIZE].copy_from_slice(right.as_bytes());
        parent_cv(&left, &right, is_root)
    }
}

struct OuterVerifier<'a> {
    nodes: &'a [u8],
    pos: usize,
    block_size: BlockSize,
}

impl OuterVerifier<'_> {
    fn subtree(&mut self, cvs: &[Hash], base: u64, expected: &Hash, is_root: bool) -> Result<()> {
        if cvs.len() == 1 {
            if cvs[0] != *expected {
                return Err(Error::GroupHashMismatch { index: base });
            }
            return Ok(());
        }
        if self.nodes.len() - self.pos < PARENT_SIZE {
            return Err(Error::UnexpectedEof);
        }
        let node = &self.nodes[self.pos..self.pos + PARENT_SIZE];
        self.pos += PARENT_SIZE;
        let left = Hash::new(<[u8; 32]>::try_from(&node[..32]).unwrap());
        let right = Hash::new(<[u8; 32]>::try_from(&node[32..]).unwrap());
        if parent_cv(&left, &right, is_root) != *expected {
            return Err(Error::ParentHashMismatch(base * self.block_size.chunks()));
        }
        let split = largest_power_of_two_leq(cvs.len() as u64 - 1) as usize;
        self.subtree(&cvs[..split], base, &left, false)?;
        self.subtree(&cvs[split..], base + split as u64, &right, false)
    }
}
