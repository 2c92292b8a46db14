//! Resumable partial downloads: a tracker that admits verified chunk
//! groups in any order and reassembles the content once all of them have
//! arrived.
//!
//! Each group is verified against the root hash before it is stored,
//! either through a sibling-path proof over the outer group tree or
//! explicitly trusted by the caller. The tracker state is fully
//! serializable, so an interrupted download can resume in a later process
//! with nothing lost.
//!
//! The proof tree uses the same power-of-two left-balanced shape as the
//! encoders (`left = largest power of two <= groups - 1`). When the group
//! count is not a power of two the tree is uneven, so proofs for shallow
//! leaves are shorter; a proof must have exactly the depth of its leaf.

use std::collections::BTreeMap;

use bitvec::order::Lsb0;
use bitvec::vec::BitVec;
use bytes::Bytes;
use range_collections::RangeSet2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::{hash, hash_subtree, parent_cv, Hash};
use crate::tree::{largest_power_of_two_leq, BlockSize};

/// Tracker for an out-of-order chunk-group download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialBao {
    root: Hash,
    content_len: u64,
    block_size: BlockSize,
    num_groups: u64,
    received: BitVec<u8, Lsb0>,
    groups: BTreeMap<u64, Bytes>,
}

impl PartialBao {
    /// An empty tracker expecting `content_len` bytes hashing to `root`.
    pub fn new(root: Hash, content_len: u64, block_size: BlockSize) -> Self {
        let num_groups = block_size.groups(content_len);
        Self {
            root,
            content_len,
            block_size,
            num_groups,
            received: BitVec::repeat(false, num_groups as usize),
            groups: BTreeMap::new(),
        }
    }

    /// A complete tracker over locally-held content, the natural source of
    /// proofs when serving other downloaders.
    pub fn from_content(data: &[u8], block_size: BlockSize) -> Self {
        let mut tracker = Self::new(hash(data), data.len() as u64, block_size);
        let group_bytes = block_size.bytes() as usize;
        for index in 0..tracker.num_groups {
            let start = index as usize * group_bytes;
            let end = data.len().min(start + group_bytes);
            tracker
                .groups
                .insert(index, Bytes::copy_from_slice(&data[start..end]));
            tracker.received.set(index as usize, true);
        }
        tracker
    }

    /// The expected root hash.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// The expected content length in bytes.
    pub fn content_len(&self) -> u64 {
        self.content_len
    }

    /// The chunk-group size.
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// Total number of groups, at least 1.
    pub fn num_groups(&self) -> u64 {
        self.num_groups
    }

    /// Expected payload size of one group. Only the last group may be
    /// short (or empty, for empty content).
    pub fn expected_group_size(&self, index: u64) -> Result<u64> {
        self.check_index(index)?;
        let start = index * self.block_size.bytes();
        Ok(self.block_size.bytes().min(self.content_len - start))
    }

    fn check_index(&self, index: u64) -> Result<()> {
        if index >= self.num_groups {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.num_groups,
            });
        }
        Ok(())
    }

    /// Whether group `index` has been received.
    pub fn has_group(&self, index: u64) -> bool {
        index < self.num_groups && self.received[index as usize]
    }

    /// True once every group has been received.
    pub fn is_complete(&self) -> bool {
        self.received.count_ones() as u64 == self.num_groups
    }

    /// Download progress in percent.
    pub fn progress(&self) -> f64 {
        self.received.count_ones() as f64 / self.num_groups as f64 * 100.0
    }

    /// Maximal spans of received group indices.
    pub fn present_ranges(&self) -> RangeSet2<u64> {
        self.ranges(true)
    }

    /// Maximal spans of still-missing group indices.
    pub fn missing_ranges(&self) -> RangeSet2<u64> {
        self.ranges(false)
    }

    fn ranges(&self, wanted: bool) -> RangeSet2<u64> {
        let mut result = RangeSet2::empty();
        let mut index = 0;
        while index < self.num_groups {
            if self.received[index as usize] == wanted {
                let start = index;
                while index < self.num_groups && self.received[index as usize] == wanted {
                    index += 1;
                }
                result |= RangeSet2::from(start..index);
            } else {
                index += 1;
            }
        }
        result
    }

    /// Verify a group against the root via its sibling-path proof and
    /// store it. Re-adding a group that is already present is a no-op
    /// success; any failure leaves the tracker unchanged.
    pub fn add_chunk_group(&mut self, index: u64, data: &[u8], proof: &[Hash]) -> Result<()> {
        self.check_group(index, data)?;
        if self.has_group(index) {
            tracing::trace!(index, "group already present");
            return Ok(());
        }
        let leaf = self.leaf_cv(index, data);
        if self.num_groups == 1 {
            if leaf != self.root {
                return Err(Error::GroupHashMismatch { index });
            }
        } else {
            self.verify_proof(index, &leaf, proof)?;
        }
        self.store(index, data);
        Ok(())
    }

    /// Store a group without a proof. The payload is still required to
    /// have the right index and size.
    pub fn add_chunk_group_trusted(&mut self, index: u64, data: &[u8]) -> Result<()> {
        self.check_group(index, data)?;
        if self.has_group(index) {
            return Ok(());
        }
        self.store(index, data);
        Ok(())
    }

    fn check_group(&self, index: u64, data: &[u8]) -> Result<()> {
        let expected = self.expected_group_size(index)?;
        if data.len() as u64 != expected {
            return Err(Error::GroupSizeMismatch {
                index,
                expected,
                actual: data.len() as u64,
            });
        }
        Ok(())
    }

    fn leaf_cv(&self, index: u64, data: &[u8]) -> Hash {
        hash_subtree(index * self.block_size.chunks(), data, self.num_groups == 1)
    }

    fn store(&mut self, index: u64, data: &[u8]) {
        tracing::debug!(index, len = data.len(), "chunk group admitted");
        self.groups.insert(index, Bytes::copy_from_slice(data));
        self.received.set(index as usize, true);
    }

    // Fold the proof from the leaf up, orienting each combine by where the
    // leaf sits in the left-balanced tree. Only the topmost combine gets
    // the root flag.
    fn verify_proof(&self, index: u64, leaf: &Hash, proof: &[Hash]) -> Result<()> {
        let path = descent_path(self.num_groups, index);
        if proof.len() != path.len() {
            return Err(Error::ProofLength {
                expected: path.len(),
                actual: proof.len(),
            });
        }
        let mut cv = *leaf;
        for (level, (leaf_is_left, sibling)) in path.iter().rev().zip(proof.iter()).enumerate() {
            let is_root = level == path.len() - 1;
            cv = if *leaf_is_left {
                parent_cv(&cv, sibling, is_root)
            } else {
                parent_cv(sibling, &cv, is_root)
            };
        }
        if cv != self.root {
            return Err(Error::GroupHashMismatch { index });
        }
        Ok(())
    }

    /// Produce the sibling-path proof for a group, ordered leaf to root.
    /// Requires a complete tracker.
    pub fn create_proof(&self, index: u64) -> Result<Vec<Hash>> {
        self.check_index(index)?;
        if !self.is_complete() {
            return Err(Error::Incomplete);
        }
        if self.num_groups == 1 {
            return Ok(Vec::new());
        }
        let cvs: Vec<Hash> = (0..self.num_groups)
            .map(|i| self.leaf_cv(i, &self.groups[&i]))
            .collect();
        let mut proof = Vec::new();
        collect_siblings(&cvs, 0, index, &mut proof);
        Ok(proof)
    }

    /// Reassemble the content in group order. With `verify` the result is
    /// re-hashed and checked against the root.
    pub fn finalize(&self, verify: bool) -> Result<Vec<u8>> {
        if !self.is_complete() {
            return Err(Error::Incomplete);
        }
        let mut content = Vec::with_capacity(self.content_len as usize);
        for data in self.groups.values() {
            content.extend_from_slice(data);
        }
        debug_assert_eq!(content.len() as u64, self.content_len);
        if verify && hash(&content) != self.root {
            return Err(Error::RootHashMismatch);
        }
        Ok(content)
    }

    /// Serialize the full tracker state to a lossless snapshot.
    pub fn export_state(&self) -> Result<Vec<u8>> {
        let snapshot = Snapshot {
            root: self.root,
            content_len: self.content_len,
            chunk_group_log: self.block_size.chunk_log(),
            bitfield: hex::encode(self.received.as_raw_slice()),
            groups: self
                .groups
                .iter()
                .map(|(index, data)| (*index, hex::encode(data)))
                .collect(),
        };
        serde_json::to_vec(&snapshot).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Restore a tracker from a snapshot produced by
    /// [`export_state`](PartialBao::export_state).
    ///
    /// The snapshot's structure is validated (bitfield length, bit/payload
    /// agreement, per-group sizes); the payloads themselves were verified
    /// before export and are not re-proved here.
    pub fn import_state(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot =
            serde_json::from_slice(bytes).map_err(|e| Error::Serialization(e.to_string()))?;
        let block_size = BlockSize::from_chunk_log(snapshot.chunk_group_log);
        let mut tracker = Self::new(snapshot.root, snapshot.content_len, block_size);
        let raw = hex::decode(&snapshot.bitfield)
            .map_err(|e| Error::Malformed(format!("invalid bitfield hex: {e}")))?;
        if raw.len() != tracker.received.as_raw_slice().len() {
            return Err(Error::Malformed(format!(
                "bitfield is {} bytes, expected {}",
                raw.len(),
                tracker.received.as_raw_slice().len()
            )));
        }
        let mut received = BitVec::<u8, Lsb0>::from_vec(raw);
        if received[tracker.num_groups as usize..].any() {
            return Err(Error::Malformed("bitfield has bits past the end".into()));
        }
        received.truncate(tracker.num_groups as usize);
        for index in 0..tracker.num_groups {
            let bit = received[index as usize];
            let payload = snapshot.groups.get(&index);
            match (bit, payload) {
                (true, Some(hex_data)) => {
                    let data = hex::decode(hex_data)
                        .map_err(|e| Error::Malformed(format!("invalid group hex: {e}")))?;
                    tracker.check_group(index, &data)?;
                    tracker.groups.insert(index, Bytes::from(data));
                }
                (false, None) => {}
                _ => {
                    return Err(Error::Malformed(format!(
                        "bitfield and stored groups disagree at index {index}"
                    )));
                }
            }
        }
        if let Some((&index, _)) = snapshot.groups.range(tracker.num_groups..).next() {
            return Err(Error::IndexOutOfBounds {
                index,
                len: tracker.num_groups,
            });
        }
        tracker.received = received;
        Ok(tracker)
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    root: Hash,
    content_len: u64,
    chunk_group_log: u8,
    bitfield: String,
    groups: BTreeMap<u64, String>,
}

// Top-down orientation of the path to leaf `index`: true where the leaf
// lies in the left child.
fn descent_path(num_groups: u64, index: u64) -> Vec<bool> {
    let mut path = Vec::new();
    let (mut lo, mut hi) = (0, num_groups);
    while hi - lo > 1 {
        let split = lo + largest_power_of_two_leq(hi - lo - 1);
        if index < split {
            path.push(true);
            hi = split;
        } else {
            path.push(false);
            lo = split;
        }
    }
    path
}

// Collect the sibling CV at every level of the path to `index`, leaf
// level first. Siblings are interior (or leaf) subtree CVs and never the
// root, so they all hash without the root flag.
fn collect_siblings(cvs: &[Hash], base: u64, index: u64, out: &mut Vec<Hash>) {
    if cvs.len() == 1 {
        return;
    }
    let split = largest_power_of_two_leq(cvs.len() as u64 - 1) as usize;
    if index < base + split as u64 {
        collect_siblings(&cvs[..split], base, index, out);
        out.push(subtree_cv(&cvs[split..]));
    } else {
        collect_siblings(&cvs[split..], base + split as u64, index, out);
        out.push(subtree_cv(&cvs[..split]));
    }
}

fn subtree_cv(cvs: &[Hash]) -> Hash {
    if cvs.len() == 1 {
        return cvs[0];
    }
    let split = largest_power_of_two_leq(cvs.len() as u64 - 1) as usize;
    parent_cv(&subtree_cv(&cvs[..split]), &subtree_cv(&cvs[split..]), false)
}
