//! Hash sequences: ordered collections of 32-byte hashes with a canonical
//! serialization and a BLAKE3 collection hash.
//!
//! The byte form is a 4-byte little-endian count followed by the hashes in
//! order; the collection hash is the BLAKE3 hash of exactly those bytes.
//! Duplicates and the empty sequence are allowed.

use crate::error::{Error, Result};
use crate::hash::{hash, Hash, HASH_SIZE};

const COUNT_SIZE: usize = 4;

/// An ordered sequence of 32-byte hashes.
///
/// Equality is order-sensitive and constant-time per hash. Iteration
/// yields copies, so nothing external can mutate the sequence through an
/// iterator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashSequence {
    hashes: Vec<Hash>,
}

impl HashSequence {
    /// An empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of hashes in the sequence.
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// True when the sequence holds no hashes.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Append a hash.
    pub fn push(&mut self, hash: Hash) {
        self.hashes.push(hash);
    }

    /// The hash at `index`, if any.
    pub fn get(&self, index: usize) -> Option<Hash> {
        self.hashes.get(index).copied()
    }

    /// Whether the sequence contains `hash`.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.index_of(hash).is_some()
    }

    /// Index of the first occurrence of `hash`.
    pub fn index_of(&self, hash: &Hash) -> Option<usize> {
        self.hashes.iter().position(|h| h == hash)
    }

    /// Remove and return the hash at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<Hash> {
        if index >= self.hashes.len() {
            return Err(Error::IndexOutOfBounds {
                index: index as u64,
                len: self.hashes.len() as u64,
            });
        }
        Ok(self.hashes.remove(index))
    }

    /// Insert a hash at `index`, shifting later hashes right. `index` may
    /// equal the current length to append.
    pub fn insert_at(&mut self, index: usize, hash: Hash) -> Result<()> {
        if index > self.hashes.len() {
            return Err(Error::IndexOutOfBounds {
                index: index as u64,
                len: self.hashes.len() as u64,
            });
        }
        self.hashes.insert(index, hash);
        Ok(())
    }

    /// Remove every hash.
    pub fn clear(&mut self) {
        self.hashes.clear();
    }

    /// A new sequence holding the hashes of `range`.
    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        if start > end || end > self.hashes.len() {
            return Err(Error::IndexOutOfBounds {
                index: end as u64,
                len: self.hashes.len() as u64,
            });
        }
        Ok(Self {
            hashes: self.hashes[start..end].to_vec(),
        })
    }

    /// A new sequence holding this sequence followed by `other`.
    pub fn concat(&self, other: &Self) -> Self {
        let mut hashes = Vec::with_capacity(self.len() + other.len());
        hashes.extend_from_slice(&self.hashes);
        hashes.extend_from_slice(&other.hashes);
        Self { hashes }
    }

    /// Iterate over the hashes by value.
    pub fn iter(&self) -> impl Iterator<Item = Hash> + '_ {
        self.hashes.iter().copied()
    }

    /// The canonical byte form: `u32` little-endian count, then the hashes.
    pub fn to_bytes(&self) -> Vec<u8> {
        debug_assert!(self.hashes.len() <= u32::MAX as usize);
        let mut out = Vec::with_capacity(COUNT_SIZE + self.hashes.len() * HASH_SIZE);
        out.extend_from_slice(&(self.hashes.len() as u32).to_le_bytes());
        for hash in &self.hashes {
            out.extend_from_slice(hash.as_bytes());
        }
        out
    }

    /// Parse the canonical byte form. The input must be exactly the
    /// declared count of hashes, nothing more and nothing less.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < COUNT_SIZE {
            return Err(Error::UnexpectedEof);
        }
        let count = u32::from_le_bytes(<[u8; 4]>::try_from(&bytes[..COUNT_SIZE]).unwrap());
        let expected = COUNT_SIZE as u64 + count as u64 * HASH_SIZE as u64;
        if bytes.len() as u64 != expected {
            return Err(Error::Malformed(format!(
                "hash sequence is {} bytes, the count {count} requires {expected}",
                bytes.len()
            )));
        }
        let hashes = bytes[COUNT_SIZE..]
            .chunks_exact(HASH_SIZE)
            .map(|chunk| Hash::new(<[u8; HASH_SIZE]>::try_from(chunk).unwrap()))
            .collect();
        Ok(Self { hashes })
    }

    /// JSON form: an array of 64-character hex strings.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.hashes).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse the JSON form, enforcing 32-byte hashes.
    pub fn from_json(json: &str) -> Result<Self> {
        let hashes: Vec<Hash> =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Self { hashes })
    }

    /// The collection hash: BLAKE3 over [`to_bytes`](HashSequence::to_bytes).
    pub fn finalize(&self) -> Hash {
        hash(&self.to_bytes())
    }
}

impl From<Vec<Hash>> for HashSequence {
    fn from(hashes: Vec<Hash>) -> Self {
        Self { hashes }
    }
}

impl FromIterator<Hash> for HashSequence {
    fn from_iter<I: IntoIterator<Item = Hash>>(iter: I) -> Self {
        Self {
            hashes: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_data;

    fn sample(n: usize) -> HashSequence {
        (0..n).map(|i| hash(&test_data(i))).collect()
    }

    #[test]
    fn byte_round_trip() {
        for n in [0, 1, 2, 7] {
            let seq = sample(n);
            let bytes = seq.to_bytes();
            assert_eq!(bytes.len(), 4 + n * 32);
            assert_eq!(&bytes[..4], &(n as u32).to_le_bytes());
            assert_eq!(HashSequence::from_bytes(&bytes).unwrap(), seq);
        }
    }

    #[test]
    fn from_bytes_checks_the_exact_size() {
        let seq = sample(3);
        let bytes = seq.to_bytes();
        assert!(HashSequence::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        let mut padded = bytes.clone();
        padded.push(0);
        assert!(HashSequence::from_bytes(&padded).is_err());
        assert_eq!(HashSequence::from_bytes(&[]), Err(Error::UnexpectedEof));
    }

    #[test]
    fn json_round_trip() {
        let seq = sample(3);
        let json = seq.to_json().unwrap();
        assert_eq!(HashSequence::from_json(&json).unwrap(), seq);
        // 64-char hex enforced.
        assert!(HashSequence::from_json("[\"abcd\"]").is_err());
        assert_eq!(
            HashSequence::from_json("[]").unwrap(),
            HashSequence::new()
        );
    }

    #[test]
    fn collection_hash_is_blake3_of_the_bytes() {
        for n in [0, 1, 5] {
            let seq = sample(n);
            assert_eq!(seq.finalize(), hash(&seq.to_bytes()));
            assert_eq!(
                seq.finalize().as_bytes(),
                blake3::hash(&seq.to_bytes()).as_bytes()
            );
        }
    }

    #[test]
    fn mutation_ops() {
        let mut seq = HashSequence::new();
        let a = hash(b"a");
        let b = hash(b"b");
        let c = hash(b"c");
        seq.push(a);
        seq.push(c);
        seq.insert_at(1, b).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.get(1), Some(b));
        assert_eq!(seq.index_of(&c), Some(2));
        assert!(seq.contains(&a));
        assert_eq!(seq.remove_at(0).unwrap(), a);
        assert!(!seq.contains(&a));
        assert_eq!(seq.remove_at(5), Err(Error::IndexOutOfBounds { index: 5, len: 2 }));
        assert_eq!(
            seq.insert_at(3, a),
            Err(Error::IndexOutOfBounds { index: 3, len: 2 })
        );
        seq.clear();
        assert!(seq.is_empty());
    }

    #[test]
    fn duplicates_are_allowed_and_order_matters() {
        let a = hash(b"a");
        let b = hash(b"b");
        let ab: HashSequence = vec![a, a, b].into();
        let ba: HashSequence = vec![a, b, a].into();
        assert_ne!(ab, ba);
        assert_eq!(ab.index_of(&a), Some(0));
        assert_ne!(ab.finalize(), ba.finalize());
    }

    #[test]
    fn slice_and_concat() {
        let seq = sample(5);
        let head = seq.slice(0, 2).unwrap();
        let tail = seq.slice(2, 5).unwrap();
        assert_eq!(head.concat(&tail), seq);
        assert!(seq.slice(3, 2).is_err());
        assert!(seq.slice(0, 6).is_err());
    }

    #[test]
    fn iteration_yields_copies() {
        let seq = sample(4);
        let collected: Vec<Hash> = seq.iter().collect();
        assert_eq!(collected.len(), 4);
        let rebuilt: HashSequence = collected.into_iter().collect();
        assert_eq!(rebuilt, seq);
    }
}
