//! Encoding: one-shot and streaming producers of combined and outboard
//! encodings.
//!
//! Both encoders write the same bytes: an 8-byte little-endian length
//! header followed by the pre-order tree, where every interior node
//! contributes a 64-byte parent record and, in combined mode, every leaf
//! contributes its raw chunk bytes. The outboard form omits the chunk
//! bytes; the content is kept separately and re-hashed during
//! verification.

use std::mem;

use crate::error::{Error, Result};
use crate::hash::{chunk_cv, parent_cv, Hash, CHUNK_LEN};
use crate::tree::{encode_len, encoded_size, largest_power_of_two_leq, left_len, HEADER_SIZE, PARENT_SIZE};

/// Encode `data` into the self-contained combined form.
///
/// Returns the encoding and the root hash, which equals the BLAKE3 hash of
/// `data`.
pub fn encode(data: &[u8]) -> (Vec<u8>, Hash) {
    encode_inner(data, false)
}

/// Encode `data` into the outboard form (tree only, no chunk bytes).
pub fn outboard(data: &[u8]) -> (Vec<u8>, Hash) {
    encode_inner(data, true)
}

fn encode_inner(data: &[u8], outboard: bool) -> (Vec<u8>, Hash) {
    let content_len = data.len() as u64;
    let total = HEADER_SIZE + encoded_size(content_len, outboard) as usize;
    let mut out = vec![0u8; total];
    out[..HEADER_SIZE].copy_from_slice(&encode_len(content_len));
    let mut writer = TreeWriter {
        out: &mut out,
        pos: HEADER_SIZE,
        counter: 0,
        outboard,
    };
    let root = writer.subtree(data, true);
    debug_assert_eq!(writer.pos, total);
    (out, root)
}

// Explicit writer record threaded through the pre-order recursion: the
// output buffer, a write cursor, and the running chunk counter.
struct TreeWriter<'a> {
    out: &'a mut [u8],
    pos: usize,
    counter: u64,
    outboard: bool,
}

impl TreeWriter<'_> {
    fn subtree(&mut self, data: &[u8], is_root: bool) -> Hash {
        if data.len() <= CHUNK_LEN {
            let cv = chunk_cv(data, self.counter, is_root);
            if !self.outboard {
                self.out[self.pos..self.pos + data.len()].copy_from_slice(data);
                self.pos += data.len();
            }
            self.counter += 1;
            return cv;
        }
        // Reserve the parent slot before the children so the node lands in
        // pre-order, then fill it once both child CVs are known.
        let node_at = self.pos;
        self.pos += PARENT_SIZE;
        let split = left_len(data.len() as u64) as usize;
        let left = self.subtree(&data[..split], false);
        let right = self.subtree(&data[split..], false);
        self.out[node_at..node_at + 32].copy_from_slice(left.as_bytes());
        self.out[node_at + 32..node_at + PARENT_SIZE].copy_from_slice(right.as_bytes());
        parent_cv(&left, &right, is_root)
    }
}

/// A streaming encoder that accepts arbitrarily sized writes and produces
/// the encoding at finalize time.
///
/// Chunk CVs are computed as soon as a chunk is known to be complete, so
/// outboard encoding buffers only the CV list plus at most one chunk of
/// pending bytes. Combined encoding necessarily retains the content: chunk
/// bytes appear in tree order, which is only known once the total length
/// is.
///
/// `finalize` is idempotent; after the first call the encoder rejects
/// further writes.
#[derive(Debug)]
pub struct Encoder {
    outboard: bool,
    state: State,
}

#[derive(Debug)]
enum State {
    Open {
        // Unhashed tail, between 0 and CHUNK_LEN bytes. A full chunk is
        // only sealed once at least one byte lies beyond it, so the final
        // chunk is always hashed at finalize time with the right flags.
        pending: Vec<u8>,
        cvs: Vec<Hash>,
        // Combined mode keeps the whole input; empty in outboard mode.
        data: Vec<u8>,
    },
    Finalized {
        encoded: Vec<u8>,
        hash: Hash,
    },
}

impl Encoder {
    /// A streaming encoder producing the combined form.
    pub fn new() -> Self {
        Self::with_outboard(false)
    }

    /// A streaming encoder producing the outboard form.
    pub fn new_outboard() -> Self {
        Self::with_outboard(true)
    }

    fn with_outboard(outboard: bool) -> Self {
        Self {
            outboard,
            state: State::Open {
                pending: Vec::new(),
                cvs: Vec::new(),
                data: Vec::new(),
            },
        }
    }

    /// Append input bytes. Fails once the encoder has been finalized.
    pub fn write(&mut self, mut input: &[u8]) -> Result<()> {
        let State::Open { pending, cvs, data } = &mut self.state else {
            return Err(Error::AlreadyFinalized);
        };
        if !self.outboard {
            data.extend_from_slice(input);
        }
        while !input.is_empty() {
            if pending.len() == CHUNK_LEN {
                cvs.push(chunk_cv(pending, cvs.len() as u64, false));
                pending.clear();
            }
            let take = (CHUNK_LEN - pending.len()).min(input.len());
            pending.extend_from_slice(&input[..take]);
            input = &input[take..];
        }
        Ok(())
    }

    /// Finish the stream and return the encoding and root hash.
    ///
    /// Subsequent calls return the same result without recomputing it.
    pub fn finalize(&mut self) -> Result<(Vec<u8>, Hash)> {
        if let State::Finalized { encoded, hash } = &self.state {
            return Ok((encoded.clone(), *hash));
        }
        let state = mem::replace(
            &mut self.state,
            State::Finalized {
                encoded: Vec::new(),
                hash: Hash::new([0; 32]),
            },
        );
        let (encoded, hash) = match state {
            State::Finalized { encoded, hash } => (encoded, hash),
            State::Open { pending, mut cvs, data } => {
                let content_len = (cvs.len() * CHUNK_LEN + pending.len()) as u64;
                if cvs.is_empty() {
                    // A single (possibly empty) chunk is the whole tree.
                    let hash = chunk_cv(&pending, 0, true);
                    let mut encoded = Vec::with_capacity(HEADER_SIZE + pending.len());
                    encoded.extend_from_slice(&encode_len(content_len));
                    if !self.outboard {
                        encoded.extend_from_slice(&pending);
                    }
                    (encoded, hash)
                } else {
                    cvs.push(chunk_cv(&pending, cvs.len() as u64, false));
                    let total = HEADER_SIZE + encoded_size(content_len, self.outboard) as usize;
                    let mut out = vec![0u8; total];
                    out[..HEADER_SIZE].copy_from_slice(&encode_len(content_len));
                    let mut writer = CvTreeWriter {
                        out: &mut out,
                        pos: HEADER_SIZE,
                        data: (!self.outboard).then_some(data.as_slice()),
                        cvs: &cvs,
                    };
                    let hash = writer.subtree(0, cvs.len() as u64, true);
                    debug_assert_eq!(writer.pos, total);
                    (out, hash)
                }
            }
        };
        self.state = State::Finalized {
            encoded: encoded.clone(),
            hash,
        };
        Ok((encoded, hash))
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::io::Write for Encoder {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Encoder::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// Tree builder over an already-computed list of leaf CVs. Each interior
// node is computed exactly once.
struct CvTreeWriter<'a> {
    out: &'a mut [u8],
    pos: usize,
    data: Option<&'a [u8]>,
    cvs: &'a [Hash],
}

impl CvTreeWriter<'_> {
    fn subtree(&mut self, first_chunk: u64, count: u64, is_root: bool) -> Hash {
        if count == 1 {
            if let Some(data) = self.data {
                let start = first_chunk as usize * CHUNK_LEN;
                let end = data.len().min(start + CHUNK_LEN);
                self.out[self.pos..self.pos + (end - start)].copy_from_slice(&data[start..end]);
                self.pos += end - start;
            }
            return self.cvs[first_chunk as usize];
        }
        let node_at = self.pos;
        self.pos += PARENT_SIZE;
        let split = largest_power_of_two_leq(count - 1);
        let left = self.subtree(first_chunk, split, false);
        let right = self.subtree(first_chunk + split, count - split, false);
        self.out[node_at..node_at + 32].copy_from_slice(left.as_bytes());
        self.out[node_at + 32..node_at + PARENT_SIZE].copy_from_slice(right.as_bytes());
        parent_cv(&left, &right, is_root)
    }
}
