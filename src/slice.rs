//! Slices: minimal encoded fragments that prove a contiguous byte range
//! of the content against the root hash.
//!
//! A slice is always in combined format: the header, then only the parent
//! nodes and chunks of subtrees that overlap the requested range, in
//! pre-order. Subtrees outside the range are absent entirely; the decoder
//! walks the same tree with the same range and therefore knows exactly
//! which bytes to expect.

use crate::error::{Error, Result};
use crate::hash::{chunk_cv, parent_cv, Hash, CHUNK_LEN};
use crate::tree::{count_chunks, decode_len, encoded_size, left_len, HEADER_SIZE, PARENT_SIZE};

// Normalize a requested range against the content length. Zero-length
// requests are widened to one byte, and a start past the end is pulled
// back onto the final byte so the rightmost tree path always stays
// provable.
fn normalize(content_len: u64, start: u64, len: u64) -> (u64, u64) {
    let len = len.max(1);
    if start >= content_len {
        let start = content_len.saturating_sub(1);
        (start, start + 1)
    } else {
        (start, start.saturating_add(len))
    }
}

/// Extract a slice covering `len` bytes from `start` out of a combined
/// encoding.
pub fn extract_slice(encoded: &[u8], start: u64, len: u64) -> Result<Vec<u8>> {
    extract_inner(encoded, None, start, len)
}

/// Extract a slice out of an outboard encoding plus the separately-held
/// content. The output is the same combined-format slice that
/// [`extract_slice`] produces.
pub fn extract_slice_outboard(
    outboard: &[u8],
    content: &[u8],
    start: u64,
    len: u64,
) -> Result<Vec<u8>> {
    extract_inner(outboard, Some(content), start, len)
}

fn extract_inner(encoded: &[u8], content: Option<&[u8]>, start: u64, len: u64) -> Result<Vec<u8>> {
    if encoded.len() < HEADER_SIZE {
        return Err(Error::UnexpectedEof);
    }
    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&encoded[..HEADER_SIZE]);
    let content_len = decode_len(&header);
    let expected = HEADER_SIZE as u64 + encoded_size(content_len, content.is_some());
    if encoded.len() as u64 != expected {
        return Err(Error::Malformed(format!(
            "encoding is {} bytes, expected {expected}",
            encoded.len()
        )));
    }
    if let Some(content) = content {
        if content.len() as u64 != content_len {
            return Err(Error::LengthMismatch {
                header: content_len,
                expected: content.len() as u64,
            });
        }
    }
    let mut out = Vec::with_capacity(HEADER_SIZE);
    out.extend_from_slice(&header);
    if content_len == 0 {
        // The empty tree is a single zero-byte chunk; the header is the
        // whole slice.
        return Ok(out);
    }
    let (start, end) = normalize(content_len, start, len);
    let mut extractor = Extractor {
        tree: &encoded[HEADER_SIZE..],
        pos: 0,
        content,
        start,
        end,
        out,
    };
    extractor.subtree(0, content_len)?;
    Ok(extractor.out)
}

struct Extractor<'a> {
    // Encoded bytes past the header, with a read cursor.
    tree: &'a [u8],
    pos: usize,
    // Separately-held content in outboard mode.
    content: Option<&'a [u8]>,
    start: u64,
    end: u64,
    out: Vec<u8>,
}

impl Extractor<'_> {
    // Serialized size of a subtree in the source: its parent nodes, plus
    // its chunk bytes when the source is combined.
    fn source_len(&self, len: u64) -> u64 {
        let parents = (count_chunks(len) - 1) * PARENT_SIZE as u64;
        if self.content.is_some() {
            parents
        } else {
            parents + len
        }
    }

    fn subtree(&mut self, subtree_start: u64, subtree_len: u64) -> Result<()> {
        if subtree_start + subtree_len <= self.start {
            // Entirely before the slice: skip its serialized form.
            let skip = self.source_len(subtree_len) as usize;
            if self.tree.len() - self.pos < skip {
                return Err(Error::UnexpectedEof);
            }
            self.pos += skip;
            return Ok(());
        }
        if self.end <= subtree_start {
            // Entirely after the slice: everything from here on is, too.
            return Ok(());
        }
        if subtree_len <= CHUNK_LEN as u64 {
            let n = subtree_len as usize;
            match self.content {
                Some(content) => {
                    let s = subtree_start as usize;
                    self.out.extend_from_slice(&content[s..s + n]);
                }
                None => {
                    if self.tree.len() - self.pos < n {
                        return Err(Error::UnexpectedEof);
                    }
                    self.out.extend_from_slice(&self.tree[self.pos..self.pos + n]);
                    self.pos += n;
                }
            }
            return Ok(());
        }
        if self.tree.len() - self.pos < PARENT_SIZE {
            return Err(Error::UnexpectedEof);
        }
        self.out
            .extend_from_slice(&self.tree[self.pos..self.pos + PARENT_SIZE]);
        self.pos += PARENT_SIZE;
        let split = left_len(subtree_len);
        self.subtree(subtree_start, split)?;
        self.subtree(subtree_start + split, subtree_len - split)
    }
}

/// Verify a slice against the root hash and return the bytes of the
/// requested range.
///
/// The same range normalization as extraction applies, so extractor and
/// decoder walk identical trees. A request of `len == 0` verifies the
/// covering chunk but yields no bytes.
pub fn decode_slice(slice: &[u8], root: &Hash, start: u64, len: u64) -> Result<Vec<u8>> {
    if slice.len() < HEADER_SIZE {
        return Err(Error::UnexpectedEof);
    }
    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&slice[..HEADER_SIZE]);
    let content_len = decode_len(&header);
    if content_len == 0 {
        if slice.len() != HEADER_SIZE {
            return Err(Error::Malformed("trailing data in slice".into()));
        }
        if chunk_cv(&[], 0, true) != *root {
            return Err(Error::LeafHashMismatch(0));
        }
        return Ok(Vec::new());
    }
    let (nstart, nend) = normalize(content_len, start, len);
    let mut decoder = SliceDecoder {
        slice: &slice[HEADER_SIZE..],
        pos: 0,
        start: nstart,
        end: nend,
        out: Vec::new(),
    };
    decoder.subtree(0, content_len, root, true)?;
    if decoder.pos != slice.len() - HEADER_SIZE {
        return Err(Error::Malformed("trailing data in slice".into()));
    }
    let mut out = decoder.out;
    if len == 0 {
        out.clear();
    }
    Ok(out)
}

struct SliceDecoder<'a> {
    slice: &'a [u8],
    pos: usize,
    start: u64,
    end: u64,
    out: Vec<u8>,
}

impl<'a> SliceDecoder<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.slice.len() - self.pos < n {
            return Err(Error::UnexpectedEof);
        }
        let bytes = &self.slice[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn subtree(
        &mut self,
        subtree_start: u64,
        subtree_len: u64,
        expected: &Hash,
        is_root: bool,
    ) -> Result<()> {
        if subtree_start + subtree_len <= self.start || self.end <= subtree_start {
            // Not in the slice; nothing to consume.
            return Ok(());
        }
        let chunk_index = subtree_start / CHUNK_LEN as u64;
        if subtree_len <= CHUNK_LEN as u64 {
            let bytes = self.take(subtree_len as usize)?;
            if chunk_cv(bytes, chunk_index, is_root) != *expected {
                return Err(Error::LeafHashMismatch(chunk_index));
            }
            let lo = self.start.max(subtree_start);
            let hi = self.end.min(subtree_start + subtree_len);
            if lo < hi {
                self.out.extend_from_slice(
                    &bytes[(lo - subtree_start) as usize..(hi - subtree_start) as usize],
                );
            }
            return Ok(());
        }
        let node = self.take(PARENT_SIZE)?;
        let left = Hash::new(<[u8; 32]>::try_from(&node[..32]).unwrap());
        let right = Hash::new(<[u8; 32]>::try_from(&node[32..]).unwrap());
        if parent_cv(&left, &right, is_root) != *expected {
            return Err(Error::ParentHashMismatch(chunk_index));
        }
        let split = left_len(subtree_len);
        self.subtree(subtree_start, split, &left, false)?;
        self.subtree(subtree_start + split, subtree_len - split, &right, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{encode, outboard};
    use crate::tests::test_data;

    #[test]
    fn slice_round_trip() {
        let data = test_data(10240);
        let (encoded, root) = encode(&data);
        let slice = extract_slice(&encoded, 1024, 1024).unwrap();
        assert!(slice.len() < encoded.len());
        let out = decode_slice(&slice, &root, 1024, 1024).unwrap();
        assert_eq!(out, &data[1024..2048]);
    }

    #[test]
    fn outboard_slice_matches_combined_slice() {
        let data = test_data(10240 + 77);
        let (encoded, root) = encode(&data);
        let (ob, ob_root) = outboard(&data);
        assert_eq!(root, ob_root);
        for (start, len) in [(0, 1), (1000, 3000), (9000, 5000), (10240, 10)] {
            let a = extract_slice(&encoded, start, len).unwrap();
            let b = extract_slice_outboard(&ob, &data, start, len).unwrap();
            assert_eq!(a, b, "start {start} len {len}");
        }
    }

    #[test]
    fn unaligned_ranges_round_trip() {
        let data = test_data(100 * 1024);
        let (encoded, root) = encode(&data);
        for (start, len) in [
            (0u64, 1u64),
            (1, 1),
            (1023, 2),
            (1024, 1024),
            (3000, 5000),
            (50_000, 100),
            (102_399, 1),
            (0, 200_000),
        ] {
            let slice = extract_slice(&encoded, start, len).unwrap();
            let out = decode_slice(&slice, &root, start, len).unwrap();
            let lo = (start as usize).min(data.len());
            let hi = (start as usize).saturating_add(len as usize).min(data.len());
            assert_eq!(out, &data[lo..hi], "start {start} len {len}");
        }
    }

    #[test]
    fn middle_slice_is_small() {
        // 100 chunks, 100 bytes from the middle: the slice must be well
        // under a tenth of the full encoding.
        let data = test_data(102_400);
        let (encoded, root) = encode(&data);
        let slice = extract_slice(&encoded, 50_000, 100).unwrap();
        assert!(slice.len() * 10 <= encoded.len(), "slice {}", slice.len());
        let out = decode_slice(&slice, &root, 50_000, 100).unwrap();
        assert_eq!(out, &data[50_000..50_100]);
    }

    #[test]
    fn full_range_slice_is_the_whole_encoding() {
        let data = test_data(7 * 1024 + 5);
        let (encoded, root) = encode(&data);
        let slice = extract_slice(&encoded, 0, data.len() as u64).unwrap();
        assert_eq!(slice, encoded);
        let out = decode_slice(&slice, &root, 0, data.len() as u64).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn zero_len_verifies_but_yields_nothing() {
        let data = test_data(4096);
        let (encoded, root) = encode(&data);
        let slice = extract_slice(&encoded, 2048, 0).unwrap();
        // Same slice as a one-byte request at the same offset.
        assert_eq!(slice, extract_slice(&encoded, 2048, 1).unwrap());
        let out = decode_slice(&slice, &root, 2048, 0).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn past_the_end_clamps_to_the_final_chunk() {
        let data = test_data(4096);
        let (encoded, root) = encode(&data);
        let slice = extract_slice(&encoded, 100_000, 5).unwrap();
        let out = decode_slice(&slice, &root, 100_000, 5).unwrap();
        assert_eq!(out, &data[4095..]);
    }

    #[test]
    fn empty_content_slice_is_the_header() {
        let (encoded, root) = encode(&[]);
        let slice = extract_slice(&encoded, 0, 10).unwrap();
        assert_eq!(slice, encoded);
        assert_eq!(decode_slice(&slice, &root, 0, 10).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn corrupted_slice_fails() {
        let data = test_data(10240);
        let (encoded, root) = encode(&data);
        let slice = extract_slice(&encoded, 1024, 2048).unwrap();
        for i in 8..slice.len() {
            let mut bad = slice.clone();
            bad[i] ^= 1;
            assert!(
                decode_slice(&bad, &root, 1024, 2048).is_err(),
                "byte {i} flip went undetected"
            );
        }
    }

    #[test]
    fn truncated_and_padded_slices_fail() {
        let data = test_data(10240);
        let (encoded, root) = encode(&data);
        let slice = extract_slice(&encoded, 0, 3000).unwrap();
        assert!(decode_slice(&slice[..slice.len() - 1], &root, 0, 3000).is_err());
        let mut padded = slice.clone();
        padded.push(0);
        assert_eq!(
            decode_slice(&padded, &root, 0, 3000),
            Err(Error::Malformed("trailing data in slice".into()))
        );
    }

    #[test]
    fn wrong_range_on_decode_fails() {
        // Decoding with a different range than the slice was built for
        // walks a different tree and must error rather than mis-verify.
        let data = test_data(10240);
        let (encoded, root) = encode(&data);
        let slice = extract_slice(&encoded, 0, 1024).unwrap();
        assert!(decode_slice(&slice, &root, 9000, 1024).is_err());
    }
}
