//! Decoding: incremental verification of combined and outboard encodings
//! against a trusted root hash.
//!
//! The decoder never emits a byte it has not verified. It walks the tree
//! with an explicit stack of expected chaining values, popping a frame
//! whenever the corresponding parent node or chunk arrives and checks out.
//! The stack depth is bounded by the tree height, at most 64 frames for
//! any representable content length.

use bytes::{Bytes, BytesMut};
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::hash::{chunk_cv, parent_cv, Hash, CHUNK_LEN};
use crate::tree::{decode_len, left_len, HEADER_SIZE, PARENT_SIZE};

// One entry of the verification stack: the CV this subtree must hash to,
// its byte range within the content, and whether it is the tree root.
#[derive(Debug, Clone, Copy)]
struct Frame {
    cv: Hash,
    start: u64,
    len: u64,
    is_root: bool,
}

/// A streaming decoder.
///
/// Construct with the trusted root hash and expected content length, feed
/// encoded bytes with [`write`](Decoder::write), and drain verified
/// content with [`read`](Decoder::read). In outboard mode the encoded
/// stream carries only the header and parent nodes; the content itself is
/// supplied up front via [`set_content`](Decoder::set_content).
///
/// The first verification failure is latched: every subsequent call
/// returns the same error.
#[derive(Debug)]
pub struct Decoder {
    root: Hash,
    content_len: u64,
    outboard: bool,
    content: Option<Bytes>,
    input: BytesMut,
    output: BytesMut,
    stack: SmallVec<[Frame; 10]>,
    header_read: bool,
    counter: u64,
    emitted: u64,
    error: Option<Error>,
}

impl Decoder {
    /// A decoder for a combined encoding.
    pub fn new(root: Hash, content_len: u64) -> Self {
        Self::with_outboard(root, content_len, false)
    }

    /// A decoder for an outboard encoding. The content must be supplied
    /// with [`set_content`](Decoder::set_content) before any leaf is
    /// reached.
    pub fn new_outboard(root: Hash, content_len: u64) -> Self {
        Self::with_outboard(root, content_len, true)
    }

    fn with_outboard(root: Hash, content_len: u64, outboard: bool) -> Self {
        let mut stack = SmallVec::new();
        stack.push(Frame {
            cv: root,
            start: 0,
            len: content_len,
            is_root: true,
        });
        Self {
            root,
            content_len,
            outboard,
            content: None,
            input: BytesMut::new(),
            output: BytesMut::new(),
            stack,
            header_read: false,
            counter: 0,
            emitted: 0,
            error: None,
        }
    }

    /// The root hash this decoder verifies against.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Supply the separately-held content for outboard verification. Its
    /// length must equal the expected content length.
    pub fn set_content(&mut self, content: &[u8]) -> Result<()> {
        if !self.outboard {
            return Err(Error::Malformed(
                "content is only supplied separately in outboard mode".into(),
            ));
        }
        if content.len() as u64 != self.content_len {
            return Err(Error::LengthMismatch {
                header: content.len() as u64,
                expected: self.content_len,
            });
        }
        self.content = Some(Bytes::copy_from_slice(content));
        Ok(())
    }

    /// Append encoded bytes and verify as far as they allow.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        self.input.extend_from_slice(bytes);
        let result = self.process();
        if let Err(e) = &result {
            tracing::debug!(error = %e, "decoder entered failed state");
            self.error = Some(e.clone());
        }
        result
    }

    fn process(&mut self) -> Result<()> {
        if !self.header_read {
            if self.input.len() < HEADER_SIZE {
                return Ok(());
            }
            let mut header = [0u8; HEADER_SIZE];
            header.copy_from_slice(&self.input.split_to(HEADER_SIZE));
            let header = decode_len(&header);
            if header != self.content_len {
                return Err(Error::LengthMismatch {
                    header,
                    expected: self.content_len,
                });
            }
            self.header_read = true;
        }
        while let Some(frame) = self.stack.last().copied() {
            if frame.len <= CHUNK_LEN as u64 {
                let chunk = if self.outboard {
                    let content = self.content.as_ref().ok_or_else(|| {
                        Error::Malformed("outboard content not supplied".into())
                    })?;
                    content.slice(frame.start as usize..(frame.start + frame.len) as usize)
                } else {
                    if (self.input.len() as u64) < frame.len {
                        return Ok(());
                    }
                    self.input.split_to(frame.len as usize).freeze()
                };
                let actual = chunk_cv(&chunk, self.counter, frame.is_root);
                if actual != frame.cv {
                    return Err(Error::LeafHashMismatch(self.counter));
                }
                self.output.extend_from_slice(&chunk);
                self.emitted += frame.len;
                self.counter += 1;
                self.stack.pop();
            } else {
                if self.input.len() < PARENT_SIZE {
                    return Ok(());
                }
                let node = self.input.split_to(PARENT_SIZE);
                let left = Hash::new(<[u8; 32]>::try_from(&node[..32]).unwrap());
                let right = Hash::new(<[u8; 32]>::try_from(&node[32..]).unwrap());
                let actual = parent_cv(&left, &right, frame.is_root);
                if actual != frame.cv {
                    return Err(Error::ParentHashMismatch(frame.start / CHUNK_LEN as u64));
                }
                self.stack.pop();
                let split = left_len(frame.len);
                // Push the right child first so the left is processed next,
                // matching the pre-order layout.
                self.stack.push(Frame {
                    cv: right,
                    start: frame.start + split,
                    len: frame.len - split,
                    is_root: false,
                });
                self.stack.push(Frame {
                    cv: left,
                    start: frame.start,
                    len: split,
                    is_root: false,
                });
            }
        }
        if !self.input.is_empty() {
            return Err(Error::Malformed("trailing data after encoding".into()));
        }
        Ok(())
    }

    /// Copy verified content into `buf`, returning the number of bytes
    /// copied. Returns 0 when no verified bytes are currently available.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        let n = self.output.len().min(buf.len());
        buf[..n].copy_from_slice(&self.output.split_to(n));
        Ok(n)
    }

    /// True once the whole tree has been verified and all content emitted.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
            && self.header_read
            && self.stack.is_empty()
            && self.emitted == self.content_len
    }

    /// Assert that decoding ran to completion.
    pub fn finalize(&self) -> Result<()> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        if !self.is_complete() {
            return Err(Error::UnexpectedEof);
        }
        Ok(())
    }
}

/// A reader that pulls a combined encoding from an inner reader and yields
/// only verified content.
///
/// Verification happens chunk by chunk as the encoding is consumed, so a
/// corrupt or truncated stream fails before any unverified byte is
/// returned.
#[derive(Debug)]
pub struct Reader<R> {
    inner: R,
    decoder: Decoder,
}

impl<R: std::io::Read> Reader<R> {
    /// Wrap `inner`, which must produce a combined encoding of
    /// `content_len` bytes hashing to `root`.
    pub fn new(inner: R, root: Hash, content_len: u64) -> Self {
        Self {
            inner,
            decoder: Decoder::new(root, content_len),
        }
    }
}

impl<R: std::io::Read> std::io::Read for Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let n = self.decoder.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            if self.decoder.is_complete() {
                return Ok(0);
            }
            let mut chunk = [0u8; 4096];
            let got = self.inner.read(&mut chunk)?;
            if got == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "encoded stream ended early",
                ));
            }
            self.decoder.write(&chunk[..got])?;
        }
    }
}

/// Decode a combined encoding in one call, returning the verified content.
///
/// The content length is taken from the encoding's header; the tree
/// verification against `root` is what makes it trustworthy.
pub fn decode(encoded: &[u8], root: &Hash) -> Result<Vec<u8>> {
    if encoded.len() < HEADER_SIZE {
        return Err(Error::UnexpectedEof);
    }
    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&encoded[..HEADER_SIZE]);
    let content_len = decode_len(&header);
    let mut decoder = Decoder::new(*root, content_len);
    decoder.write(encoded)?;
    decoder.finalize()?;
    let mut out = vec![0u8; content_len as usize];
    let n = decoder.read(&mut out)?;
    debug_assert_eq!(n as u64, content_len);
    Ok(out)
}

/// Verify `content` against an outboard encoding and a trusted root.
pub fn verify_outboard(outboard: &[u8], content: &[u8], root: &Hash) -> Result<()> {
    let mut decoder = Decoder::new_outboard(*root, content.len() as u64);
    decoder.set_content(content)?;
    decoder.write(outboard)?;
    decoder.finalize()
}
