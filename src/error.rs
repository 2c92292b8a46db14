//! Error types for encoding, decoding and tracker operations.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by this crate.
///
/// Every variant is `Clone` so that a streaming decoder can latch the first
/// failure and return the same error from every subsequent call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The encoded input ended before the expected number of bytes.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// The 8-byte length header disagrees with the expected content length.
    #[error("length mismatch: header says {header}, expected {expected}")]
    LengthMismatch { header: u64, expected: u64 },

    /// A hash was constructed from a slice that is not exactly 32 bytes.
    #[error("invalid hash length: expected 32 bytes, got {0}")]
    InvalidHashLength(usize),

    /// Structurally invalid input that is not a plain truncation.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// A parent node failed verification against its expected chaining value.
    #[error("parent hash mismatch for subtree starting at chunk {0}")]
    ParentHashMismatch(u64),

    /// A chunk failed verification against its expected chaining value.
    #[error("chunk hash mismatch at chunk {0}")]
    LeafHashMismatch(u64),

    /// A chunk group failed verification against the root.
    #[error("group hash mismatch for group {index}")]
    GroupHashMismatch { index: u64 },

    /// Reassembled content does not hash to the expected root.
    #[error("root hash mismatch")]
    RootHashMismatch,

    /// An index was outside the valid range of the container.
    #[error("index out of bounds: {index} >= {len}")]
    IndexOutOfBounds { index: u64, len: u64 },

    /// A chunk group payload has the wrong size for its index.
    #[error("group size mismatch for group {index}: expected {expected}, got {actual}")]
    GroupSizeMismatch {
        index: u64,
        expected: u64,
        actual: u64,
    },

    /// A sibling-path proof does not have the depth the tree shape requires.
    #[error("invalid proof length: expected {expected} siblings, got {actual}")]
    ProofLength { expected: usize, actual: usize },

    /// The encoder was written to after its first finalize.
    #[error("encoder already finalized")]
    AlreadyFinalized,

    /// An operation that requires a fully received tracker was called early.
    #[error("operation requires a complete tracker")]
    Incomplete,

    /// A snapshot could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        let kind = match &e {
            Error::UnexpectedEof => std::io::ErrorKind::UnexpectedEof,
            Error::IndexOutOfBounds { .. }
            | Error::GroupSizeMismatch { .. }
            | Error::AlreadyFinalized
            | Error::Incomplete => std::io::ErrorKind::InvalidInput,
            _ => std::io::ErrorKind::InvalidData,
        };
        std::io::Error::new(kind, e)
    }
}
