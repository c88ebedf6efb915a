//! Error types for the frame codec and the shard writer/reader.

use shardline_erasure::ErasureError;

/// Errors produced while encoding or decoding a single frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The underlying conduit failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Postcard serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The declared frame length exceeds the configured maximum.
    #[error("frame too large: {len} bytes (max {max})")]
    TooLarge {
        /// Declared or encoded frame length.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },

    /// The conduit ended in the middle of a frame.
    #[error("truncated frame")]
    Truncated,
}

/// Errors surfaced by [`ShardWriter`](crate::ShardWriter) and
/// [`ShardReader`](crate::ShardReader).
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The code rejected a chunk. No frame of this generation was sent.
    #[error("encode failed for generation {generation}: {source}")]
    Encode {
        /// Generation of the rejected chunk.
        generation: u64,
        /// Error reported by the code.
        #[source]
        source: ErasureError,
    },

    /// The code returned a different number of shards than it declares.
    #[error("code produced {got} shards, expected {expected}")]
    ShardCountMismatch {
        /// `Code::shards()`.
        expected: usize,
        /// Shards actually produced.
        got: usize,
    },

    /// The code could not reconstruct a chunk from the shards that survived.
    #[error("decode failed for generation {generation} ({valid} of {total} shards valid; {summary}): {source}")]
    Decode {
        /// Generation that failed.
        generation: u64,
        /// Shards that passed validation.
        valid: usize,
        /// Total shard count of the code.
        total: usize,
        /// Per-lane description of what was missing.
        summary: String,
        /// Error reported by the code.
        #[source]
        source: ErasureError,
    },

    /// The code returned fewer bytes than the frames declared.
    #[error("decoded chunk for generation {generation} is {got} bytes, frames declare {expected}")]
    ShortChunk {
        /// Generation of the chunk.
        generation: u64,
        /// Chunk size declared by the frames.
        expected: usize,
        /// Bytes returned by the code.
        got: usize,
    },

    /// A frame could not be encoded.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The consumer of an output conduit dropped its end.
    #[error("conduit for shard {member} was closed by its consumer")]
    ConduitClosed {
        /// Member index of the conduit.
        member: usize,
    },

    /// More inputs were supplied than the code has shards.
    #[error("too many shard inputs: code has {shards} shards, got {got}")]
    TooManyConduits {
        /// `Code::shards()`.
        shards: usize,
        /// Inputs supplied.
        got: usize,
    },

    /// The configured chunk size is out of range.
    #[error("invalid chunk size {size} (must be between 1 and {max})")]
    InvalidChunkSize {
        /// Requested chunk size.
        size: usize,
        /// Largest accepted chunk size.
        max: usize,
    },

    /// The reader already surfaced a fatal error.
    #[error("stream terminated after an earlier failure")]
    Terminated,

    /// Reading the caller's source or writing the caller's sink failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StreamError> for std::io::Error {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::Io(e) => e,
            other => std::io::Error::other(other),
        }
    }
}
