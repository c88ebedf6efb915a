//! Pluggable erasure codes for shardline.
//!
//! This crate provides:
//! - [`Code`]: the encode/decode/shards contract the stream layer is
//!   written against.
//! - [`ReedSolomonCode`]: `k` data shards plus `m` parity shards on top of
//!   `reed-solomon-simd`, tolerating the loss of any `m`.
//! - [`NullCode`]: a plain split with no redundancy.
//! - [`build_code`] and [`suggest_config`]: parameter selection helpers.

mod config;
mod decoder;
mod encoder;
mod error;
mod null;

use bytes::Bytes;

pub use config::{build_code, suggest_config};
pub use encoder::ReedSolomonCode;
pub use error::ErasureError;
pub use null::NullCode;

/// An erasure code.
///
/// Implementations hold no per-call state: the same chunk always encodes to
/// the same shards, and [`Code::shards`] never changes over the code's
/// lifetime.
pub trait Code: Send + Sync {
    /// Total number of shards (data + parity) produced per chunk.
    fn shards(&self) -> usize;

    /// Encode a chunk into exactly [`Code::shards`] shards of one uniform
    /// (possibly padded) length.
    ///
    /// An empty chunk encodes to empty shards.
    fn encode(&self, chunk: &[u8]) -> Result<Vec<Bytes>, ErasureError>;

    /// Reassemble a chunk from an index-addressed shard array, `None` marking
    /// absent shards.
    ///
    /// The result may carry trailing padding; callers truncate it to the
    /// original chunk size. Fails rather than return data it can tell is
    /// corrupt.
    fn decode(&self, shards: Vec<Option<Bytes>>) -> Result<Vec<u8>, ErasureError>;
}
