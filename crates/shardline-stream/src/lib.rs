//! Streaming erasure-coded framing.
//!
//! A [`ShardWriter`] cuts a byte stream into fixed-size chunks, encodes each
//! chunk with a [`Code`](shardline_erasure::Code) and writes one checksummed
//! [`Frame`] per shard to N single-slot conduits. A [`ShardReader`] pulls one
//! frame per conduit per generation, masks shards that are absent or fail
//! their checksum, decodes, and serves the original bytes.
//!
//! Each pull is summarized in a [`PullReport`] with one [`ShardStatus`] per
//! input.
//!
//! [`ShardWriter::into_sink`] and [`ShardReader::into_async_read`] adapt
//! both ends to `AsyncWrite` / `AsyncRead`, so they compose with
//! `tokio::io::copy`.

mod conduit;
pub mod config;
mod error;
pub mod frame;
mod reader;
mod status;
mod writer;

pub use conduit::ShardStream;
pub use config::{ReaderConfig, WriterConfig};
pub use error::{FrameError, StreamError};
pub use frame::{Checksum, Frame, FrameDecoder, encode_frame, write_frame};
pub use reader::{DecodedStream, ShardReader};
pub use status::{PullReport, ShardStatus};
pub use writer::{ShardSink, ShardWriter};
