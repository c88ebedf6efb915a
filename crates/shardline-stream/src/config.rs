//! Writer and reader configuration.

use crate::error::StreamError;

/// Default chunk size: 10 MB.
pub const DEFAULT_CHUNK_SIZE: usize = 10_000_000;

/// Largest chunk size a writer accepts.
pub const MAX_CHUNK_SIZE: usize = 256 * 1024 * 1024;

/// Largest encoded frame a decoder accepts by default.
///
/// A shard is never larger than its chunk (plus alignment padding), so this
/// leaves room for the frame header on top of [`MAX_CHUNK_SIZE`].
pub const MAX_FRAME_SIZE: usize = MAX_CHUNK_SIZE + 64 * 1024;

/// Default number of stale frames a lane may skip in one pull.
pub const DEFAULT_MAX_STALE_FRAMES: usize = 16;

/// Configuration for a [`ShardWriter`](crate::ShardWriter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterConfig {
    /// Bytes per chunk. Every chunk but the last is exactly this long.
    pub chunk_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl WriterConfig {
    /// Config with the given chunk size.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    pub(crate) fn validate(&self) -> Result<(), StreamError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(StreamError::InvalidChunkSize {
                size: self.chunk_size,
                max: MAX_CHUNK_SIZE,
            });
        }
        Ok(())
    }
}

/// Configuration for a [`ShardReader`](crate::ShardReader).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Stale frames (older than the expected generation) a lane may skip
    /// during one pull before it is dropped as desynchronized.
    pub max_stale_frames: usize,
    /// Largest encoded frame accepted from an input.
    pub max_frame_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_stale_frames: DEFAULT_MAX_STALE_FRAMES,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}
