//! Shared test harness for shardline integration tests.
//!
//! Splits data into in-memory shard conduits with a real [`ShardWriter`],
//! damages them the way a lost disk or a flipped bit would, and reassembles
//! them with a [`ShardReader`].

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use shardline_erasure::Code;
use shardline_stream::{
    Frame, FrameDecoder, ReaderConfig, ShardReader, ShardWriter, StreamError, WriterConfig,
    encode_frame,
};
use tokio::io::AsyncReadExt;

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    test_data_seeded(size, 0xDEAD_BEEF)
}

/// Like [`test_data`] but with a caller-chosen seed.
pub fn test_data_seeded(size: usize, seed: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = seed;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// BLAKE3 digest of `data`, for comparing large streams.
pub fn digest(data: &[u8]) -> blake3::Hash {
    blake3::hash(data)
}

/// The shard conduits of one written stream, indexed by member. `None`
/// marks a lost shard.
pub struct ShardSet {
    pub shards: Vec<Option<Vec<u8>>>,
}

impl ShardSet {
    /// Write `data` through a [`ShardWriter`] and keep every conduit.
    pub async fn split(code: Arc<dyn Code>, chunk_size: usize, data: &[u8]) -> Self {
        let mut writer =
            ShardWriter::new(code, WriterConfig::with_chunk_size(chunk_size)).unwrap();
        let drains: Vec<_> = writer
            .readers()
            .into_iter()
            .map(|mut stream| {
                tokio::spawn(async move {
                    let mut out = Vec::new();
                    stream.read_to_end(&mut out).await.unwrap();
                    out
                })
            })
            .collect();

        writer.write_all(data).await.unwrap();
        writer.close().await.unwrap();

        let mut shards = Vec::with_capacity(drains.len());
        for drain in drains {
            shards.push(Some(drain.await.unwrap()));
        }
        Self { shards }
    }

    /// Lose the given shards entirely.
    pub fn kill(&mut self, members: &[usize]) {
        for &m in members {
            self.shards[m] = None;
        }
    }

    /// Flip a payload byte in every frame of the given shards.
    pub async fn corrupt(&mut self, members: &[usize]) {
        for &m in members {
            if let Some(wire) = self.shards[m].take() {
                self.shards[m] = Some(corrupt_stream(&wire).await);
            }
        }
    }

    /// Reassemble the stream.
    pub async fn join(&self, code: Arc<dyn Code>) -> Result<Vec<u8>, StreamError> {
        let inputs = self
            .shards
            .iter()
            .map(|s| s.clone().map(Cursor::new))
            .collect();
        let mut reader = ShardReader::new(code, inputs, ReaderConfig::default())?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await?;
        Ok(out)
    }
}

/// Decode every frame of one conduit.
pub async fn frames_of(wire: &[u8]) -> Vec<Frame> {
    let mut decoder = FrameDecoder::new(Cursor::new(wire.to_vec()));
    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_frame().await.unwrap() {
        frames.push(frame);
    }
    frames
}

/// Increment the first payload byte of every non-empty frame, keeping the
/// original checksum.
pub async fn corrupt_stream(wire: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(wire.len());
    for mut frame in frames_of(wire).await {
        if !frame.payload.is_empty() {
            let mut payload = frame.payload.to_vec();
            payload[0] = payload[0].wrapping_add(1);
            frame.payload = Bytes::from(payload);
        }
        out.extend_from_slice(&encode_frame(&frame).unwrap());
    }
    out
}
