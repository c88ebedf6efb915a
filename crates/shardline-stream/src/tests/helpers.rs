//! Shared test utilities for shardline-stream tests.

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use shardline_erasure::{Code, ErasureError, NullCode, ReedSolomonCode};
use tokio::io::AsyncReadExt;

use crate::config::{ReaderConfig, WriterConfig};
use crate::error::StreamError;
use crate::frame::{Frame, FrameDecoder, encode_frame};
use crate::reader::ShardReader;
use crate::writer::ShardWriter;

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = 0xDEAD_BEEF;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

pub fn rs(k: usize, m: usize) -> Arc<dyn Code> {
    Arc::new(ReedSolomonCode::new(k, m).unwrap())
}

pub fn null(n: usize) -> Arc<dyn Code> {
    Arc::new(NullCode::new(n).unwrap())
}

/// Write `data` through a writer and collect every conduit in memory.
pub async fn split(code: Arc<dyn Code>, chunk_size: usize, data: &[u8]) -> Vec<Vec<u8>> {
    let mut writer = ShardWriter::new(code, WriterConfig::with_chunk_size(chunk_size)).unwrap();
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
        shards.push(drain.await.unwrap());
    }
    shards
}

/// Build a reader over in-memory conduits.
pub fn reader(
    code: Arc<dyn Code>,
    inputs: Vec<Option<Vec<u8>>>,
    config: ReaderConfig,
) -> ShardReader<Cursor<Vec<u8>>> {
    ShardReader::new(code, inputs.into_iter().map(|i| i.map(Cursor::new)).collect(), config)
        .unwrap()
}

/// Reassemble in-memory conduits with the default reader config.
pub async fn join(
    code: Arc<dyn Code>,
    inputs: Vec<Option<Vec<u8>>>,
) -> Result<Vec<u8>, StreamError> {
    let mut reader = reader(code, inputs, ReaderConfig::default());
    let mut out = Vec::new();
    reader.read_to_end(&mut out).await?;
    Ok(out)
}

/// Decode every frame of a conduit.
pub async fn frames_of(wire: &[u8]) -> Vec<Frame> {
    let mut decoder = FrameDecoder::new(Cursor::new(wire.to_vec()));
    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_frame().await.unwrap() {
        frames.push(frame);
    }
    frames
}

/// Concatenate the wire form of `frames`.
pub fn wire(frames: &[Frame]) -> Vec<u8> {
    frames
        .iter()
        .flat_map(|f| encode_frame(f).unwrap().to_vec())
        .collect()
}

/// Flip the first payload byte of every non-empty frame in a conduit,
/// leaving the stored checksum alone.
pub async fn corrupt(wire_bytes: &[u8]) -> Vec<u8> {
    let frames: Vec<Frame> = frames_of(wire_bytes)
        .await
        .into_iter()
        .map(|mut frame| {
            if !frame.payload.is_empty() {
                let mut payload = frame.payload.to_vec();
                payload[0] = payload[0].wrapping_add(1);
                frame.payload = Bytes::from(payload);
            }
            frame
        })
        .collect();
    wire(&frames)
}

/// Frames of one chunk, one per member, as the writer would build them.
pub fn chunk_frames(code: &dyn Code, generation: u64, chunk: &[u8]) -> Vec<Frame> {
    code.encode(chunk)
        .unwrap()
        .into_iter()
        .enumerate()
        .map(|(member, payload)| Frame::new(generation, member as u32, payload, chunk.len() as u64))
        .collect()
}

/// Per-member conduits for a whole stream of `chunks`, including the
/// empty end-of-stream frame set.
pub fn stream_frames(code: &dyn Code, chunks: &[&[u8]]) -> Vec<Vec<Frame>> {
    let mut lanes = vec![Vec::new(); code.shards()];
    let sentinel: &[u8] = &[];
    for (generation, chunk) in chunks.iter().chain(std::iter::once(&sentinel)).enumerate() {
        for (member, frame) in chunk_frames(code, generation as u64, chunk)
            .into_iter()
            .enumerate()
        {
            lanes[member].push(frame);
        }
    }
    lanes
}

/// A plain split that refuses to encode chunks starting with `0xFF`.
pub struct PickyCode {
    inner: NullCode,
}

impl PickyCode {
    pub fn new(n: usize) -> Self {
        Self {
            inner: NullCode::new(n).unwrap(),
        }
    }
}

impl Code for PickyCode {
    fn shards(&self) -> usize {
        self.inner.shards()
    }

    fn encode(&self, chunk: &[u8]) -> Result<Vec<Bytes>, ErasureError> {
        if chunk.first() == Some(&0xFF) {
            return Err(ErasureError::InvalidConfig("poisoned chunk".into()));
        }
        self.inner.encode(chunk)
    }

    fn decode(&self, shards: Vec<Option<Bytes>>) -> Result<Vec<u8>, ErasureError> {
        self.inner.decode(shards)
    }
}
