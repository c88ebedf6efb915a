//! [`ShardReader`]: pulls one frame per input per generation, masks bad
//! shards, decodes, and serves the reassembled byte stream.

use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use shardline_erasure::Code;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::config::ReaderConfig;
use crate::error::StreamError;
use crate::frame::{Frame, FrameDecoder};
use crate::status::{PullReport, ShardStatus};

/// Status of a lane whose task never reported back.
const LOST_TASK: &str = "lane task did not complete";

/// One input conduit.
struct Lane<R> {
    /// `None` once the input ended, failed, or was never supplied.
    decoder: Option<FrameDecoder<R>>,
    /// A frame from a later generation, held until the reader catches up.
    parked: Option<Frame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Streaming,
    Finished,
    Failed,
}

/// What one lane task found.
enum LaneRead {
    /// A frame of the expected generation, with its checksum verdict.
    Frame { frame: Frame, intact: bool },
    /// The next frame belongs to a later generation and is now parked.
    Ahead { found: u64 },
    /// Clean end of input.
    Exhausted,
    /// The input failed; the lane is dropped.
    Failed(String),
}

/// Result handed back by a lane task, returning ownership of the lane.
struct LaneOutcome<R> {
    index: usize,
    decoder: Option<FrameDecoder<R>>,
    parked: Option<Frame>,
    read: LaneRead,
}

/// Reassembles a byte stream from the shard conduits of a
/// [`ShardWriter`](crate::ShardWriter).
///
/// The code must be configured exactly like the writer's. Inputs are given
/// in member order; a missing input is tolerated like any other lost shard.
pub struct ShardReader<R> {
    code: Arc<dyn Code>,
    config: ReaderConfig,
    lanes: Vec<Lane<R>>,
    /// Generation of the next chunk to decode.
    generation: u64,
    /// Decoded bytes not yet handed to the caller.
    buf: Bytes,
    state: State,
    last_report: Option<PullReport>,
}

impl<R> ShardReader<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    /// Create a reader over `inputs`, indexed by member.
    ///
    /// A `None` entry is a shard known to be absent. Fewer inputs than the
    /// code has shards are padded with absent ones.
    pub fn new(
        code: Arc<dyn Code>,
        inputs: Vec<Option<R>>,
        config: ReaderConfig,
    ) -> Result<Self, StreamError> {
        let shards = code.shards();
        if inputs.len() > shards {
            return Err(StreamError::TooManyConduits {
                shards,
                got: inputs.len(),
            });
        }

        let mut lanes: Vec<Lane<R>> = inputs
            .into_iter()
            .map(|input| Lane {
                decoder: input
                    .map(|r| FrameDecoder::with_max_frame_size(r, config.max_frame_size)),
                parked: None,
            })
            .collect();
        lanes.resize_with(shards, || Lane {
            decoder: None,
            parked: None,
        });

        Ok(Self {
            code,
            config,
            lanes,
            generation: 0,
            buf: Bytes::new(),
            state: State::Streaming,
            last_report: None,
        })
    }

    /// Create a reader where every input is present, in member order.
    pub fn from_streams<I>(code: Arc<dyn Code>, streams: I) -> Result<Self, StreamError>
    where
        I: IntoIterator<Item = R>,
    {
        let inputs = streams.into_iter().map(Some).collect();
        Self::new(code, inputs, ReaderConfig::default())
    }

    /// Generation of the next chunk to decode (the number decoded so far).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Per-lane statuses of the most recent pull.
    pub fn last_report(&self) -> Option<&PullReport> {
        self.last_report.as_ref()
    }

    /// Read decoded bytes into `buf`. Returns `Ok(0)` at end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        if buf.is_empty() || !self.fill().await? {
            return Ok(0);
        }
        let n = buf.len().min(self.buf.len());
        buf[..n].copy_from_slice(&self.buf.split_to(n));
        Ok(n)
    }

    /// Return the rest of the current decoded chunk, decoding the next one
    /// if needed. `None` at end of stream.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, StreamError> {
        if !self.fill().await? {
            return Ok(None);
        }
        Ok(Some(std::mem::take(&mut self.buf)))
    }

    /// Read the whole stream into `out`. Returns the bytes appended.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize, StreamError> {
        let mut total = 0;
        while let Some(chunk) = self.next_chunk().await? {
            out.extend_from_slice(&chunk);
            total += chunk.len();
        }
        Ok(total)
    }

    /// Copy the whole stream to `writer`. Returns the bytes copied.
    pub async fn copy_to<W>(&mut self, writer: &mut W) -> Result<u64, StreamError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut total = 0u64;
        while let Some(chunk) = self.next_chunk().await? {
            writer.write_all(&chunk).await?;
            total += chunk.len() as u64;
        }
        writer.flush().await?;
        Ok(total)
    }

    /// Wrap the reader as an [`AsyncRead`] byte stream, for use with
    /// [`tokio::io::copy`] and friends. Errors surface as [`io::Error`]s
    /// wrapping the [`StreamError`].
    pub fn into_async_read(self) -> DecodedStream<R> {
        DecodedStream {
            reader: Some(Box::new(self)),
            pending: None,
            chunk: Bytes::new(),
        }
    }

    /// Make sure the decoded buffer holds data. `false` at end of stream.
    async fn fill(&mut self) -> Result<bool, StreamError> {
        while self.buf.is_empty() {
            match self.state {
                State::Finished => return Ok(false),
                State::Failed => return Err(StreamError::Terminated),
                State::Streaming => {
                    if !self.pull().await? {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    /// Decode the next generation into the buffer. `false` at end of stream.
    async fn pull(&mut self) -> Result<bool, StreamError> {
        let generation = self.generation;
        let shards = self.code.shards();
        let (mut lanes, frames) = self.gather(generation).await;

        let (array, size) = assemble(generation, &mut lanes, frames, shards);
        let report = PullReport { generation, lanes };

        if report.is_end_of_stream() || size == Some(0) {
            debug!(generation, "end of shard stream");
            self.state = State::Finished;
            self.last_report = Some(report);
            return Ok(false);
        }

        let valid = report.valid_count();
        let decoded = match self.code.decode(array) {
            Ok(decoded) => decoded,
            Err(source) => {
                let summary = report.summary();
                error!(generation, valid, total = shards, %summary, error = %source, "chunk decode failed");
                self.state = State::Failed;
                self.last_report = Some(report);
                return Err(StreamError::Decode {
                    generation,
                    valid,
                    total: shards,
                    summary,
                    source,
                });
            }
        };
        self.last_report = Some(report);

        let expected = size.unwrap_or(0) as usize;
        if decoded.len() < expected {
            self.state = State::Failed;
            return Err(StreamError::ShortChunk {
                generation,
                expected,
                got: decoded.len(),
            });
        }

        let mut decoded = decoded;
        decoded.truncate(expected);
        debug!(
            generation,
            size = expected,
            valid,
            total = shards,
            "decoded chunk"
        );
        self.buf = Bytes::from(decoded);
        self.generation += 1;
        Ok(true)
    }

    /// Run one task per live lane and wait for all of them.
    ///
    /// Returns the per-lane statuses so far plus the intact frames of
    /// `generation`, tagged with their lane.
    async fn gather(&mut self, generation: u64) -> (Vec<ShardStatus>, Vec<(usize, Frame)>) {
        let max_stale = self.config.max_stale_frames;
        let mut statuses = vec![ShardStatus::Absent; self.lanes.len()];
        let mut tasks = JoinSet::new();

        for (index, lane) in self.lanes.iter_mut().enumerate() {
            let Some(decoder) = lane.decoder.take() else {
                continue;
            };
            let parked = lane.parked.take();
            statuses[index] = ShardStatus::Failed {
                reason: LOST_TASK.to_string(),
            };
            tasks.spawn(advance_lane(index, decoder, parked, generation, max_stale));
        }

        let mut frames = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(generation, error = %e, "shard lane task failed, dropping lane");
                    continue;
                }
            };

            let lane = &mut self.lanes[outcome.index];
            lane.decoder = outcome.decoder;
            lane.parked = outcome.parked;

            statuses[outcome.index] = match outcome.read {
                LaneRead::Frame { frame, intact: true } => {
                    let member = frame.member;
                    frames.push((outcome.index, frame));
                    ShardStatus::Valid { member }
                }
                LaneRead::Frame { frame, intact: false } => {
                    warn!(
                        generation,
                        lane = outcome.index,
                        member = frame.member,
                        "shard checksum mismatch, treating as absent"
                    );
                    ShardStatus::ChecksumMismatch {
                        member: frame.member,
                    }
                }
                LaneRead::Ahead { found } => {
                    warn!(
                        expected = generation,
                        found,
                        lane = outcome.index,
                        "shard lane is ahead, parking frame"
                    );
                    ShardStatus::GenerationMismatch {
                        expected: generation,
                        found,
                    }
                }
                LaneRead::Exhausted => ShardStatus::Exhausted,
                LaneRead::Failed(reason) => {
                    error!(generation, lane = outcome.index, %reason, "shard lane failed, dropping lane");
                    ShardStatus::Failed { reason }
                }
            };
        }

        (statuses, frames)
    }
}

type NextChunk<R> =
    Pin<Box<dyn Future<Output = (Box<ShardReader<R>>, Result<Option<Bytes>, StreamError>)> + Send>>;

/// [`AsyncRead`] adapter over a [`ShardReader`].
///
/// The reader moves into the in-flight pull and comes back with its result,
/// so exactly one of `reader` and `pending` is set between polls.
pub struct DecodedStream<R> {
    reader: Option<Box<ShardReader<R>>>,
    pending: Option<NextChunk<R>>,
    chunk: Bytes,
}

impl<R> DecodedStream<R> {
    /// Recover the reader, unless a pull is in flight or decoded bytes are
    /// still buffered.
    pub fn into_inner(self) -> Option<ShardReader<R>> {
        match self.reader {
            Some(reader) if self.chunk.is_empty() => Some(*reader),
            _ => None,
        }
    }
}

impl<R> AsyncRead for DecodedStream<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        while this.chunk.is_empty() && buf.remaining() > 0 {
            let mut pending = match this.pending.take() {
                Some(pending) => pending,
                None => {
                    let Some(mut reader) = this.reader.take() else {
                        return Poll::Ready(Err(StreamError::Terminated.into()));
                    };
                    Box::pin(async move {
                        let next = reader.next_chunk().await;
                        (reader, next)
                    })
                }
            };

            let (reader, next) = match pending.as_mut().poll(cx) {
                Poll::Ready(done) => done,
                Poll::Pending => {
                    this.pending = Some(pending);
                    return Poll::Pending;
                }
            };
            this.reader = Some(reader);
            match next {
                Ok(Some(chunk)) => this.chunk = chunk,
                Ok(None) => return Poll::Ready(Ok(())),
                Err(e) => return Poll::Ready(Err(e.into())),
            }
        }

        let n = buf.remaining().min(this.chunk.len());
        buf.put_slice(&this.chunk.split_to(n));
        Poll::Ready(Ok(()))
    }
}

/// Build the shard array from the intact frames of one generation.
///
/// Frames with an out-of-range or repeated member, and frames whose size
/// disagrees with the majority, are dropped and their lane statuses
/// updated. Returns the array and the agreed chunk size, if any frame
/// survived.
fn assemble(
    generation: u64,
    statuses: &mut [ShardStatus],
    mut frames: Vec<(usize, Frame)>,
    shards: usize,
) -> (Vec<Option<Bytes>>, Option<u64>) {
    frames.sort_by_key(|(lane, frame)| (frame.member, *lane));

    let mut accepted: Vec<(usize, Frame)> = Vec::with_capacity(frames.len());
    for (lane, frame) in frames {
        let member = frame.member;
        if member as usize >= shards {
            warn!(generation, lane, member, shards, "shard member out of range");
            statuses[lane] = ShardStatus::InvalidMember { member };
        } else if accepted.last().is_some_and(|(_, f)| f.member == member) {
            warn!(generation, lane, member, "duplicate shard member");
            statuses[lane] = ShardStatus::DuplicateMember { member };
        } else {
            accepted.push((lane, frame));
        }
    }

    let size = majority_size(&accepted);
    let mut array = vec![None; shards];
    for (lane, frame) in accepted {
        if Some(frame.size) != size {
            warn!(
                generation,
                lane,
                member = frame.member,
                size = frame.size,
                "shard declares a minority chunk size"
            );
            statuses[lane] = ShardStatus::SizeMismatch {
                member: frame.member,
                size: frame.size,
            };
            continue;
        }
        array[frame.member as usize] = Some(frame.payload);
    }
    (array, size)
}

/// The chunk size declared by most frames. Ties go to the larger size.
fn majority_size(frames: &[(usize, Frame)]) -> Option<u64> {
    let mut counts: BTreeMap<u64, usize> = BTreeMap::new();
    for (_, frame) in frames {
        *counts.entry(frame.size).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by_key(|&(_, count)| count)
        .map(|(size, _)| size)
}

/// Read a lane forward to `generation`.
///
/// Stale frames from earlier generations are skipped, up to `max_stale`.
/// A frame from a later generation is parked on the lane.
async fn advance_lane<R>(
    index: usize,
    mut decoder: FrameDecoder<R>,
    parked: Option<Frame>,
    generation: u64,
    max_stale: usize,
) -> LaneOutcome<R>
where
    R: AsyncRead + Unpin,
{
    let outcome = |decoder, parked, read| LaneOutcome {
        index,
        decoder,
        parked,
        read,
    };

    if let Some(frame) = parked {
        if frame.generation > generation {
            let found = frame.generation;
            return outcome(Some(decoder), Some(frame), LaneRead::Ahead { found });
        }
        if frame.generation == generation {
            let intact = frame.verify();
            return outcome(Some(decoder), None, LaneRead::Frame { frame, intact });
        }
    }

    let mut stale = 0usize;
    loop {
        let frame = match decoder.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return outcome(None, None, LaneRead::Exhausted),
            Err(e) => return outcome(None, None, LaneRead::Failed(e.to_string())),
        };

        if frame.generation == generation {
            let intact = frame.verify();
            return outcome(Some(decoder), None, LaneRead::Frame { frame, intact });
        }
        if frame.generation > generation {
            let found = frame.generation;
            return outcome(Some(decoder), Some(frame), LaneRead::Ahead { found });
        }

        stale += 1;
        debug!(
            lane = index,
            expected = generation,
            found = frame.generation,
            "skipping stale shard frame"
        );
        if stale > max_stale {
            let reason = format!(
                "desynchronized: more than {max_stale} stale frames before generation {generation}"
            );
            return outcome(None, None, LaneRead::Failed(reason));
        }
    }
}
