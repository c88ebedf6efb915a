//! [`ShardWriter`]: chunks a byte stream, erasure-codes each chunk and
//! emits one framed shard per conduit.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use shardline_erasure::Code;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, warn};

use crate::config::WriterConfig;
use crate::conduit::{ConduitSender, ShardStream, conduit};
use crate::error::StreamError;
use crate::frame::{Frame, encode_frame};

/// Read buffer size used by [`ShardWriter::copy_from`].
const COPY_BUF_SIZE: usize = 64 * 1024;

/// Splits a byte stream into chunks and writes each chunk's shards to
/// `code.shards()` conduits.
///
/// The conduits have a single slot each: the streams returned by
/// [`ShardWriter::readers`] must be drained concurrently with writes, or
/// the writer waits forever.
///
/// A writer must be finished with [`ShardWriter::close`]. Dropping it, or
/// calling [`ShardWriter::abort`], ends every conduit with an error instead
/// of the end-of-stream frame set.
pub struct ShardWriter {
    code: Arc<dyn Code>,
    chunk_size: usize,
    /// Generation of the chunk being buffered.
    generation: u64,
    buf: Vec<u8>,
    conduits: Vec<ConduitSender>,
    /// Read ends not yet handed out.
    streams: Vec<ShardStream>,
}

impl ShardWriter {
    /// Create a writer for `code`, with one conduit per shard.
    pub fn new(code: Arc<dyn Code>, config: WriterConfig) -> Result<Self, StreamError> {
        config.validate()?;
        let (conduits, streams) = (0..code.shards()).map(conduit).unzip();
        Ok(Self {
            code,
            chunk_size: config.chunk_size,
            generation: 0,
            buf: Vec::new(),
            conduits,
            streams,
        })
    }

    /// Take the read ends of the conduits, in member order.
    ///
    /// The first call returns all of them; later calls return an empty vec.
    pub fn readers(&mut self) -> Vec<ShardStream> {
        std::mem::take(&mut self.streams)
    }

    /// Generation of the chunk currently being buffered (the number of
    /// chunks flushed so far).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Configured chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Buffer `data`, flushing at most one full chunk.
    ///
    /// When `data` overflows the current chunk, the chunk is topped up to
    /// exactly `chunk_size` and flushed, then up to one more chunk's worth
    /// of the remainder is buffered. Returns how many bytes were accepted,
    /// which may be less than `data.len()`; see [`ShardWriter::write_all`].
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        let room = self.chunk_size - self.buf.len();
        if data.len() <= room {
            self.buf.extend_from_slice(data);
            return Ok(data.len());
        }

        self.buf.extend_from_slice(&data[..room]);
        self.flush_chunk().await?;

        let rest = &data[room..];
        let take = rest.len().min(self.chunk_size);
        self.buf.extend_from_slice(&rest[..take]);
        Ok(room + take)
    }

    /// Write all of `data`.
    pub async fn write_all(&mut self, mut data: &[u8]) -> Result<(), StreamError> {
        while !data.is_empty() {
            let n = self.write(data).await?;
            data = &data[n..];
        }
        Ok(())
    }

    /// Copy `reader` to the end into the writer. Returns the bytes copied.
    pub async fn copy_from<R>(&mut self, reader: &mut R) -> Result<u64, StreamError>
    where
        R: AsyncRead + Unpin,
    {
        let mut scratch = vec![0u8; COPY_BUF_SIZE.min(self.chunk_size)];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut scratch).await?;
            if n == 0 {
                return Ok(total);
            }
            self.write_all(&scratch[..n]).await?;
            total += n as u64;
        }
    }

    /// Flush the final chunk and close every conduit.
    ///
    /// The final flush always happens, even for an empty buffer: readers
    /// rely on that last frame set to recognize the end of the stream. If
    /// it fails, the error is also attached to every conduit, so shard
    /// consumers see it after draining.
    pub async fn close(mut self) -> Result<(), StreamError> {
        let result = self.flush_chunk().await;
        let failure = result.as_ref().err().map(ToString::to_string);
        if let Some(msg) = &failure {
            warn!(generation = self.generation, error = %msg, "closing shard conduits after failed flush");
        }
        for sender in self.conduits.drain(..) {
            sender.close(failure.as_deref());
        }
        debug!(chunks = self.generation, "shard writer closed");
        result
    }

    /// Abandon the stream without the end-of-stream frame set.
    ///
    /// Buffered bytes are discarded and every conduit ends with `reason`,
    /// so shard consumers and readers fail instead of seeing a short stream.
    pub fn abort(mut self, reason: &str) {
        warn!(
            generation = self.generation,
            buffered = self.buf.len(),
            %reason,
            "aborting shard writer"
        );
        for sender in self.conduits.drain(..) {
            sender.close(Some(reason));
        }
    }

    /// Wrap the writer as an [`AsyncWrite`] sink, for use with
    /// [`tokio::io::copy`] and friends.
    ///
    /// Take the read ends with [`ShardWriter::readers`] first.
    pub fn into_sink(self) -> ShardSink {
        ShardSink {
            state: SinkState::Idle(Box::new(self)),
        }
    }

    /// Encode the buffered chunk and send one frame per shard.
    async fn flush_chunk(&mut self) -> Result<(), StreamError> {
        let shards = self
            .code
            .encode(&self.buf)
            .map_err(|source| StreamError::Encode {
                generation: self.generation,
                source,
            })?;
        if shards.len() != self.conduits.len() {
            return Err(StreamError::ShardCountMismatch {
                expected: self.conduits.len(),
                got: shards.len(),
            });
        }

        let size = self.buf.len() as u64;
        let wires = shards
            .into_iter()
            .enumerate()
            .map(|(member, payload)| {
                encode_frame(&Frame::new(self.generation, member as u32, payload, size))
            })
            .collect::<Result<Vec<Bytes>, _>>()?;

        for (sender, wire) in self.conduits.iter().zip(wires) {
            sender.send(wire).await?;
        }

        debug!(
            generation = self.generation,
            size,
            shards = self.conduits.len(),
            "flushed chunk"
        );

        self.generation += 1;
        self.buf.clear();
        Ok(())
    }
}

type Pending<T> = Pin<Box<dyn Future<Output = T> + Send>>;

enum SinkState {
    Idle(Box<ShardWriter>),
    Flushing(Pending<(Box<ShardWriter>, Result<(), StreamError>)>),
    Closing(Pending<Result<(), StreamError>>),
    Closed,
}

/// [`AsyncWrite`] adapter over a [`ShardWriter`].
///
/// Writes fill the current chunk; a full chunk is flushed when more data
/// arrives or on shutdown. `poll_flush` does not cut a partial chunk.
/// `poll_shutdown` closes the writer and sends the end-of-stream frame set.
/// Dropping the sink before shutdown aborts the stream.
pub struct ShardSink {
    state: SinkState,
}

impl ShardSink {
    /// Abandon the stream, ending every conduit with `reason`.
    pub fn abort(self, reason: &str) {
        match self.state {
            SinkState::Idle(writer) => writer.abort(reason),
            // Dropping an in-flight flush or close ends its conduits as
            // dropped before close.
            _ => warn!(%reason, "aborting shard sink"),
        }
    }
}

fn closed_sink() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "shard sink is closed")
}

impl AsyncWrite for ShardSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            match std::mem::replace(&mut self.state, SinkState::Closed) {
                SinkState::Idle(mut writer) => {
                    let room = writer.chunk_size - writer.buf.len();
                    if room > 0 || data.is_empty() {
                        let n = room.min(data.len());
                        writer.buf.extend_from_slice(&data[..n]);
                        self.state = SinkState::Idle(writer);
                        return Poll::Ready(Ok(n));
                    }
                    self.state = SinkState::Flushing(Box::pin(async move {
                        let result = writer.flush_chunk().await;
                        (writer, result)
                    }));
                }
                SinkState::Flushing(mut pending) => match pending.as_mut().poll(cx) {
                    Poll::Pending => {
                        self.state = SinkState::Flushing(pending);
                        return Poll::Pending;
                    }
                    Poll::Ready((writer, result)) => {
                        self.state = SinkState::Idle(writer);
                        if let Err(e) = result {
                            return Poll::Ready(Err(e.into()));
                        }
                    }
                },
                SinkState::Closing(pending) => {
                    self.state = SinkState::Closing(pending);
                    return Poll::Ready(Err(closed_sink()));
                }
                SinkState::Closed => return Poll::Ready(Err(closed_sink())),
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            match std::mem::replace(&mut self.state, SinkState::Closed) {
                SinkState::Idle(writer) => {
                    self.state = SinkState::Closing(Box::pin(writer.close()));
                }
                SinkState::Flushing(mut pending) => match pending.as_mut().poll(cx) {
                    Poll::Pending => {
                        self.state = SinkState::Flushing(pending);
                        return Poll::Pending;
                    }
                    // Close retries a failed chunk, like `ShardWriter::close`.
                    Poll::Ready((writer, _)) => self.state = SinkState::Idle(writer),
                },
                SinkState::Closing(mut pending) => match pending.as_mut().poll(cx) {
                    Poll::Pending => {
                        self.state = SinkState::Closing(pending);
                        return Poll::Pending;
                    }
                    Poll::Ready(result) => return Poll::Ready(result.map_err(io::Error::from)),
                },
                SinkState::Closed => return Poll::Ready(Ok(())),
            }
        }
    }
}
