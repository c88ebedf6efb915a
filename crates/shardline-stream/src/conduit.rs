//! Single-slot hand-off conduits between the writer and shard consumers.
//!
//! Each conduit is a `tokio::sync::mpsc` channel of capacity 1 carrying
//! encoded frames. A send completes only once the previous frame has been
//! taken, so the slowest consumer paces the writer. The read end is exposed
//! as a plain byte stream ([`ShardStream`]).

use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

use crate::error::StreamError;

/// Failure carried by a conduit whose writer went away without closing it.
pub(crate) const DROPPED_BEFORE_CLOSE: &str = "shard writer dropped before close";

/// Create the two ends of the conduit for shard `member`.
pub(crate) fn conduit(member: usize) -> (ConduitSender, ShardStream) {
    let (tx, rx) = mpsc::channel(1);
    let failure = Arc::new(OnceLock::new());
    (
        ConduitSender {
            member,
            tx,
            failure: failure.clone(),
            closed: false,
        },
        ShardStream {
            member,
            rx,
            current: Bytes::new(),
            failure,
        },
    )
}

/// Write end of a conduit, owned by the writer.
///
/// Dropping a sender without [`ConduitSender::close`] ends the conduit with
/// [`DROPPED_BEFORE_CLOSE`], so a consumer never mistakes an abandoned
/// stream for a finished one.
#[derive(Debug)]
pub(crate) struct ConduitSender {
    member: usize,
    tx: mpsc::Sender<Bytes>,
    /// Error message handed to the consumer once the channel is drained.
    failure: Arc<OnceLock<String>>,
    closed: bool,
}

impl ConduitSender {
    /// Hand one encoded frame to the consumer, waiting for the slot.
    pub(crate) async fn send(&self, frame: Bytes) -> Result<(), StreamError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| StreamError::ConduitClosed {
                member: self.member,
            })
    }

    /// Close the conduit, optionally carrying the writer's terminal error.
    pub(crate) fn close(mut self, failure: Option<&str>) {
        if let Some(msg) = failure {
            let _ = self.failure.set(msg.to_string());
        }
        self.closed = true;
        // Dropping `tx` closes the channel.
    }
}

impl Drop for ConduitSender {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.failure.set(DROPPED_BEFORE_CLOSE.to_string());
        }
    }
}

/// Read end of one shard's conduit.
///
/// Yields the shard's encoded frames as a byte stream and reaches end of
/// stream once the writer closes. If the writer closed with an error, that
/// error is returned instead of end of stream.
#[derive(Debug)]
pub struct ShardStream {
    member: usize,
    rx: mpsc::Receiver<Bytes>,
    current: Bytes,
    failure: Arc<OnceLock<String>>,
}

impl ShardStream {
    /// Which shard this stream carries.
    pub fn member(&self) -> usize {
        self.member
    }
}

impl AsyncRead for ShardStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        while this.current.is_empty() {
            match ready!(this.rx.poll_recv(cx)) {
                Some(frame) => this.current = frame,
                None => {
                    return Poll::Ready(match this.failure.get() {
                        Some(msg) => Err(io::Error::other(format!("shard writer failed: {msg}"))),
                        None => Ok(()),
                    });
                }
            }
        }

        let n = buf.remaining().min(this.current.len());
        buf.put_slice(&this.current.split_to(n));
        Poll::Ready(Ok(()))
    }
}
