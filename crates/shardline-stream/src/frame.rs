//! The shard frame and its wire codec.
//!
//! Each conduit carries a sequence of frames. A frame on the wire is a
//! 4-byte big-endian length prefix followed by the postcard encoding of
//! [`Frame`]. A conduit that ends cleanly before a length prefix has no
//! more frames; ending anywhere else is [`FrameError::Truncated`].

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::MAX_FRAME_SIZE;
use crate::error::FrameError;

/// Length of a payload checksum in bytes.
pub const CHECKSUM_LEN: usize = 20;

/// Content checksum of a shard payload: the first 20 bytes of the BLAKE3
/// extendable output.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum([u8; CHECKSUM_LEN]);

impl Checksum {
    /// Checksum `data`.
    pub fn of(data: &[u8]) -> Self {
        let mut out = [0u8; CHECKSUM_LEN];
        let mut hasher = blake3::Hasher::new();
        hasher.update(data);
        hasher.finalize_xof().fill(&mut out);
        Self(out)
    }

    /// Return the raw 20-byte representation.
    pub fn as_bytes(&self) -> &[u8; CHECKSUM_LEN] {
        &self.0
    }
}

impl From<[u8; CHECKSUM_LEN]> for Checksum {
    fn from(bytes: [u8; CHECKSUM_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({self})")
    }
}

/// One shard of one chunk, as carried on a conduit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Position of the chunk in the stream.
    pub generation: u64,
    /// Which of the code's shards this frame carries.
    pub member: u32,
    /// Checksum of `payload`, computed when the frame was built.
    pub checksum: Checksum,
    /// The shard bytes.
    pub payload: Bytes,
    /// Unpadded length of the chunk this shard belongs to.
    pub size: u64,
}

impl Frame {
    /// Build a frame, checksumming the payload.
    pub fn new(generation: u64, member: u32, payload: Bytes, size: u64) -> Self {
        Self {
            generation,
            member,
            checksum: Checksum::of(&payload),
            payload,
            size,
        }
    }

    /// Whether the payload still matches its checksum.
    pub fn verify(&self) -> bool {
        Checksum::of(&self.payload) == self.checksum
    }
}

/// Encode a frame into its wire form (length prefix + postcard body).
pub fn encode_frame(frame: &Frame) -> Result<Bytes, FrameError> {
    let body =
        postcard::to_allocvec(frame).map_err(|e| FrameError::Serialization(e.to_string()))?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            len: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut out = BytesMut::with_capacity(4 + body.len());
    out.put_u32(body.len() as u32);
    out.extend_from_slice(&body);
    Ok(out.freeze())
}

/// Encode a frame and write it to `writer`.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let wire = encode_frame(frame)?;
    writer.write_all(&wire).await?;
    Ok(())
}

/// Reads frames one at a time from a byte conduit.
#[derive(Debug)]
pub struct FrameDecoder<R> {
    inner: R,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> FrameDecoder<R> {
    /// Wrap a conduit, accepting frames up to [`MAX_FRAME_SIZE`].
    pub fn new(inner: R) -> Self {
        Self::with_max_frame_size(inner, MAX_FRAME_SIZE)
    }

    /// Wrap a conduit with a custom frame size limit.
    pub fn with_max_frame_size(inner: R, max_frame_size: usize) -> Self {
        Self {
            inner,
            max_frame_size,
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` when the conduit ends cleanly between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            let n = self.inner.read(&mut len_buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(FrameError::Truncated);
            }
            filled += n;
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_frame_size {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_frame_size,
            });
        }

        // Grow with the bytes that arrive, not with the declared length.
        let mut body = Vec::new();
        let got = (&mut self.inner)
            .take(len as u64)
            .read_to_end(&mut body)
            .await?;
        if got < len {
            return Err(FrameError::Truncated);
        }

        let frame =
            postcard::from_bytes(&body).map_err(|e| FrameError::Serialization(e.to_string()))?;
        Ok(Some(frame))
    }

    /// Return the wrapped conduit.
    pub fn into_inner(self) -> R {
        self.inner
    }
}
