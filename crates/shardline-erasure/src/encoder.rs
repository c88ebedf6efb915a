//! Reed-Solomon erasure encoder.
//!
//! Splits a chunk into `k` data shards and generates `m` parity shards,
//! returned in index order (data first, then parity).

use bytes::Bytes;
use tracing::debug;

use crate::Code;
use crate::decoder;
use crate::error::ErasureError;

/// Reed-Solomon erasure code.
///
/// Splits chunk data into `k` data shards and generates `m` parity shards.
/// All shards are the same size. If the chunk isn't evenly divisible by `k`,
/// it is padded with zeros. Shard sizes are also padded to be even (required
/// by `reed-solomon-simd`). Any `k` of the `k + m` shards reconstruct the
/// chunk.
#[derive(Debug, Clone)]
pub struct ReedSolomonCode {
    /// Number of data shards.
    k: usize,
    /// Number of parity shards.
    m: usize,
}

impl ReedSolomonCode {
    /// Create a code with the given data/parity shard counts.
    ///
    /// Both counts must be at least 1; use [`NullCode`](crate::NullCode) for
    /// a split without parity.
    pub fn new(k: usize, m: usize) -> Result<Self, ErasureError> {
        if k == 0 {
            return Err(ErasureError::InvalidConfig(
                "at least one data shard is required".into(),
            ));
        }
        if m == 0 {
            return Err(ErasureError::InvalidConfig(
                "reed-solomon needs at least one parity shard".into(),
            ));
        }
        if k + m > u16::MAX as usize {
            return Err(ErasureError::InvalidConfig(format!(
                "too many shards: {k} + {m}"
            )));
        }
        Ok(Self { k, m })
    }

    /// Number of data shards.
    pub fn data_shards(&self) -> usize {
        self.k
    }

    /// Number of parity shards (the number of losses tolerated).
    pub fn parity_shards(&self) -> usize {
        self.m
    }
}

impl Code for ReedSolomonCode {
    fn shards(&self) -> usize {
        self.k + self.m
    }

    fn encode(&self, chunk: &[u8]) -> Result<Vec<Bytes>, ErasureError> {
        // The end-of-stream sentinel is an empty chunk: every shard is empty.
        if chunk.is_empty() {
            return Ok(vec![Bytes::new(); self.k + self.m]);
        }

        // Compute shard size: ceil(chunk.len() / k), then round up to even.
        let shard_size = round_up_even(chunk.len().div_ceil(self.k));

        // Pad the chunk to exactly k * shard_size.
        let padded_len = self.k * shard_size;
        let mut padded = Vec::with_capacity(padded_len);
        padded.extend_from_slice(chunk);
        padded.resize(padded_len, 0);

        let originals: Vec<&[u8]> = padded.chunks_exact(shard_size).collect();
        debug_assert_eq!(originals.len(), self.k);

        let recovery = reed_solomon_simd::encode(self.k, self.m, &originals)?;

        let mut shards = Vec::with_capacity(self.k + self.m);
        shards.extend(originals.iter().map(|s| Bytes::copy_from_slice(s)));
        shards.extend(recovery.into_iter().map(Bytes::from));

        debug!(
            k = self.k,
            m = self.m,
            chunk_size = chunk.len(),
            shard_size,
            "encoded chunk into shards"
        );

        Ok(shards)
    }

    fn decode(&self, shards: Vec<Option<Bytes>>) -> Result<Vec<u8>, ErasureError> {
        decoder::decode(self.k, self.m, shards)
    }
}

/// Round up to the nearest even number.
pub(crate) fn round_up_even(n: usize) -> usize {
    if n.is_multiple_of(2) { n } else { n + 1 }
}
