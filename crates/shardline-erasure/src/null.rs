//! A splitter with no redundancy.

use bytes::Bytes;

use crate::Code;
use crate::error::ErasureError;

/// Splits each chunk contiguously into `n` equal shards, zero-padding the
/// tail. Decoding concatenates the shards, so every shard must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullCode {
    n: usize,
}

impl NullCode {
    /// Create a splitter producing `n` shards.
    pub fn new(n: usize) -> Result<Self, ErasureError> {
        if n == 0 {
            return Err(ErasureError::InvalidConfig(
                "null code needs at least one shard".into(),
            ));
        }
        Ok(Self { n })
    }
}

impl Code for NullCode {
    fn shards(&self) -> usize {
        self.n
    }

    fn encode(&self, chunk: &[u8]) -> Result<Vec<Bytes>, ErasureError> {
        let size = chunk.len().div_ceil(self.n);
        let shards = (0..self.n)
            .map(|i| {
                let start = (i * size).min(chunk.len());
                let end = ((i + 1) * size).min(chunk.len());
                let mut shard = Vec::with_capacity(size);
                shard.extend_from_slice(&chunk[start..end]);
                shard.resize(size, 0);
                Bytes::from(shard)
            })
            .collect();
        Ok(shards)
    }

    fn decode(&self, shards: Vec<Option<Bytes>>) -> Result<Vec<u8>, ErasureError> {
        if shards.len() != self.n {
            return Err(ErasureError::ShardCountMismatch {
                expected: self.n,
                got: shards.len(),
            });
        }
        let present = shards.iter().filter(|s| s.is_some()).count();
        if present < self.n {
            return Err(ErasureError::NotEnoughShards {
                needed: self.n,
                got: present,
            });
        }

        let total: usize = shards.iter().flatten().map(Bytes::len).sum();
        let mut out = Vec::with_capacity(total);
        for shard in shards.iter().flatten() {
            out.extend_from_slice(shard);
        }
        Ok(out)
    }
}
