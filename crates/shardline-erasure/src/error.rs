//! Error types for erasure encoding and decoding.

/// Errors that can occur during erasure encoding or decoding.
#[derive(Debug, thiserror::Error)]
pub enum ErasureError {
    /// The Reed-Solomon library returned an error.
    #[error("reed-solomon error: {0}")]
    ReedSolomon(#[from] reed_solomon_simd::Error),

    /// Not enough shards were provided for decoding.
    #[error("not enough shards: need {needed}, got {got}")]
    NotEnoughShards {
        /// Minimum shards required.
        needed: usize,
        /// Shards actually provided.
        got: usize,
    },

    /// The shard array handed to decode has the wrong length.
    #[error("wrong shard count: expected {expected}, got {got}")]
    ShardCountMismatch {
        /// Total shard count of the code.
        expected: usize,
        /// Length of the array provided.
        got: usize,
    },

    /// Present shards do not share one size.
    #[error("shard size mismatch: expected {expected} bytes, got {got}")]
    ShardSizeMismatch {
        /// Size of the first present shard.
        expected: usize,
        /// Size of the offending shard.
        got: usize,
    },

    /// A parity shard disagrees with the parity recomputed from the
    /// reconstructed data shards.
    #[error("reconstruction verification failed at parity shard {index}")]
    VerificationFailed {
        /// Index of the disagreeing shard (in `k..k+m`).
        index: usize,
    },

    /// The code parameters are unusable.
    #[error("invalid code configuration: {0}")]
    InvalidConfig(String),
}
