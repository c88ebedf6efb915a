//! Reed-Solomon erasure decoder.
//!
//! Reconstructs the padded chunk from any `k` (or more) of the `k + m`
//! shards produced by [`ReedSolomonCode`](crate::ReedSolomonCode), then
//! checks every parity shard that was supplied against parity recomputed
//! from the result.

use bytes::Bytes;
use tracing::debug;

use crate::error::ErasureError;

/// Decode the padded chunk from an index-addressed shard array.
///
/// `shards[i]` is `None` when shard `i` is absent. The returned buffer is
/// `k * shard_size` bytes; callers truncate it to the original chunk size.
///
/// # Errors
///
/// - [`ErasureError::ShardCountMismatch`] if the array is not `k + m` long.
/// - [`ErasureError::ShardSizeMismatch`] if present shards differ in size.
/// - [`ErasureError::NotEnoughShards`] if fewer than `k` shards are present.
/// - [`ErasureError::VerificationFailed`] if a supplied parity shard
///   disagrees with the reconstructed data.
pub(crate) fn decode(
    k: usize,
    m: usize,
    shards: Vec<Option<Bytes>>,
) -> Result<Vec<u8>, ErasureError> {
    if shards.len() != k + m {
        return Err(ErasureError::ShardCountMismatch {
            expected: k + m,
            got: shards.len(),
        });
    }

    let mut shard_size: Option<usize> = None;
    for shard in shards.iter().flatten() {
        match shard_size {
            None => shard_size = Some(shard.len()),
            Some(expected) if expected != shard.len() => {
                return Err(ErasureError::ShardSizeMismatch {
                    expected,
                    got: shard.len(),
                });
            }
            Some(_) => {}
        }
    }

    let present = shards.iter().filter(|s| s.is_some()).count();
    if present < k {
        return Err(ErasureError::NotEnoughShards {
            needed: k,
            got: present,
        });
    }

    let shard_size = shard_size.unwrap_or(0);
    if shard_size == 0 {
        return Ok(Vec::new());
    }

    let (originals, recovery) = shards.split_at(k);
    let missing = originals.iter().filter(|s| s.is_none()).count();
    let recovery_present = recovery.iter().filter(|s| s.is_some()).count();

    debug!(
        k,
        m,
        shard_size,
        missing,
        recovery_present,
        "decoding chunk from shards"
    );

    let mut result = vec![0u8; k * shard_size];
    for (idx, shard) in originals.iter().enumerate() {
        if let Some(data) = shard {
            let start = idx * shard_size;
            result[start..start + shard_size].copy_from_slice(data);
        }
    }

    // Need RS decode to recover missing originals.
    if missing > 0 {
        let have_originals = originals
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|d| (i, &d[..])));
        let have_recovery = recovery
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|d| (i, &d[..])));

        let restored = reed_solomon_simd::decode(k, m, have_originals, have_recovery)?;
        for (idx, data) in &restored {
            let start = idx * shard_size;
            result[start..start + shard_size].copy_from_slice(data);
        }
    }

    if recovery_present > 0 {
        verify(k, m, recovery, &result, shard_size)?;
    }

    Ok(result)
}

/// Recompute parity from the full data shards and compare it with every
/// parity shard that was supplied.
fn verify(
    k: usize,
    m: usize,
    recovery: &[Option<Bytes>],
    data: &[u8],
    shard_size: usize,
) -> Result<(), ErasureError> {
    let originals: Vec<&[u8]> = data.chunks_exact(shard_size).collect();
    let expected = reed_solomon_simd::encode(k, m, &originals)?;

    for (i, (have, want)) in recovery.iter().zip(&expected).enumerate() {
        if let Some(have) = have
            && have[..] != want[..]
        {
            return Err(ErasureError::VerificationFailed { index: k + i });
        }
    }
    Ok(())
}
