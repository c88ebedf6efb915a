//! Erasure coding parameter selection.
//!
//! Suggests `(data, parity)` for a number of independent shard targets
//! (disks, mounts, nodes), balancing storage overhead against fault
//! tolerance.

use std::sync::Arc;

use crate::error::ErasureError;
use crate::{Code, NullCode, ReedSolomonCode};

/// Suggest erasure coding parameters for `targets` independent shard
/// destinations.
///
/// Returns `(data, parity)`. The total `data + parity` never exceeds the
/// target count, so every shard can live on a distinct target.
///
/// | Targets | data | parity | Overhead | Tolerance |
/// |---------|------|--------|----------|-----------|
/// | 1       | 1    | 0      | 1.0x     | 0 losses  |
/// | 2       | 1    | 1      | 2.0x     | 1 loss    |
/// | 3       | 2    | 1      | 1.5x     | 1 loss    |
/// | 4       | 2    | 2      | 2.0x     | 2 losses  |
/// | 5       | 3    | 2      | 1.67x    | 2 losses  |
/// | 6-11    | 4    | 2      | 1.5x     | 2 losses  |
/// | 12-19   | 8    | 4      | 1.5x     | 4 losses  |
/// | 20+     | 17   | 3      | 1.18x    | 3 losses  |
pub fn suggest_config(targets: usize) -> (usize, usize) {
    match targets {
        0 | 1 => (1, 0),
        2 => (1, 1),
        3 => (2, 1),
        4 => (2, 2),
        5 => (3, 2),
        6..=11 => (4, 2),
        12..=19 => (8, 4),
        _ => (17, 3),
    }
}

/// Build the code for `data` data shards and `parity` parity shards.
///
/// `parity == 0` selects [`NullCode`], anything else [`ReedSolomonCode`].
pub fn build_code(data: usize, parity: usize) -> Result<Arc<dyn Code>, ErasureError> {
    if parity == 0 {
        Ok(Arc::new(NullCode::new(data)?))
    } else {
        Ok(Arc::new(ReedSolomonCode::new(data, parity)?))
    }
}
