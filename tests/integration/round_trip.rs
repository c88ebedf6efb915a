//! Writer to reader round trips across codes and sizes.

use std::sync::Arc;

use shardline_erasure::{NullCode, ReedSolomonCode, build_code, suggest_config};
use shardline_integration_tests::{ShardSet, digest, test_data, test_data_seeded};

const TEN_MB: usize = 10_000_000;

#[tokio::test]
#[ntest::timeout(300000)]
async fn test_null_code_100mb() {
    let code = Arc::new(NullCode::new(10).unwrap());
    let data = test_data(100_000_000);
    let set = ShardSet::split(code.clone(), TEN_MB, &data).await;
    let got = set.join(code).await.unwrap();
    assert_eq!(got.len(), data.len());
    assert_eq!(digest(&got), digest(&data));
}

#[tokio::test]
#[ntest::timeout(10000)]
async fn test_null_code_31_bytes() {
    let code = Arc::new(NullCode::new(10).unwrap());
    let data = test_data(31);
    let set = ShardSet::split(code.clone(), TEN_MB, &data).await;
    assert_eq!(set.join(code).await.unwrap(), data);
}

#[tokio::test]
#[ntest::timeout(300000)]
async fn test_reed_solomon_17_3_100mb() {
    let code = Arc::new(ReedSolomonCode::new(17, 3).unwrap());
    let data = test_data(100_000_000);
    let set = ShardSet::split(code.clone(), TEN_MB, &data).await;
    let got = set.join(code).await.unwrap();
    assert_eq!(digest(&got), digest(&data));
}

#[tokio::test]
#[ntest::timeout(20000)]
async fn test_reed_solomon_17_3_small() {
    let code = Arc::new(ReedSolomonCode::new(17, 3).unwrap());
    let data = test_data(100_000);
    let set = ShardSet::split(code.clone(), TEN_MB, &data).await;
    assert_eq!(set.join(code).await.unwrap(), data);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_chunk_boundaries() {
    let chunk = 64 * 1024;
    for (data_shards, parity) in [(4, 0), (4, 2), (17, 3)] {
        let code = build_code(data_shards, parity).unwrap();
        for len in [chunk - 1, chunk, chunk + 1, 2 * chunk, 2 * chunk + 1] {
            let data = test_data_seeded(len, len as u32);
            let set = ShardSet::split(code.clone(), chunk, &data).await;
            assert_eq!(
                set.join(code.clone()).await.unwrap(),
                data,
                "{data_shards}+{parity}, length {len}"
            );
        }
    }
}

#[tokio::test]
#[ntest::timeout(10000)]
async fn test_empty_stream_every_code() {
    for (data_shards, parity) in [(1, 0), (10, 0), (1, 1), (17, 3)] {
        let code = build_code(data_shards, parity).unwrap();
        let set = ShardSet::split(code.clone(), 1024, &[]).await;
        for shard in set.shards.iter().flatten() {
            assert!(!shard.is_empty(), "the end-of-stream frame is always written");
        }
        assert!(set.join(code).await.unwrap().is_empty());
    }
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_suggested_configs_round_trip() {
    let data = test_data(50_000);
    for targets in 1..=24 {
        let (data_shards, parity) = suggest_config(targets);
        assert!(data_shards + parity <= targets.max(1));
        let code = build_code(data_shards, parity).unwrap();
        let set = ShardSet::split(code.clone(), 8192, &data).await;
        assert_eq!(set.join(code).await.unwrap(), data, "{targets} targets");
    }
}

#[tokio::test]
#[ntest::timeout(20000)]
async fn test_tiny_chunks() {
    let code = build_code(3, 2).unwrap();
    let data = test_data(5_000);
    let set = ShardSet::split(code.clone(), 1, &data).await;
    assert_eq!(set.join(code).await.unwrap(), data);
}
