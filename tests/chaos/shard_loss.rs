//! Chaos test: lost, corrupted and truncated shards.
//!
//! Damage within a code's parity budget must be invisible to the reader;
//! one shard more must surface a single decode error.

use std::io::Cursor;
use std::sync::Arc;

use shardline_erasure::{ErasureError, ReedSolomonCode};
use shardline_integration_tests::{ShardSet, digest, test_data};
use shardline_stream::{ReaderConfig, ShardReader, StreamError};

fn rs(k: usize, m: usize) -> Arc<ReedSolomonCode> {
    Arc::new(ReedSolomonCode::new(k, m).unwrap())
}

/// 100 MB through 17+3 with one shard deleted and two corrupted.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(300000)]
async fn test_lost_and_corrupt_shards_100mb() {
    let code = rs(17, 3);
    let data = test_data(100_000_000);
    let mut set = ShardSet::split(code.clone(), 10_000_000, &data).await;

    set.kill(&[10]);
    set.corrupt(&[17, 18]).await;

    let got = set.join(code).await.unwrap();
    assert_eq!(digest(&got), digest(&data));
}

#[tokio::test]
#[ntest::timeout(10000)]
async fn test_single_data_shard_from_parity() {
    let code = rs(1, 2);
    let data = test_data(82);
    let mut set = ShardSet::split(code.clone(), 10_000_000, &data).await;
    set.kill(&[0, 2]);
    assert_eq!(set.join(code).await.unwrap(), data);
}

#[tokio::test]
#[ntest::timeout(10000)]
async fn test_mirror_with_corrupt_original() {
    let code = rs(1, 1);
    let data = test_data(99);
    let mut set = ShardSet::split(code.clone(), 10_000_000, &data).await;
    set.corrupt(&[0]).await;
    assert_eq!(set.join(code).await.unwrap(), data);
}

#[tokio::test]
#[ntest::timeout(60000)]
async fn test_losing_parity_count_is_tolerated() {
    let data = test_data(200_000);
    for (k, m) in [(2, 1), (4, 2), (10, 4), (17, 3)] {
        let code = rs(k, m);
        let set = ShardSet::split(code.clone(), 64 * 1024, &data).await;

        // Lose the first m, the last m, and a spread of m shards.
        let spread: Vec<usize> = (0..m).map(|i| i * (k + m) / m).collect();
        for lost in [(0..m).collect::<Vec<_>>(), (k..k + m).collect(), spread] {
            let mut damaged = ShardSet {
                shards: set.shards.clone(),
            };
            damaged.kill(&lost);
            assert_eq!(
                damaged.join(code.clone()).await.unwrap(),
                data,
                "RS({k},{m}) lost {lost:?}"
            );
        }
    }
}

#[tokio::test]
#[ntest::timeout(60000)]
async fn test_losing_one_more_than_parity_fails() {
    let data = test_data(200_000);
    for (k, m) in [(2, 1), (4, 2), (17, 3)] {
        let code = rs(k, m);
        let mut set = ShardSet::split(code.clone(), 64 * 1024, &data).await;
        let lost: Vec<usize> = (0..=m).collect();
        set.kill(&lost);

        match set.join(code).await {
            Err(StreamError::Decode {
                generation,
                valid,
                total,
                source,
                ..
            }) => {
                assert_eq!(generation, 0);
                assert_eq!(valid, k - 1);
                assert_eq!(total, k + m);
                assert!(matches!(source, ErasureError::NotEnoughShards { .. }));
            }
            other => panic!("RS({k},{m}): expected decode error, got {:?}", other.map(|v| v.len())),
        }
    }
}

#[tokio::test]
#[ntest::timeout(60000)]
async fn test_corrupting_parity_count_is_masked() {
    let data = test_data(150_000);
    for (k, m) in [(2, 1), (4, 2), (17, 3)] {
        let code = rs(k, m);
        let mut set = ShardSet::split(code.clone(), 50_000, &data).await;
        let corrupted: Vec<usize> = (0..m).map(|i| k + m - 1 - 2 * i).collect();
        set.corrupt(&corrupted).await;
        assert_eq!(
            set.join(code).await.unwrap(),
            data,
            "RS({k},{m}) corrupted {corrupted:?}"
        );
    }
}

#[tokio::test]
#[ntest::timeout(60000)]
async fn test_corrupting_one_more_than_parity_fails() {
    let data = test_data(150_000);
    for (k, m) in [(2, 1), (4, 2), (17, 3)] {
        let code = rs(k, m);
        let mut set = ShardSet::split(code.clone(), 50_000, &data).await;
        let corrupted: Vec<usize> = (0..=m).collect();
        set.corrupt(&corrupted).await;
        assert!(
            matches!(set.join(code).await, Err(StreamError::Decode { generation: 0, .. })),
            "RS({k},{m})"
        );
    }
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_mixed_loss_and_corruption_within_budget() {
    let code = rs(6, 3);
    let data = test_data(500_000);
    let mut set = ShardSet::split(code.clone(), 100_000, &data).await;
    set.kill(&[1]);
    set.corrupt(&[4, 7]).await;
    assert_eq!(set.join(code).await.unwrap(), data);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_shards_cut_off_mid_stream() {
    let code = rs(5, 2);
    let data = test_data(400_000);
    let mut set = ShardSet::split(code.clone(), 40_000, &data).await;

    // Two "disks" die partway through, at different points.
    for (member, keep) in [(0, 3), (6, 2)] {
        if let Some(wire) = set.shards[member].as_mut() {
            wire.truncate(wire.len() * keep / 7);
        }
    }
    assert_eq!(set.join(code).await.unwrap(), data);
}

#[tokio::test]
#[ntest::timeout(30000)]
async fn test_error_is_surfaced_once() {
    let code = rs(3, 1);
    let data = test_data(100_000);
    let mut set = ShardSet::split(code.clone(), 30_000, &data).await;
    set.kill(&[0, 1]);

    let inputs = set.shards.into_iter().map(|s| s.map(Cursor::new)).collect();
    let mut reader = ShardReader::new(code, inputs, ReaderConfig::default()).unwrap();
    let mut buf = vec![0u8; 4096];
    assert!(matches!(
        reader.read(&mut buf).await,
        Err(StreamError::Decode { .. })
    ));
    for _ in 0..3 {
        assert!(matches!(
            reader.read(&mut buf).await,
            Err(StreamError::Terminated)
        ));
    }
}
