// tests/pg_quota_store_tests.rs

use std::sync::{Arc, LazyLock};

use learnflow::services::{
    blob_store::{BlobRegistry, BlobStore, MemoryBlobStore},
    quota_store::PgQuotaStore,
    storage_quota::{AllocationError, QuotaLimits, StorageQuotaAllocator},
};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::{Mutex, MutexGuard};

/// The rotation cursor is a single row, so these tests take turns.
static SERIAL: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Allocator over `PgQuotaStore` starting from a reset state, or `None` when
/// `DATABASE_URL` is not set.
async fn pg_allocator(
    bucket_count: usize,
    capacity_bytes: u64,
) -> Option<(StorageQuotaAllocator, MutexGuard<'static, ()>)> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping database test");
        return None;
    };
    let guard = SERIAL.lock().await;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let backends = (0..bucket_count)
        .map(|_| Arc::new(MemoryBlobStore::new("media")) as Arc<dyn BlobStore>)
        .collect();
    let allocator = StorageQuotaAllocator::new(
        Arc::new(PgQuotaStore::new(pool)),
        Arc::new(BlobRegistry::new(backends)),
        QuotaLimits {
            bucket_count,
            capacity_bytes,
        },
    );
    allocator.reset().await.unwrap();

    Some((allocator, guard))
}

#[tokio::test]
async fn pg_rotates_then_exhausts() {
    let Some((allocator, _guard)) = pg_allocator(2, 1000).await else {
        return;
    };

    assert_eq!(allocator.allocate(600).await, Ok(0));
    assert_eq!(allocator.allocate(500).await, Ok(1));
    assert_eq!(
        allocator.allocate(600).await,
        Err(AllocationError::CapacityExhausted)
    );

    let status = allocator.status().await.unwrap();
    assert!(status.exhausted);
    assert_eq!(status.current_index, 2);
    assert_eq!(status.bytes_used, vec![600, 500]);
}

#[tokio::test]
async fn pg_exhaustion_holds_until_reset() {
    let Some((allocator, _guard)) = pg_allocator(1, 100).await else {
        return;
    };

    assert_eq!(allocator.allocate(100).await, Err(AllocationError::CapacityExhausted));
    assert_eq!(allocator.allocate(1).await, Err(AllocationError::CapacityExhausted));
    assert!(allocator.status().await.unwrap().exhausted);

    allocator.reset().await.unwrap();
    let status = allocator.status().await.unwrap();
    assert_eq!(status.current_index, 0);
    assert!(status.bytes_used.is_empty());

    assert_eq!(allocator.allocate(1).await, Ok(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn pg_concurrent_allocate_and_release_keep_usage_exact() {
    let Some((allocator, _guard)) = pg_allocator(1, 1_000_000).await else {
        return;
    };
    let allocator = Arc::new(allocator);

    for _ in 0..200 {
        assert_eq!(allocator.allocate(10).await, Ok(0));
    }

    let mut handles = Vec::new();
    for i in 0..400 {
        let allocator = Arc::clone(&allocator);
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                allocator.allocate(10).await.map(|_| ())
            } else {
                allocator.release(0, 10).await
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // 200 + 200 allocations minus 200 releases, 10 bytes each.
    let status = allocator.status().await.unwrap();
    assert_eq!(status.bytes_used, vec![2000]);
    assert_eq!(status.current_index, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn pg_concurrent_callers_never_overshoot_rotation() {
    let Some((allocator, _guard)) = pg_allocator(3, 1000).await else {
        return;
    };
    let allocator = Arc::new(allocator);

    let mut handles = Vec::new();
    for _ in 0..40 {
        let allocator = Arc::clone(&allocator);
        handles.push(tokio::spawn(async move { allocator.allocate(100).await }));
    }

    let mut exhausted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => {}
            Err(AllocationError::CapacityExhausted) => exhausted += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(exhausted, 13);
    let status = allocator.status().await.unwrap();
    assert_eq!(status.bytes_used, vec![900, 900, 900]);
    assert!(status.exhausted);
}
