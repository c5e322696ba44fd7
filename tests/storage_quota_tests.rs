// tests/storage_quota_tests.rs

use std::sync::Arc;

use learnflow::services::{
    blob_store::{BlobRegistry, BlobStore, MemoryBlobStore, SignedUrlCache},
    quota_store::MemoryQuotaStore,
    storage_quota::{AllocationError, BucketState, QuotaLimits, StorageQuotaAllocator},
};

fn registry(backends: usize) -> Arc<BlobRegistry> {
    Arc::new(BlobRegistry::new(
        (0..backends)
            .map(|i| Arc::new(MemoryBlobStore::new(&format!("bucket-{}", i))) as Arc<dyn BlobStore>)
            .collect(),
    ))
}

fn allocator(bucket_count: usize, capacity_bytes: u64, backends: usize) -> StorageQuotaAllocator {
    StorageQuotaAllocator::new(
        Arc::new(MemoryQuotaStore::new()),
        registry(backends),
        QuotaLimits {
            bucket_count,
            capacity_bytes,
        },
    )
}

#[tokio::test]
async fn rotates_then_exhausts() {
    let allocator = allocator(2, 1000, 2);

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
async fn exhaustion_is_permanent_until_reset() {
    let allocator = allocator(1, 100, 1);

    assert_eq!(allocator.allocate(100).await, Err(AllocationError::CapacityExhausted));
    // Even a tiny file is refused now.
    assert_eq!(allocator.allocate(1).await, Err(AllocationError::CapacityExhausted));

    allocator.reset().await.unwrap();
    assert_eq!(allocator.allocate(1).await, Ok(0));
}

#[tokio::test]
async fn exactly_filling_a_bucket_rotates() {
    let allocator = allocator(3, 1000, 3);

    assert_eq!(allocator.allocate(400).await, Ok(0));
    // 400 + 600 == capacity, so this goes to the next bucket.
    assert_eq!(allocator.allocate(600).await, Ok(1));
    assert_eq!(allocator.allocate(399).await, Ok(1));
}

#[tokio::test]
async fn rotated_buckets_are_never_reused() {
    let allocator = allocator(3, 1000, 3);

    assert_eq!(allocator.allocate(900).await, Ok(0));
    assert_eq!(allocator.allocate(200).await, Ok(1));
    // Bucket 0 still has room for 50 bytes but the cursor has moved on.
    assert_eq!(allocator.allocate(50).await, Ok(1));
}

#[tokio::test]
async fn missing_backend_is_reported() {
    // Three buckets configured, credentials for only the first one.
    let allocator = allocator(3, 1000, 1);

    assert_eq!(allocator.allocate(900).await, Ok(0));
    assert_eq!(
        allocator.allocate(200).await,
        Err(AllocationError::BackendUnavailable { index: 1 })
    );

    let status = allocator.status().await.unwrap();
    assert_eq!(status.current_index, 1);
    assert!(!status.exhausted);
    assert_eq!(status.bytes_used, vec![900]);
}

#[tokio::test]
async fn release_returns_reserved_bytes() {
    let allocator = allocator(2, 1000, 2);

    assert_eq!(allocator.allocate(700).await, Ok(0));
    allocator.release(0, 700).await.unwrap();
    assert_eq!(allocator.allocate(700).await, Ok(0));

    // Releasing more than was used saturates at zero.
    allocator.release(0, 5000).await.unwrap();
    assert_eq!(allocator.status().await.unwrap().bytes_used, vec![0]);
}

#[tokio::test]
async fn indices_are_monotonic_across_calls() {
    let allocator = allocator(4, 1000, 4);
    let sizes = [300, 500, 250, 10, 700, 100, 900, 50, 999, 1];

    let mut last = 0;
    for size in sizes {
        match allocator.allocate(size).await {
            Ok(index) => {
                assert!(index >= last, "index went back from {} to {}", last, index);
                last = index;
            }
            Err(AllocationError::CapacityExhausted) => break,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
}

#[tokio::test]
async fn concurrent_callers_never_overshoot_rotation() {
    let allocator = Arc::new(allocator(3, 1000, 3));

    let mut handles = Vec::new();
    for _ in 0..40 {
        let allocator = Arc::clone(&allocator);
        handles.push(tokio::spawn(async move { allocator.allocate(100).await }));
    }

    let mut per_bucket = [0u64; 3];
    let mut exhausted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(index) => per_bucket[index] += 100,
            Err(AllocationError::CapacityExhausted) => exhausted += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    // Each bucket takes nine 100-byte files before 900 + 100 >= 1000 rotates.
    assert_eq!(per_bucket, [900, 900, 900]);
    assert_eq!(exhausted, 13);

    let status = allocator.status().await.unwrap();
    assert_eq!(status.current_index, 3);
    assert_eq!(status.bytes_used, vec![900, 900, 900]);
}

#[test]
fn bucket_state_admit_is_a_pure_transition() {
    let limits = QuotaLimits {
        bucket_count: 2,
        capacity_bytes: 1000,
    };
    let always = |_: usize| true;

    let mut state = BucketState::default();
    assert_eq!(state.admit(600, &limits, &always), Ok(0));
    assert_eq!(state.admit(500, &limits, &always), Ok(1));
    assert_eq!(
        state,
        BucketState {
            current_index: 1,
            bytes_used: vec![600, 500],
        }
    );
    assert_eq!(state.admit(600, &limits, &always), Err(AllocationError::CapacityExhausted));
    assert_eq!(state.current_index, 2);
    assert!(state.is_exhausted(&limits));
}

#[tokio::test]
async fn signed_urls_are_cached_per_path() {
    let store = MemoryBlobStore::new("media");
    store
        .upload("quiz_downloads/1/questions/a_questions.pdf", b"pdf".to_vec(), "application/pdf")
        .await
        .unwrap();

    let cache = SignedUrlCache::new();
    let first = cache
        .get_or_sign(0, &store, "quiz_downloads/1/questions/a_questions.pdf", 3600)
        .await
        .unwrap();
    let second = cache
        .get_or_sign(0, &store, "quiz_downloads/1/questions/a_questions.pdf", 60)
        .await
        .unwrap();

    // Second call is served from the cache, so it still carries the first TTL.
    assert_eq!(first, second);
    assert!(first.contains("expires_in=3600"));

    let missing = cache.get_or_sign(0, &store, "nope.pdf", 3600).await;
    assert!(missing.is_err());
}
