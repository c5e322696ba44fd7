// src/services/storage_quota.rs

//! Bucket rotation for quiz-download uploads.
//!
//! Uploads fill storage buckets strictly in order. Once the current bucket
//! cannot take a file, the cursor moves to the next bucket and never comes
//! back. When the cursor runs past the last bucket every further upload fails
//! until an operator resets the state.

use std::{fmt, sync::Arc};

use serde::Serialize;

use crate::services::{blob_store::BlobRegistry, quota_store::QuotaStore};

/// Fixed allocation limits, read once from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaLimits {
    pub bucket_count: usize,
    pub capacity_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// Every bucket has been rotated past.
    CapacityExhausted,
    /// No storage backend is configured for the selected bucket.
    BackendUnavailable { index: usize },
    /// The shared counter store failed.
    Store(String),
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationError::CapacityExhausted => write!(f, "all storage buckets are full"),
            AllocationError::BackendUnavailable { index } => {
                write!(f, "no storage backend for bucket {}", index)
            }
            AllocationError::Store(msg) => write!(f, "quota store error: {}", msg),
        }
    }
}

impl std::error::Error for AllocationError {}

impl From<sqlx::Error> for AllocationError {
    fn from(err: sqlx::Error) -> Self {
        AllocationError::Store(err.to_string())
    }
}

/// Shared rotation state: the cursor plus per-bucket usage.
///
/// `current_index == bucket_count` means exhausted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BucketState {
    pub current_index: usize,
    pub bytes_used: Vec<u64>,
}

impl BucketState {
    pub fn used(&self, index: usize) -> u64 {
        self.bytes_used.get(index).copied().unwrap_or(0)
    }

    pub fn is_exhausted(&self, limits: &QuotaLimits) -> bool {
        self.current_index >= limits.bucket_count
    }

    fn slot(&mut self, index: usize) -> &mut u64 {
        if self.bytes_used.len() <= index {
            self.bytes_used.resize(index + 1, 0);
        }
        &mut self.bytes_used[index]
    }

    /// Admits a file of `size` bytes and returns the bucket it goes to.
    ///
    /// A rotation is kept even when the call fails afterwards: the bucket it
    /// left was already too full for this file.
    pub fn admit(
        &mut self,
        size: u64,
        limits: &QuotaLimits,
        has_backend: &(dyn Fn(usize) -> bool + Send + Sync),
    ) -> Result<usize, AllocationError> {
        if self.is_exhausted(limits) {
            self.current_index = limits.bucket_count;
            return Err(AllocationError::CapacityExhausted);
        }

        // `>=` so a file that would exactly fill the bucket goes to the next one.
        if self.used(self.current_index).saturating_add(size) >= limits.capacity_bytes {
            self.current_index += 1;
            if self.current_index >= limits.bucket_count {
                self.current_index = limits.bucket_count;
                return Err(AllocationError::CapacityExhausted);
            }
        }

        let index = self.current_index;
        if !has_backend(index) {
            return Err(AllocationError::BackendUnavailable { index });
        }

        *self.slot(index) += size;
        Ok(index)
    }

    /// Gives back bytes reserved for an upload that never landed.
    pub fn release(&mut self, index: usize, size: u64) {
        if let Some(used) = self.bytes_used.get_mut(index) {
            *used = used.saturating_sub(size);
        }
    }
}

/// Allocator state as shown to operators.
#[derive(Debug, Serialize)]
pub struct QuotaStatus {
    pub limits: QuotaLimits,
    pub current_index: usize,
    pub exhausted: bool,
    pub bytes_used: Vec<u64>,
}

/// Picks the storage bucket for each upload.
///
/// The counters live in an injected [`QuotaStore`], so several service
/// instances can share them through Postgres.
pub struct StorageQuotaAllocator {
    store: Arc<dyn QuotaStore>,
    backends: Arc<BlobRegistry>,
    limits: QuotaLimits,
}

impl StorageQuotaAllocator {
    pub fn new(store: Arc<dyn QuotaStore>, backends: Arc<BlobRegistry>, limits: QuotaLimits) -> Self {
        Self {
            store,
            backends,
            limits,
        }
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    pub async fn allocate(&self, file_size_bytes: u64) -> Result<usize, AllocationError> {
        let backends = Arc::clone(&self.backends);
        let has_backend = move |index: usize| backends.contains(index);
        self.store
            .admit(file_size_bytes, self.limits, &has_backend)
            .await
    }

    /// Reverts the usage recorded by a successful [`allocate`](Self::allocate)
    /// whose upload then failed. The cursor is left where it is.
    pub async fn release(&self, index: usize, file_size_bytes: u64) -> Result<(), AllocationError> {
        self.store.release(index, file_size_bytes).await
    }

    pub async fn status(&self) -> Result<QuotaStatus, AllocationError> {
        let state = self.store.snapshot().await?;
        Ok(QuotaStatus {
            limits: self.limits,
            current_index: state.current_index.min(self.limits.bucket_count),
            exhausted: state.is_exhausted(&self.limits),
            bytes_used: state.bytes_used,
        })
    }

    /// Operator reset: back to bucket 0 with all usage cleared.
    pub async fn reset(&self) -> Result<(), AllocationError> {
        self.store.reset().await
    }
}
