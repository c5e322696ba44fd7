// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::{
    config::{Config, QuotaStoreKind, StorageBackendKind},
    services::{
        blob_store::{BlobError, BlobRegistry, BlobStore, MemoryBlobStore, SignedUrlCache, SupabaseStorage},
        quota_store::{MemoryQuotaStore, PgQuotaStore, QuotaStore},
        storage_quota::{QuotaLimits, StorageQuotaAllocator},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub blobs: Arc<BlobRegistry>,
    pub allocator: Arc<StorageQuotaAllocator>,
    pub signed_urls: Arc<SignedUrlCache>,
}

impl AppState {
    /// Wires the storage backends and quota store described by `config`.
    pub fn new(pool: PgPool, config: Config) -> Result<Self, BlobError> {
        let storage = &config.storage;

        let backends: Vec<Arc<dyn BlobStore>> = match storage.backend {
            StorageBackendKind::Supabase => storage
                .backends
                .iter()
                .map(|creds| {
                    SupabaseStorage::new(&creds.url, &creds.key, &storage.media_bucket)
                        .map(|s| Arc::new(s) as Arc<dyn BlobStore>)
                })
                .collect::<Result<_, _>>()?,
            StorageBackendKind::Memory => (0..storage.bucket_count)
                .map(|_| Arc::new(MemoryBlobStore::new(&storage.media_bucket)) as Arc<dyn BlobStore>)
                .collect(),
        };
        let blobs = Arc::new(BlobRegistry::new(backends));

        if blobs.len() < storage.bucket_count {
            tracing::warn!(
                "{} storage buckets configured but only {} backends available",
                storage.bucket_count,
                blobs.len()
            );
        }

        let quota_store: Arc<dyn QuotaStore> = match storage.quota_store {
            QuotaStoreKind::Postgres => Arc::new(PgQuotaStore::new(pool.clone())),
            QuotaStoreKind::Memory => Arc::new(MemoryQuotaStore::new()),
        };

        let limits = QuotaLimits {
            bucket_count: storage.bucket_count,
            capacity_bytes: storage.capacity_bytes,
        };

        Ok(Self::with_storage(pool, config, blobs, quota_store, limits))
    }

    /// Builds the state around explicitly provided storage pieces.
    pub fn with_storage(
        pool: PgPool,
        config: Config,
        blobs: Arc<BlobRegistry>,
        quota_store: Arc<dyn QuotaStore>,
        limits: QuotaLimits,
    ) -> Self {
        let allocator = Arc::new(StorageQuotaAllocator::new(
            quota_store,
            Arc::clone(&blobs),
            limits,
        ));

        Self {
            pool,
            config,
            blobs,
            allocator,
            signed_urls: Arc::new(SignedUrlCache::new()),
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<StorageQuotaAllocator> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.allocator)
    }
}
