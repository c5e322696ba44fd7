// src/services/quota_store.rs

use std::sync::Mutex;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::services::storage_quota::{AllocationError, BucketState, QuotaLimits};

/// Backing store for the bucket rotation counters.
///
/// `admit` must run [`BucketState::admit`] as one exclusive read-modify-write,
/// and must persist the resulting state even when it returns an error.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn admit(
        &self,
        size: u64,
        limits: QuotaLimits,
        has_backend: &(dyn Fn(usize) -> bool + Send + Sync),
    ) -> Result<usize, AllocationError>;

    async fn release(&self, index: usize, size: u64) -> Result<(), AllocationError>;

    async fn snapshot(&self) -> Result<BucketState, AllocationError>;

    async fn reset(&self) -> Result<(), AllocationError>;
}

/// In-process counters for single-instance deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryQuotaStore {
    state: Mutex<BucketState>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BucketState>, AllocationError> {
        self.state
            .lock()
            .map_err(|_| AllocationError::Store("quota state lock poisoned".to_string()))
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn admit(
        &self,
        size: u64,
        limits: QuotaLimits,
        has_backend: &(dyn Fn(usize) -> bool + Send + Sync),
    ) -> Result<usize, AllocationError> {
        let mut state = self.lock()?;
        state.admit(size, &limits, has_backend)
    }

    async fn release(&self, index: usize, size: u64) -> Result<(), AllocationError> {
        self.lock()?.release(index, size);
        Ok(())
    }

    async fn snapshot(&self) -> Result<BucketState, AllocationError> {
        Ok(self.lock()?.clone())
    }

    async fn reset(&self) -> Result<(), AllocationError> {
        *self.lock()? = BucketState::default();
        Ok(())
    }
}

/// Counters shared by every instance through Postgres.
///
/// The single `storage_quota_cursor` row is locked `FOR UPDATE` for the whole
/// transition, which serialises concurrent uploads across instances.
#[derive(Debug, Clone)]
pub struct PgQuotaStore {
    pool: PgPool,
}

impl PgQuotaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Takes the row lock that serialises every change to the counters and
/// returns the cursor.
async fn lock_cursor(conn: &mut sqlx::PgConnection) -> Result<i32, AllocationError> {
    let current: i32 =
        sqlx::query_scalar("SELECT current_index FROM storage_quota_cursor WHERE id = 1 FOR UPDATE")
            .fetch_one(&mut *conn)
            .await?;
    Ok(current)
}

async fn load_usage(
    conn: &mut sqlx::PgConnection,
    current_index: i32,
) -> Result<BucketState, AllocationError> {
    let rows: Vec<(i32, i64)> = sqlx::query_as(
        "SELECT bucket_index, bytes_used FROM storage_bucket_usage ORDER BY bucket_index",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut state = BucketState {
        current_index: current_index.max(0) as usize,
        bytes_used: Vec::new(),
    };
    for (index, used) in rows {
        let index = index.max(0) as usize;
        if state.bytes_used.len() <= index {
            state.bytes_used.resize(index + 1, 0);
        }
        state.bytes_used[index] = used.max(0) as u64;
    }
    Ok(state)
}

#[async_trait]
impl QuotaStore for PgQuotaStore {
    async fn admit(
        &self,
        size: u64,
        limits: QuotaLimits,
        has_backend: &(dyn Fn(usize) -> bool + Send + Sync),
    ) -> Result<usize, AllocationError> {
        let mut tx = self.pool.begin().await?;

        let current = lock_cursor(&mut *tx).await?;

        let mut state = load_usage(&mut *tx, current).await?;
        let outcome = state.admit(size, &limits, has_backend);

        if state.current_index as i32 != current {
            sqlx::query("UPDATE storage_quota_cursor SET current_index = $1 WHERE id = 1")
                .bind(state.current_index as i32)
                .execute(&mut *tx)
                .await?;
        }

        // Relative update: usage rows are only ever changed by deltas.
        if let Ok(index) = outcome {
            sqlx::query(
                r#"
                INSERT INTO storage_bucket_usage (bucket_index, bytes_used)
                VALUES ($1, $2)
                ON CONFLICT (bucket_index)
                DO UPDATE SET bytes_used = storage_bucket_usage.bytes_used + EXCLUDED.bytes_used
                "#,
            )
            .bind(index as i32)
            .bind(size as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        outcome
    }

    async fn release(&self, index: usize, size: u64) -> Result<(), AllocationError> {
        let mut tx = self.pool.begin().await?;

        // Same lock as `admit`, so a release never lands between its read
        // and its write.
        lock_cursor(&mut *tx).await?;

        sqlx::query(
            r#"
            UPDATE storage_bucket_usage
            SET bytes_used = GREATEST(0, bytes_used - $2)
            WHERE bucket_index = $1
            "#,
        )
        .bind(index as i32)
        .bind(size as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn snapshot(&self) -> Result<BucketState, AllocationError> {
        let mut conn = self.pool.acquire().await?;
        let current: i32 =
            sqlx::query_scalar("SELECT current_index FROM storage_quota_cursor WHERE id = 1")
                .fetch_one(&mut *conn)
                .await?;
        load_usage(&mut *conn, current).await
    }

    async fn reset(&self) -> Result<(), AllocationError> {
        let mut tx = self.pool.begin().await?;
        lock_cursor(&mut *tx).await?;
        sqlx::query("UPDATE storage_quota_cursor SET current_index = 0 WHERE id = 1")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM storage_bucket_usage")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
