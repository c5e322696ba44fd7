// src/services/blob_store.rs

//! Object storage backends for quiz downloads.
//!
//! Each storage bucket index maps to one backend (its own credentials and
//! capacity). The allocator decides the index, this module moves the bytes.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

#[derive(Debug)]
pub enum BlobError {
    /// Misconfigured backend (bad endpoint, missing key).
    Config(String),
    /// Transport-level failure talking to the backend.
    Request(String),
    /// The backend answered with a non-success status.
    Rejected { status: u16, body: String },
    NotFound(String),
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobError::Config(msg) => write!(f, "storage backend misconfigured: {}", msg),
            BlobError::Request(msg) => write!(f, "storage request failed: {}", msg),
            BlobError::Rejected { status, body } => {
                write!(f, "storage backend returned {}: {}", status, body)
            }
            BlobError::NotFound(path) => write!(f, "object not found: {}", path),
        }
    }
}

impl std::error::Error for BlobError {}

impl From<reqwest::Error> for BlobError {
    fn from(err: reqwest::Error) -> Self {
        BlobError::Request(err.to_string())
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError>;

    /// Returns a time-limited download URL for `path`.
    async fn signed_url(&self, path: &str, expires_in: u64) -> Result<String, BlobError>;

    /// Name of the bucket inside the backend, used in cache keys.
    fn bucket(&self) -> &str;
}

/// Supabase Storage over its REST API.
#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    client: Client,
    endpoint: Url,
    api_key: String,
    bucket: String,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

impl SupabaseStorage {
    pub fn new(endpoint: &str, api_key: &str, bucket: &str) -> Result<Self, BlobError> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| BlobError::Config(format!("{}: {}", endpoint, e)))?;
        if endpoint.host_str().is_none() {
            return Err(BlobError::Config("endpoint must include a host".to_string()));
        }
        if api_key.is_empty() {
            return Err(BlobError::Config("api key is empty".to_string()));
        }

        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()?,
            endpoint,
            api_key: api_key.to_string(),
            bucket: bucket.to_string(),
        })
    }

    /// `{endpoint}/storage/v1/{prefix...}/{bucket}/{path}` with every segment
    /// percent-encoded.
    fn object_url(&self, prefix: &[&str], path: &str) -> Result<Url, BlobError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| BlobError::Config("endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(["storage", "v1"])
            .extend(prefix)
            .push(&self.bucket)
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BlobError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound(body));
        }
        Err(BlobError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl BlobStore for SupabaseStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError> {
        let url = self.object_url(&["object"], path)?;
        tracing::debug!("Uploading {} bytes to {}", bytes.len(), url);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn signed_url(&self, path: &str, expires_in: u64) -> Result<String, BlobError> {
        let url = self.object_url(&["object", "sign"], path)?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "expiresIn": expires_in }))
            .send()
            .await?;

        let signed: SignedUrlResponse = Self::check(response).await?.json().await?;

        // The API answers with a path relative to `/storage/v1`.
        let mut full = self.endpoint.clone();
        let base_path = full.path().trim_end_matches('/').to_string();
        let (relative, query) = match signed.signed_url.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (signed.signed_url.clone(), None),
        };
        full.set_path(&format!("{}/storage/v1{}", base_path, relative));
        full.set_query(query.as_deref());
        Ok(full.to_string())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Keeps objects in process memory. Used when `STORAGE_BACKEND=memory` and
/// in tests.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    bucket: String,
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryBlobStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(path).map(|(bytes, _)| bytes.clone()))
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| BlobError::Request("memory store lock poisoned".to_string()))?;
        objects.insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn signed_url(&self, path: &str, expires_in: u64) -> Result<String, BlobError> {
        let exists = self
            .objects
            .lock()
            .map_err(|_| BlobError::Request("memory store lock poisoned".to_string()))?
            .contains_key(path);
        if !exists {
            return Err(BlobError::NotFound(path.to_string()));
        }
        Ok(format!(
            "memory://{}/{}?expires_in={}",
            self.bucket, path, expires_in
        ))
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Backends by storage bucket index.
#[derive(Default)]
pub struct BlobRegistry {
    backends: Vec<Arc<dyn BlobStore>>,
}

impl BlobRegistry {
    pub fn new(backends: Vec<Arc<dyn BlobStore>>) -> Self {
        Self { backends }
    }

    pub fn get(&self, index: usize) -> Option<Arc<dyn BlobStore>> {
        self.backends.get(index).cloned()
    }

    pub fn contains(&self, index: usize) -> bool {
        index < self.backends.len()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// In-process cache of signed download URLs.
///
/// Entries expire ten seconds before the URL itself does.
#[derive(Debug, Default)]
pub struct SignedUrlCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

const SIGNED_URL_EXPIRY_BUFFER_SECS: u64 = 10;

impl SignedUrlCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((url, valid_until)) if *valid_until > Instant::now() => Some(url.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn get_or_sign(
        &self,
        index: usize,
        store: &dyn BlobStore,
        path: &str,
        expires_in: u64,
    ) -> Result<String, BlobError> {
        let key = format!("signed_url:{}:{}:{}", index, store.bucket(), path);
        if let Some(url) = self.lookup(&key) {
            return Ok(url);
        }

        let url = store.signed_url(path, expires_in).await?;

        let ttl = expires_in.saturating_sub(SIGNED_URL_EXPIRY_BUFFER_SECS);
        if ttl > 0 {
            if let Ok(mut entries) = self.entries.lock() {
                let now = Instant::now();
                entries.retain(|_, (_, valid_until)| *valid_until > now);
                entries.insert(key, (url.clone(), now + Duration::from_secs(ttl)));
            }
        }
        Ok(url)
    }

    /// Number of cached URLs, expired ones included until the next insert.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with(paths: &[&str]) -> MemoryBlobStore {
        let store = MemoryBlobStore::new("media");
        for path in paths {
            store.upload(path, b"x".to_vec(), "text/plain").await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_on_insert() {
        let store = store_with(&["a.txt", "b.txt"]).await;
        let cache = SignedUrlCache::new();

        // Cached for one second.
        cache.get_or_sign(0, &store, "a.txt", 11).await.unwrap();
        assert_eq!(cache.len(), 1);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        cache.get_or_sign(0, &store, "b.txt", 3600).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup("signed_url:0:media:a.txt").is_none());
        assert!(cache.lookup("signed_url:0:media:b.txt").is_some());
    }

    #[tokio::test]
    async fn short_lived_urls_are_not_cached() {
        let store = store_with(&["a.txt"]).await;
        let cache = SignedUrlCache::new();

        cache.get_or_sign(0, &store, "a.txt", 10).await.unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn registry_reports_missing_indices() {
        let registry = BlobRegistry::new(vec![Arc::new(MemoryBlobStore::new("media")) as Arc<dyn BlobStore>]);
        assert!(registry.contains(0));
        assert!(!registry.contains(1));
        assert!(registry.get(1).is_none());
    }
}
