// src/config.rs

use std::{env, fmt};

use dotenvy::dotenv;

use crate::services::quiz_source::QuizSourcingPolicy;

/// Attempts kept per user; older ones are deleted after each save.
pub const ATTEMPTS_KEPT_PER_USER: i64 = 5;

/// 1 GiB per storage bucket.
pub const DEFAULT_CAPACITY_BYTES: u64 = 1024 * 1024 * 1024;

pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 60 * 60;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

pub const DEFAULT_QUIZ_QUESTION_COUNT: i64 = 10;
pub const MAX_QUIZ_QUESTION_COUNT: i64 = 50;

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: String, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} must be set", key),
            ConfigError::Invalid { key, reason } => write!(f, "{} is invalid: {}", key, reason),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaStoreKind {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendKind {
    Supabase,
    Memory,
}

/// Credentials of one storage backend.
#[derive(Debug, Clone)]
pub struct BackendCredentials {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    pub quota_store: QuotaStoreKind,
    pub media_bucket: String,
    /// Indexed by storage bucket. May be shorter than `bucket_count`; the
    /// missing indices are reported as unavailable at upload time.
    pub backends: Vec<BackendCredentials>,
    pub bucket_count: usize,
    pub capacity_bytes: u64,
    pub signed_url_ttl_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub quiz_sourcing: QuizSourcingPolicy,
    pub storage: StorageConfig,
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn parsed<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            key: key.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Reads `SUPABASE_URL_0`, `SUPABASE_KEY_0`, `SUPABASE_URL_1`, ... until the
/// first gap. `SUPABASE_URL` / `SUPABASE_KEY` stand in for index 0.
fn backend_credentials() -> Vec<BackendCredentials> {
    let mut backends = Vec::new();
    for index in 0.. {
        let url = env::var(format!("SUPABASE_URL_{}", index))
            .or_else(|e| if index == 0 { env::var("SUPABASE_URL") } else { Err(e) });
        let key = env::var(format!("SUPABASE_KEY_{}", index))
            .or_else(|e| if index == 0 { env::var("SUPABASE_KEY") } else { Err(e) });
        match (url, key) {
            (Ok(url), Ok(key)) => backends.push(BackendCredentials { url, key }),
            _ => break,
        }
    }
    backends
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match env::var("STORAGE_BACKEND").as_deref() {
            Ok("memory") => StorageBackendKind::Memory,
            Ok("supabase") | Err(_) => StorageBackendKind::Supabase,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    key: "STORAGE_BACKEND".to_string(),
                    reason: format!("unknown backend '{}'", other),
                });
            }
        };

        let quota_store = match env::var("QUOTA_STORE").as_deref() {
            Ok("memory") => QuotaStoreKind::Memory,
            Ok("postgres") | Err(_) => QuotaStoreKind::Postgres,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    key: "QUOTA_STORE".to_string(),
                    reason: format!("unknown store '{}'", other),
                });
            }
        };

        let backends = match backend {
            StorageBackendKind::Supabase => backend_credentials(),
            StorageBackendKind::Memory => Vec::new(),
        };

        let default_count = match backend {
            StorageBackendKind::Supabase => backends.len(),
            StorageBackendKind::Memory => 1,
        };
        let bucket_count = parsed("STORAGE_BUCKET_COUNT", default_count)?;
        if bucket_count == 0 {
            return Err(ConfigError::Invalid {
                key: "STORAGE_BUCKET_COUNT".to_string(),
                reason: "at least one storage bucket is required".to_string(),
            });
        }

        Ok(Self {
            backend,
            quota_store,
            media_bucket: env::var("SUPABASE_MEDIA_BUCKET").unwrap_or_else(|_| "media".to_string()),
            backends,
            bucket_count,
            capacity_bytes: parsed("STORAGE_CAPACITY_BYTES", DEFAULT_CAPACITY_BYTES)?,
            signed_url_ttl_secs: parsed("SIGNED_URL_TTL_SECS", DEFAULT_SIGNED_URL_TTL_SECS)?,
        })
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = required("DATABASE_URL")?;

        let jwt_secret = required("JWT_SECRET")?;

        let jwt_expiration = parsed("JWT_EXPIRATION", 24 * 60 * 60)?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_email: env::var("ADMIN_EMAIL").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            quiz_sourcing: parsed("QUIZ_SOURCING_POLICY", QuizSourcingPolicy::PreferCache)?,
            storage: StorageConfig::from_env()?,
        })
    }
}
