// src/services/mod.rs

pub mod blob_store;
pub mod grading;
pub mod quiz_source;
pub mod quota_store;
pub mod stats;
pub mod storage_quota;
