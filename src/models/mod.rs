// src/models/mod.rs

pub mod download;
pub mod question;
pub mod quiz_attempt;
pub mod topic;
pub mod user;
