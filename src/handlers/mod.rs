// src/handlers/mod.rs

pub mod admin;
pub mod auth;
pub mod downloads;
pub mod quiz;
pub mod topics;
