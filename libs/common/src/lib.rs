//! Common library for the Basket application
//!
//! This crate provides shared functionality used by the `auth` and `api`
//! services: database connectivity and migrations, the Redis cache, JWT
//! handling, error types, input validation helpers and server settings.

pub mod cache;
pub mod database;
pub mod error;
pub mod jwt;
pub mod settings;
pub mod validation;
