//! Authentication service for the Basket application
//!
//! Issues RS256 access/refresh token pairs for email/password credentials,
//! refreshes and revokes them, and manages the caller's account profile.

pub mod blacklist;
pub mod error;
pub mod middleware;
pub mod models;
pub mod rate_limiter;
pub mod repositories;
pub mod routes;
pub mod state;
pub mod validation;

pub use state::AppState;
