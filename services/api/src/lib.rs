//! Shopping API service for the Basket application
//!
//! Products, the cart and its checkout, the purchase ledger and price history,
//! all scoped to the user behind the presented access token.

pub mod analysis;
pub mod error;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod state;
pub mod validation;

pub use state::AppState;
