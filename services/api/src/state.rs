//! Application state for the API service

use common::jwt::JwtService;
use sqlx::PgPool;

use crate::repositories::{CartRepository, ProductRepository, PurchaseRepository};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    /// Verify-only; the api service never issues tokens
    pub jwt_service: JwtService,
    pub product_repository: ProductRepository,
    pub cart_repository: CartRepository,
    pub purchase_repository: PurchaseRepository,
}

impl AppState {
    pub fn new(db_pool: PgPool, jwt_service: JwtService) -> Self {
        Self {
            product_repository: ProductRepository::new(db_pool.clone()),
            cart_repository: CartRepository::new(db_pool.clone()),
            purchase_repository: PurchaseRepository::new(db_pool.clone()),
            db_pool,
            jwt_service,
        }
    }
}
