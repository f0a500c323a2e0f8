//! API service routes

use axum::{
    Json, Router,
    extract::State,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{AppState, middleware::auth_middleware};

pub mod cart;
pub mod products;
pub mod purchases;

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/products/",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/products/:id/",
            get(products::get_product)
                .patch(products::update_product)
                .delete(products::delete_product),
        )
        .route(
            "/cart/",
            get(cart::get_cart)
                .post(cart::add_item)
                .delete(cart::clear_cart),
        )
        .route(
            "/cart/items/:product_id/",
            patch(cart::set_quantity).delete(cart::remove_item),
        )
        .route("/cart/checkout/", post(cart::checkout))
        .route(
            "/purchases/",
            get(purchases::list_purchases).post(purchases::create_purchase),
        )
        .route("/purchases/price-history/", get(purchases::price_history))
        .route(
            "/purchases/:id/",
            get(purchases::get_purchase).delete(purchases::delete_purchase),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/api/health/", get(health_check))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = common::database::health_check(&state.db_pool)
        .await
        .unwrap_or(false);

    Json(json!({
        "status": "ok",
        "service": "api-service",
        "database": database,
    }))
}
