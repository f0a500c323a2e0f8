//! Product catalog handlers

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use crate::{
    AppState,
    error::{ApiError, ApiResult},
    middleware::AuthUser,
    models::{CreateProductRequest, Page, ProductQuery, ProductUpdate},
};

/// List the caller's products
pub async fn list_products(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Query(query), _): WithRejection<Query<ProductQuery>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let pagination = query.pagination();
    let (items, total) = state
        .product_repository
        .list(auth.id, &query, pagination)
        .await?;

    Ok(Json(Page::new(items, pagination, total)))
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Json(payload), _): WithRejection<Json<CreateProductRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let product = payload.validate()?;
    let created = state.product_repository.create(auth.id, &product).await?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let product = state
        .product_repository
        .get(auth.id, id)
        .await?
        .ok_or(ApiError::NotFound("Product"))?;

    Ok(Json(product))
}

/// Partially update a product; recorded purchases keep their prices
pub async fn update_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(payload), _): WithRejection<Json<ProductUpdate>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let update = payload.validate()?;
    let product = state
        .product_repository
        .update(auth.id, id, &update)
        .await?;

    Ok(Json(product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    state.product_repository.delete(auth.id, id).await?;

    Ok(StatusCode::NO_CONTENT)
}
