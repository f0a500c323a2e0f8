//! Cart handlers

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use common::validation::FieldErrors;
use uuid::Uuid;

use crate::{
    AppState,
    error::{ApiError, ApiResult},
    middleware::AuthUser,
    models::{
        AddCartItemRequest, Cart, CheckoutRequest, SetQuantityRequest,
        purchase::DEFAULT_CART_NAME,
    },
    repositories::CreateOutcome,
    routes::purchases::idempotency_header,
};

/// Current cart with line totals and the cart total
pub async fn get_cart(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let items = state.cart_repository.list(auth.id).await?;

    Ok(Json(Cart::new(items)))
}

/// Add a product; adding it again increments the quantity
pub async fn add_item(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Json(payload), _): WithRejection<Json<AddCartItemRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let (product_id, quantity) = payload.validate()?;
    let item = state
        .cart_repository
        .add(auth.id, product_id, quantity)
        .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn set_quantity(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Path(product_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(payload), _): WithRejection<Json<SetQuantityRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let quantity = payload.validate()?;
    let item = state
        .cart_repository
        .set_quantity(auth.id, product_id, quantity)
        .await?;

    Ok(Json(item))
}

pub async fn remove_item(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Path(product_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    state.cart_repository.remove(auth.id, product_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_cart(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    state.cart_repository.clear(auth.id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Record the cart as a purchase and empty it, all or nothing
///
/// The body is optional; without one the purchase gets default metadata.
pub async fn checkout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let details: CheckoutRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CheckoutRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::Validation(FieldErrors::single("body", e.to_string())))?
    };
    let meta = details.validate(Some(DEFAULT_CART_NAME), idempotency_header(&headers))?;

    let response = match state.purchase_repository.checkout(auth.id, &meta).await? {
        CreateOutcome::Created(purchase) => (StatusCode::CREATED, Json(purchase)),
        CreateOutcome::Existing(purchase) => (StatusCode::OK, Json(purchase)),
    };
    Ok(response)
}
