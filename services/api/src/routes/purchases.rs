//! Purchase history and price analysis handlers

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use crate::{
    AppState, analysis,
    error::{ApiError, ApiResult},
    middleware::AuthUser,
    models::{CreatePurchaseRequest, Page, PriceHistoryQuery, PurchaseQuery, product::non_blank},
    repositories::CreateOutcome,
};

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

pub(crate) fn idempotency_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Newest purchases first
pub async fn list_purchases(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Query(query), _): WithRejection<Query<PurchaseQuery>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let filter = query.filter()?;
    let pagination = query.pagination();
    let (items, total) = state
        .purchase_repository
        .list(auth.id, &filter, pagination)
        .await?;

    Ok(Json(Page::new(items, pagination, total)))
}

/// Record a purchase from an explicit list of products
pub async fn create_purchase(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    headers: HeaderMap,
    WithRejection(Json(payload), _): WithRejection<Json<CreatePurchaseRequest>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let draft = payload.validate(idempotency_header(&headers))?;

    let response = match state.purchase_repository.create(auth.id, &draft).await? {
        CreateOutcome::Created(purchase) => (StatusCode::CREATED, Json(purchase)),
        CreateOutcome::Existing(purchase) => (StatusCode::OK, Json(purchase)),
    };
    Ok(response)
}

pub async fn get_purchase(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let purchase = state
        .purchase_repository
        .get(auth.id, id)
        .await?
        .ok_or(ApiError::NotFound("Purchase"))?;

    Ok(Json(purchase))
}

/// Hide a purchase from history and analysis
pub async fn delete_purchase(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    state.purchase_repository.soft_delete(auth.id, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Price over time per product
pub async fn price_history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Query(query), _): WithRejection<Query<PriceHistoryQuery>, ApiError>,
) -> ApiResult<impl IntoResponse> {
    let observations = state
        .purchase_repository
        .price_observations(auth.id, query.product_id, non_blank(query.name.as_deref()))
        .await?;

    Ok(Json(analysis::build_series(observations)))
}
