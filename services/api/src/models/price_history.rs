//! Price history models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Query string of `GET /purchases/price-history/`
#[derive(Debug, Default, Deserialize)]
pub struct PriceHistoryQuery {
    pub product_id: Option<Uuid>,
    /// Case-insensitive substring of the line name
    pub name: Option<String>,
}

/// One purchased line as read from the ledger
#[derive(Debug, Clone, FromRow)]
pub struct PriceObservation {
    pub product_id: Option<Uuid>,
    pub name: String,
    pub purchase_id: Uuid,
    pub purchased_at: DateTime<Utc>,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub purchase_id: Uuid,
    pub purchased_at: DateTime<Utc>,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSummary {
    pub min_price: Decimal,
    pub max_price: Decimal,
    /// Weighted by quantity
    pub average_price: Decimal,
    pub first_price: Decimal,
    pub latest_price: Decimal,
    /// `latest_price - first_price`
    pub change: Decimal,
}

/// Price over time for one product in one currency
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    pub key: String,
    pub product_id: Option<Uuid>,
    pub name: String,
    pub currency: String,
    pub points: Vec<PricePoint>,
    pub summary: PriceSummary,
}
