//! Cart models

use chrono::{DateTime, Utc};
use common::validation::FieldErrors;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::validation::{money, validate_quantity};

/// A cart line joined with its product's current name and price
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CartItem {
    pub product_id: Uuid,
    pub name: String,
    pub category: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The caller's cart with its running total
#[derive(Debug, Serialize)]
pub struct Cart {
    pub items: Vec<CartItem>,
    /// Number of distinct products
    pub items_count: i64,
    pub total: Decimal,
}

impl Cart {
    pub fn new(items: Vec<CartItem>) -> Self {
        let items_count = items.len() as i64;
        let total = money(items.iter().map(|item| item.line_total).sum());
        Self {
            items,
            items_count,
            total,
        }
    }
}

/// Body of `POST /cart/`
#[derive(Debug, Deserialize)]
pub struct AddCartItemRequest {
    pub product_id: Option<Uuid>,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

impl AddCartItemRequest {
    pub fn validate(&self) -> Result<(Uuid, i32), FieldErrors> {
        let mut errors = FieldErrors::new();
        if self.product_id.is_none() {
            errors.add("product_id", "Product is required");
        }
        errors.check("quantity", validate_quantity(self.quantity));
        errors.into_result()?;

        Ok((self.product_id.unwrap_or_default(), self.quantity as i32))
    }
}

/// Body of `PATCH /cart/items/{product_id}/`
#[derive(Debug, Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: Option<i64>,
}

impl SetQuantityRequest {
    pub fn validate(&self) -> Result<i32, FieldErrors> {
        let quantity = self
            .quantity
            .ok_or_else(|| FieldErrors::single("quantity", "Quantity is required"))?;
        validate_quantity(quantity).map_err(|message| FieldErrors::single("quantity", message))?;
        Ok(quantity as i32)
    }
}
