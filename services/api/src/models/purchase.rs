//! Purchase ledger models
//!
//! A purchase is written once, either from the cart or from an explicit list
//! of lines, and afterwards only its `deleted_at` changes. Lines carry the
//! product name and unit price as they were at purchase time.

use chrono::{DateTime, Utc};
use common::validation::FieldErrors;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    models::{Pagination, product::non_blank},
    validation::{
        CART_NAME_MAX, DEFAULT_CURRENCY, IDEMPOTENCY_KEY_MAX, NAME_MAX, STORE_NAME_MAX, money,
        normalize_currency, normalize_tags, validate_optional_text, validate_price,
        validate_quantity, validate_required_text, validate_total,
    },
};

pub const DEFAULT_CART_NAME: &str = "Cart";

/// A recorded purchase with its lines
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Purchase {
    pub id: Uuid,
    #[serde(skip)]
    pub user_id: Uuid,
    pub cart_name: String,
    pub store_name: String,
    pub currency: String,
    pub notes: String,
    pub tags: Vec<String>,
    pub items_count: i32,
    pub total_amount: Decimal,
    pub idempotency_key: Option<String>,
    pub completed_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<PurchaseLine>,
}

/// Snapshot of one purchased product
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PurchaseLine {
    pub id: Uuid,
    #[serde(skip)]
    pub purchase_id: Uuid,
    pub product_id: Option<Uuid>,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

/// A line about to be recorded
#[derive(Debug, Clone, PartialEq)]
pub struct LineDraft {
    pub product_id: Option<Uuid>,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

impl LineDraft {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Validated purchase metadata
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseMeta {
    pub cart_name: String,
    pub store_name: String,
    pub currency: String,
    pub notes: String,
    pub tags: Vec<String>,
    pub idempotency_key: Option<String>,
}

/// A purchase about to be recorded
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseDraft {
    pub meta: PurchaseMeta,
    pub lines: Vec<LineDraft>,
}

impl PurchaseDraft {
    pub fn total(&self) -> Decimal {
        money(self.lines.iter().map(LineDraft::line_total).sum())
    }

    pub fn items_count(&self) -> i32 {
        self.lines.len() as i32
    }

    /// Product references that must belong to the purchaser
    pub fn product_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.lines.iter().filter_map(|line| line.product_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Metadata accepted by both checkout and direct purchase creation
#[derive(Debug, Default, Deserialize)]
pub struct PurchaseDetails {
    pub cart_name: Option<String>,
    pub store_name: Option<String>,
    pub currency: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
    pub idempotency_key: Option<String>,
}

/// Body of `POST /cart/checkout/`
pub type CheckoutRequest = PurchaseDetails;

impl PurchaseDetails {
    /// Validate into metadata; `default_cart_name` applies when no name is sent,
    /// otherwise the name is required. A key in the body wins over `header_key`.
    pub fn validate(
        self,
        default_cart_name: Option<&str>,
        header_key: Option<String>,
    ) -> Result<PurchaseMeta, FieldErrors> {
        let mut errors = FieldErrors::new();

        let cart_name = match non_blank(self.cart_name.as_deref()) {
            Some(name) => name.to_string(),
            None => default_cart_name.unwrap_or_default().to_string(),
        };
        errors.check(
            "cart_name",
            validate_required_text(&cart_name, "Cart name", CART_NAME_MAX),
        );

        let store_name = self.store_name.unwrap_or_default().trim().to_string();
        errors.check(
            "store_name",
            validate_optional_text(&store_name, "Store name", STORE_NAME_MAX),
        );

        let currency = match non_blank(self.currency.as_deref()) {
            Some(code) => normalize_currency(code).unwrap_or_else(|message| {
                errors.add("currency", message);
                String::new()
            }),
            None => DEFAULT_CURRENCY.to_string(),
        };

        let tags = normalize_tags(&self.tags.unwrap_or_default()).unwrap_or_else(|message| {
            errors.add("tags", message);
            Vec::new()
        });

        let idempotency_key = non_blank(self.idempotency_key.as_deref())
            .map(str::to_string)
            .or_else(|| non_blank(header_key.as_deref()).map(str::to_string));
        if let Some(key) = &idempotency_key {
            errors.check(
                "idempotency_key",
                validate_optional_text(key, "Idempotency key", IDEMPOTENCY_KEY_MAX),
            );
        }

        errors.into_result()?;

        Ok(PurchaseMeta {
            cart_name,
            store_name,
            currency,
            notes: self.notes.unwrap_or_default().trim().to_string(),
            tags,
            idempotency_key,
        })
    }
}

/// One line of `POST /purchases/`
#[derive(Debug, Deserialize)]
pub struct PurchaseLineRequest {
    #[serde(default)]
    pub name: String,
    pub price: Option<Decimal>,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    pub product_id: Option<Uuid>,
}

fn default_quantity() -> i64 {
    1
}

impl PurchaseLineRequest {
    fn validate(self) -> Result<LineDraft, FieldErrors> {
        let name = self.name.trim().to_string();

        let mut errors = FieldErrors::new();
        errors.check("name", validate_required_text(&name, "Name", NAME_MAX));
        match self.price {
            Some(price) => errors.check("price", validate_price(price)),
            None => errors.add("price", "Price is required"),
        }
        errors.check("quantity", validate_quantity(self.quantity));
        errors.into_result()?;

        Ok(LineDraft {
            product_id: self.product_id,
            name,
            unit_price: money(self.price.unwrap_or_default()),
            quantity: self.quantity as i32,
        })
    }
}

/// Body of `POST /purchases/`
#[derive(Debug, Deserialize)]
pub struct CreatePurchaseRequest {
    #[serde(flatten)]
    pub details: PurchaseDetails,
    #[serde(default)]
    pub products: Vec<PurchaseLineRequest>,
}

impl CreatePurchaseRequest {
    pub fn validate(self, header_key: Option<String>) -> Result<PurchaseDraft, FieldErrors> {
        let mut errors = FieldErrors::new();
        let meta = self.details.validate(None, header_key);

        if self.products.is_empty() {
            errors.add("products", "At least one product is required");
        }

        let mut lines = Vec::with_capacity(self.products.len());
        for (index, line) in self.products.into_iter().enumerate() {
            match line.validate() {
                Ok(line) => lines.push(line),
                Err(line_errors) => {
                    errors.extend_prefixed(&format!("products[{}]", index), line_errors)
                }
            }
        }

        match meta {
            Ok(meta) if errors.is_empty() => {
                let draft = PurchaseDraft { meta, lines };
                errors.check("total", validate_total(draft.total()));
                errors.into_result()?;
                Ok(draft)
            }
            Ok(_) => Err(errors),
            Err(meta_errors) => {
                errors.extend(meta_errors);
                Err(errors)
            }
        }
    }
}

/// Query string of `GET /purchases/`
#[derive(Debug, Default, Deserialize)]
pub struct PurchaseQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub store: Option<String>,
    pub currency: Option<String>,
    pub min_total: Option<Decimal>,
    pub max_total: Option<Decimal>,
    pub completed_after: Option<DateTime<Utc>>,
    pub completed_before: Option<DateTime<Utc>>,
    pub tag: Option<String>,
}

/// Validated purchase filters
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PurchaseFilter {
    pub store: Option<String>,
    pub currency: Option<String>,
    pub min_total: Option<Decimal>,
    pub max_total: Option<Decimal>,
    pub completed_after: Option<DateTime<Utc>>,
    pub completed_before: Option<DateTime<Utc>>,
    pub tag: Option<String>,
}

impl PurchaseQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.page_size)
    }

    pub fn filter(&self) -> Result<PurchaseFilter, FieldErrors> {
        let mut errors = FieldErrors::new();

        if let (Some(min), Some(max)) = (self.min_total, self.max_total) {
            if min > max {
                errors.add("min_total", "min_total must not exceed max_total");
            }
        }
        if let (Some(after), Some(before)) = (self.completed_after, self.completed_before) {
            if after > before {
                errors.add(
                    "completed_after",
                    "completed_after must not be later than completed_before",
                );
            }
        }
        errors.into_result()?;

        Ok(PurchaseFilter {
            store: non_blank(self.store.as_deref()).map(str::to_string),
            currency: non_blank(self.currency.as_deref()).map(str::to_uppercase),
            min_total: self.min_total,
            max_total: self.max_total,
            completed_after: self.completed_after,
            completed_before: self.completed_before,
            tag: non_blank(self.tag.as_deref()).map(str::to_string),
        })
    }
}
