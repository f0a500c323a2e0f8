//! Product catalog models

use chrono::{DateTime, Utc};
use common::validation::FieldErrors;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    models::Pagination,
    validation::{
        CATEGORY_MAX, NAME_MAX, money, validate_optional_text, validate_price,
        validate_required_text,
    },
};

/// A product in the caller's catalog
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    #[serde(skip)]
    pub user_id: Uuid,
    pub name: String,
    pub category: String,
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /products/`
#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub unit_price: Option<Decimal>,
}

/// Validated product ready to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub category: String,
    pub unit_price: Decimal,
}

impl CreateProductRequest {
    pub fn validate(self) -> Result<NewProduct, FieldErrors> {
        let name = self.name.trim().to_string();
        let category = self.category.trim().to_string();

        let mut errors = FieldErrors::new();
        errors.check("name", validate_required_text(&name, "Name", NAME_MAX));
        errors.check(
            "category",
            validate_optional_text(&category, "Category", CATEGORY_MAX),
        );
        match self.unit_price {
            Some(price) => errors.check("unit_price", validate_price(price)),
            None => errors.add("unit_price", "Unit price is required"),
        }
        errors.into_result()?;

        Ok(NewProduct {
            name,
            category,
            unit_price: money(self.unit_price.unwrap_or_default()),
        })
    }
}

/// Body of `PATCH /products/{id}/`; absent fields keep their value
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub unit_price: Option<Decimal>,
}

impl ProductUpdate {
    pub fn validate(self) -> Result<ProductUpdate, FieldErrors> {
        let update = ProductUpdate {
            name: self.name.map(|name| name.trim().to_string()),
            category: self.category.map(|category| category.trim().to_string()),
            unit_price: self.unit_price,
        };

        let mut errors = FieldErrors::new();
        if let Some(name) = &update.name {
            errors.check("name", validate_required_text(name, "Name", NAME_MAX));
        }
        if let Some(category) = &update.category {
            errors.check(
                "category",
                validate_optional_text(category, "Category", CATEGORY_MAX),
            );
        }
        if let Some(price) = update.unit_price {
            errors.check("unit_price", validate_price(price));
        }
        errors.into_result()?;

        Ok(ProductUpdate {
            unit_price: update.unit_price.map(money),
            ..update
        })
    }
}

/// Query string of `GET /products/`
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub category: Option<String>,
    pub search: Option<String>,
}

impl ProductQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.page_size)
    }

    /// Trimmed category filter, `None` when blank
    pub fn category(&self) -> Option<&str> {
        non_blank(self.category.as_deref())
    }

    pub fn search(&self) -> Option<&str> {
        non_blank(self.search.as_deref())
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
