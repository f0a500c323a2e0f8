//! Input validation for catalog, cart and purchase payloads

use rust_decimal::Decimal;

pub const NAME_MAX: usize = 180;
pub const CATEGORY_MAX: usize = 64;
pub const CART_NAME_MAX: usize = 120;
pub const STORE_NAME_MAX: usize = 120;
pub const TAG_MAX: usize = 64;
pub const IDEMPOTENCY_KEY_MAX: usize = 64;

/// Largest quantity a single line may carry
pub const QUANTITY_MAX: i64 = 1_000_000;

/// Largest unit price a NUMERIC(10, 2) column holds
pub const PRICE_MAX: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2);

/// Largest purchase total a NUMERIC(12, 2) column holds
pub const TOTAL_MAX: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

pub const SUPPORTED_CURRENCIES: [&str; 14] = [
    "USD", "EUR", "CNY", "JPY", "GBP", "INR", "BRL", "AUD", "CAD", "CHF", "MXN", "KRW", "TRY",
    "ZAR",
];

pub const DEFAULT_CURRENCY: &str = "EUR";

/// Amount at cent precision, e.g. `5` becomes `5.00`
pub fn money(value: Decimal) -> Decimal {
    let mut value = value.round_dp(2);
    value.rescale(2);
    value
}

/// Non-empty after trimming and at most `max` characters
pub fn validate_required_text(value: &str, label: &str, max: usize) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", label));
    }
    validate_optional_text(value, label, max)
}

pub fn validate_optional_text(value: &str, label: &str, max: usize) -> Result<(), String> {
    if value.chars().count() > max {
        return Err(format!("{} must be at most {} characters", label, max));
    }
    Ok(())
}

/// Non-negative with at most two decimal places
pub fn validate_price(price: Decimal) -> Result<(), String> {
    if price < Decimal::ZERO {
        return Err("Price must not be negative".to_string());
    }
    if price.normalize().scale() > 2 {
        return Err("Price must have at most 2 decimal places".to_string());
    }
    if price > PRICE_MAX {
        return Err(format!("Price must be at most {}", PRICE_MAX));
    }
    Ok(())
}

pub fn validate_total(total: Decimal) -> Result<(), String> {
    if total > TOTAL_MAX {
        return Err(format!("Total must be at most {}", TOTAL_MAX));
    }
    Ok(())
}

pub fn validate_quantity(quantity: i64) -> Result<(), String> {
    if quantity < 1 {
        return Err("Quantity must be at least 1".to_string());
    }
    if quantity > QUANTITY_MAX {
        return Err(format!("Quantity must be at most {}", QUANTITY_MAX));
    }
    Ok(())
}

/// Uppercase a currency code and check it is supported
pub fn normalize_currency(code: &str) -> Result<String, String> {
    let code = code.trim().to_uppercase();
    if SUPPORTED_CURRENCIES.contains(&code.as_str()) {
        Ok(code)
    } else {
        Err(format!("Unsupported currency: {}", code))
    }
}

/// Trim tags and drop empty and repeated ones, keeping first-seen order
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>, String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() || normalized.iter().any(|seen| seen == tag) {
            continue;
        }
        validate_optional_text(tag, "Tag", TAG_MAX)?;
        normalized.push(tag.to_string());
    }
    Ok(normalized)
}
