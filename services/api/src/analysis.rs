//! Price analysis over the purchase ledger
//!
//! Lines that reference a product are grouped by its id. Ad-hoc lines are
//! grouped by their trimmed, case-folded name, so "Milk" and " milk" form
//! one series. Amounts in different currencies never share a series.

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::{
    models::price_history::{PriceObservation, PricePoint, PriceSeries, PriceSummary},
    validation::money,
};

/// Grouping key of an observation, suffixed with its currency
pub fn series_key(observation: &PriceObservation) -> String {
    match observation.product_id {
        Some(id) => format!("{}:{}", id, observation.currency),
        None => format!(
            "name:{}:{}",
            observation.name.trim().to_lowercase(),
            observation.currency
        ),
    }
}

/// Build one series per product, ordered by display name
pub fn build_series(observations: Vec<PriceObservation>) -> Vec<PriceSeries> {
    let mut groups: HashMap<String, Vec<PriceObservation>> = HashMap::new();
    for observation in observations {
        groups
            .entry(series_key(&observation))
            .or_default()
            .push(observation);
    }

    let mut series: Vec<PriceSeries> = groups
        .into_iter()
        .filter_map(|(key, mut group)| {
            group.sort_by(|a, b| {
                a.purchased_at
                    .cmp(&b.purchased_at)
                    .then_with(|| a.purchase_id.cmp(&b.purchase_id))
            });
            let latest = group.last()?;
            let name = latest.name.trim().to_string();
            let product_id = latest.product_id;
            let currency = latest.currency.clone();
            let summary = summarize(&group)?;

            let points = group
                .into_iter()
                .map(|observation| PricePoint {
                    purchase_id: observation.purchase_id,
                    purchased_at: observation.purchased_at,
                    unit_price: observation.unit_price,
                    quantity: observation.quantity,
                    currency: observation.currency,
                })
                .collect();

            Some(PriceSeries {
                key,
                product_id,
                name,
                currency,
                points,
                summary,
            })
        })
        .collect();

    series.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.key.cmp(&b.key))
    });
    series
}

/// Summary of a chronologically ordered, non-empty group
fn summarize(group: &[PriceObservation]) -> Option<PriceSummary> {
    let first = group.first()?.unit_price;
    let latest = group.last()?.unit_price;
    let min_price = group.iter().map(|o| o.unit_price).min()?;
    let max_price = group.iter().map(|o| o.unit_price).max()?;

    let quantity: Decimal = group.iter().map(|o| Decimal::from(o.quantity)).sum();
    let spent: Decimal = group
        .iter()
        .map(|o| o.unit_price * Decimal::from(o.quantity))
        .sum();
    let average = if quantity.is_zero() {
        Decimal::ZERO
    } else {
        (spent / quantity).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    };

    Some(PriceSummary {
        min_price,
        max_price,
        average_price: money(average),
        first_price: first,
        latest_price: latest,
        change: latest - first,
    })
}
