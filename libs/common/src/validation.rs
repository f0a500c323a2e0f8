//! Field-level validation errors
//!
//! Handlers collect every problem with a payload before answering, so a
//! client sees all rejected fields at once.

use serde::Serialize;
use std::collections::BTreeMap;

/// Messages keyed by field name, serialized as `{"field": ["msg", ...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build with a single message
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Record the error of a `Result<(), String>` check under `field`
    pub fn check(&mut self, field: &str, result: Result<(), String>) {
        if let Err(message) = result {
            self.add(field, message);
        }
    }

    /// Merge another set as-is
    pub fn extend(&mut self, other: FieldErrors) {
        for (field, messages) in other.fields {
            self.fields.entry(field).or_default().extend(messages);
        }
    }

    /// Merge another set under a prefix, e.g. `products[0].price`
    pub fn extend_prefixed(&mut self, prefix: &str, other: FieldErrors) {
        for (field, messages) in other.fields {
            let key = format!("{}.{}", prefix, field);
            self.fields.entry(key).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    /// `Ok(())` when nothing was recorded, otherwise the collected errors
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_multiple_messages_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("name", "Name is required");
        errors.add("name", "Name is too short");
        errors.check("price", Ok(()));

        assert_eq!(errors.get("name").map(<[String]>::len), Some(2));
        assert!(errors.get("price").is_none());
    }

    #[test]
    fn empty_set_is_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
        assert!(FieldErrors::single("email", "bad").into_result().is_err());
    }

    #[test]
    fn prefixed_merge_and_serialization() {
        let mut errors = FieldErrors::new();
        errors.extend_prefixed("products[1]", FieldErrors::single("quantity", "too small"));

        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "products[1].quantity": ["too small"] })
        );
    }
}
