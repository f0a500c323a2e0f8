//! Repositories for database operations
//!
//! Every query takes the caller's id and filters on it; a row owned by someone
//! else is indistinguishable from a missing one.

pub mod cart;
pub mod product;
pub mod purchase;

pub use cart::CartRepository;
pub use product::{DeleteOutcome, ProductRepository};
pub use purchase::{CreateOutcome, PurchaseRepository};

/// Escape `LIKE` wildcards so `value` matches literally inside `'%' || $n || '%'`
pub(crate) fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
