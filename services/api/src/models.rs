//! API models for request and response payloads

pub mod cart;
pub mod pagination;
pub mod price_history;
pub mod product;
pub mod purchase;

pub use cart::{AddCartItemRequest, Cart, CartItem, SetQuantityRequest};
pub use pagination::{Page, Pagination};
pub use price_history::{PriceHistoryQuery, PriceObservation, PriceSeries};
pub use product::{CreateProductRequest, NewProduct, Product, ProductQuery, ProductUpdate};
pub use purchase::{
    CheckoutRequest, CreatePurchaseRequest, Purchase, PurchaseDraft, PurchaseFilter, PurchaseLine,
    PurchaseMeta, PurchaseQuery,
};
