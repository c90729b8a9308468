//! Shared types for the storefront checkout backend.

pub mod ids;

pub use ids::{CategoryId, OrderId, OrderItemId, PaymentId, ProductId, UserId};
