//! Domain layer for the storefront checkout backend.
//!
//! This crate holds the entities the checkout workflows operate on and the
//! invariants each of them enforces:
//! - Catalog records (`Category`, `Product`) with guarded stock arithmetic
//! - The `User` record consumed for ownership and role checks
//! - The `Order` aggregate with its line-item snapshots and status machine
//! - The `Payment` record with its settlement transitions

pub mod catalog;
pub mod error;
pub mod order;
pub mod payment;
pub mod user;
pub mod value_objects;

pub use catalog::{Category, Product};
pub use error::DomainError;
pub use order::{Order, OrderItem, OrderRecord, OrderStatus};
pub use payment::{Payment, PaymentMethod, PaymentRecord, PaymentStatus};
pub use user::{Role, User};
pub use value_objects::{Availability, Money};
