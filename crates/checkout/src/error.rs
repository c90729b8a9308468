//! Checkout error types.

use common::{OrderId, ProductId};
use domain::{DomainError, OrderStatus};
use store::StoreError;
use thiserror::Error;

/// Errors returned by the checkout workflows.
///
/// Every error aborts the unit of work it was raised in.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A referenced user, product, order or payment does not exist, or is not
    /// visible to the caller.
    #[error("{0}")]
    NotFound(String),

    /// The operation is not allowed in the current state.
    #[error("{0}")]
    InvalidState(String),

    /// A line asks for more units than are in stock.
    #[error(
        "Insufficient stock for product: {product_name}. Available: {available}, Requested: {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        available: u32,
        requested: u32,
    },

    /// Only pending orders can be paid.
    #[error("Order is not in a payable state: {status}")]
    InvalidPaymentState { status: OrderStatus },

    /// The order already has a payment.
    #[error("Payment already exists for order: {0}")]
    DuplicatePayment(OrderId),

    /// The request failed upstream validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The caller lacks the role the operation requires.
    #[error("Access denied")]
    Forbidden,

    /// An entity invariant was violated.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The store failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CheckoutError {
    pub(crate) fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        CheckoutError::NotFound(format!("{kind} not found with id: {id}"))
    }
}

/// Failure reported by a payment gateway before it reached a decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Payment gateway rejected the request: {0}")]
    Rejected(String),
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
