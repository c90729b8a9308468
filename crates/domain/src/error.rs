//! Domain error types.

use common::ProductId;
use thiserror::Error;

use crate::order::OrderStatus;
use crate::payment::PaymentStatus;

/// Invariant violations raised by the entities themselves.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A stock reduction asked for more units than are available.
    #[error(
        "Insufficient stock for product: {product_name}. Available: {available}, Requested: {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        available: u32,
        requested: u32,
    },

    /// A stock restoration would overflow the stock counter.
    #[error("Stock overflow for product {product_id}: {current} + {added}")]
    StockOverflow {
        product_id: ProductId,
        current: u32,
        added: u32,
    },

    /// Order line quantities must be at least one.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// The order is not in a status that allows the requested action.
    #[error("Invalid order transition: cannot {action} order in status {current}")]
    InvalidOrderTransition {
        current: OrderStatus,
        action: &'static str,
    },

    /// The payment is not in a status that allows the requested action.
    #[error("Invalid payment transition: cannot {action} payment in status {current}")]
    InvalidPaymentTransition {
        current: PaymentStatus,
        action: &'static str,
    },

    /// A stored or submitted enumeration value is not recognised.
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
