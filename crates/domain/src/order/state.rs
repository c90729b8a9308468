//! Order status machine.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// Pending ──► Confirmed ──► Processing ──► Shipped ──► Delivered
///    │            │
///    └────────────┴──► Cancelled
/// ```
///
/// Checkout only ever moves orders between Pending, Confirmed and Cancelled;
/// the fulfilment statuses are set by administrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order created, awaiting payment.
    #[default]
    Pending,

    /// Payment succeeded.
    Confirmed,

    /// Order is being prepared.
    Processing,

    /// Order has left the warehouse.
    Shipped,

    /// Order reached the customer (terminal state).
    Delivered,

    /// Order was cancelled by the customer or by a failed payment (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Returns true if a payment can confirm an order in this status.
    pub fn can_confirm(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    /// Returns true if an administrator may move the order to `next`.
    ///
    /// Pending to Confirmed is not one of them; only payment settlement
    /// confirms an order, see [`OrderStatus::can_confirm`].
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Confirmed, OrderStatus::Processing)
                | (OrderStatus::Confirmed, OrderStatus::Cancelled)
                | (OrderStatus::Processing, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
        )
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::UnknownVariant {
                kind: "order status",
                value: s.to_string(),
            })
    }
}
