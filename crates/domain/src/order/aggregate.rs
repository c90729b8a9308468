//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::Money;

use super::{OrderItem, OrderStatus};

/// Order header as persisted, without its lines.
///
/// Used by stores to rebuild an [`Order`] through [`Order::from_storage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub shipping_address: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order aggregate root.
///
/// Owns its lines. The total is always recomputed from the line subtotals
/// after a structural change rather than accumulated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    id: OrderId,

    /// User who placed the order. Never changes after creation.
    user_id: UserId,

    /// Current status of the order.
    status: OrderStatus,

    /// Sum of the line subtotals.
    total_amount: Money,

    shipping_address: String,

    notes: Option<String>,

    /// Lines in the order they were requested.
    items: Vec<OrderItem>,

    created_at: DateTime<Utc>,

    updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates an empty pending order for a user.
    pub fn new(user_id: UserId, shipping_address: impl Into<String>, notes: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            user_id,
            status: OrderStatus::Pending,
            total_amount: Money::zero(),
            shipping_address: shipping_address.into(),
            notes,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds an order from its persisted header and lines.
    pub fn from_storage(record: OrderRecord, items: Vec<OrderItem>) -> Self {
        let mut order = Self {
            id: record.id,
            user_id: record.user_id,
            status: record.status,
            total_amount: Money::zero(),
            shipping_address: record.shipping_address,
            notes: record.notes,
            items,
            created_at: record.created_at,
            updated_at: record.updated_at,
        };
        order.recompute_total();
        order
    }

    /// Returns the persisted header of this order.
    pub fn record(&self) -> OrderRecord {
        OrderRecord {
            id: self.id,
            user_id: self.user_id,
            status: self.status,
            shipping_address: self.shipping_address.clone(),
            notes: self.notes.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn shipping_address(&self) -> &str {
        &self.shipping_address
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Returns the total quantity across all lines.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if the order belongs to the given user.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    pub fn can_be_cancelled(&self) -> bool {
        self.status.can_cancel()
    }
}

// Mutations
impl Order {
    /// Appends a line and recomputes the total.
    pub fn add_item(&mut self, item: OrderItem) -> Result<(), DomainError> {
        if self.status != OrderStatus::Pending {
            return Err(DomainError::InvalidOrderTransition {
                current: self.status,
                action: "add item to",
            });
        }
        if item.quantity == 0 {
            return Err(DomainError::InvalidQuantity {
                quantity: item.quantity,
            });
        }

        self.items.push(item);
        self.recompute_total();
        Ok(())
    }

    /// Sets the total to the sum of the line subtotals.
    pub fn recompute_total(&mut self) {
        self.total_amount = self.items.iter().map(|item| item.subtotal).sum();
    }

    /// Marks a pending order as paid.
    pub fn confirm(&mut self) -> Result<(), DomainError> {
        if !self.status.can_confirm() {
            return Err(DomainError::InvalidOrderTransition {
                current: self.status,
                action: "confirm",
            });
        }
        self.set_status(OrderStatus::Confirmed);
        Ok(())
    }

    /// Cancels a pending or confirmed order.
    ///
    /// Stock restoration is the caller's job and must happen in the same unit
    /// of work.
    pub fn cancel(&mut self) -> Result<(), DomainError> {
        if !self.can_be_cancelled() {
            return Err(DomainError::InvalidOrderTransition {
                current: self.status,
                action: "cancel",
            });
        }
        self.set_status(OrderStatus::Cancelled);
        Ok(())
    }

    /// Moves the order to `next` if that is a legal transition.
    pub fn advance_to(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidOrderTransition {
                current: self.status,
                action: "advance",
            });
        }
        self.set_status(next);
        Ok(())
    }

    fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Product;
    use common::CategoryId;

    fn product(price_cents: i64) -> Product {
        Product::new(
            CategoryId::new(),
            "Widget",
            Money::from_cents(price_cents),
            100,
        )
    }

    fn order_with_items() -> Order {
        let mut order = Order::new(UserId::new(), "221B Baker Street, London", None);
        let widget = product(1000);
        let gadget = product(2500);
        order
            .add_item(OrderItem::snapshot(order.id(), &widget, 2).unwrap())
            .unwrap();
        order
            .add_item(OrderItem::snapshot(order.id(), &gadget, 1).unwrap())
            .unwrap();
        order
    }

    #[test]
    fn test_new_order_is_pending_and_empty() {
        let user_id = UserId::new();
        let order = Order::new(user_id, "221B Baker Street, London", Some("ring twice".into()));

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.user_id(), user_id);
        assert!(order.total_amount().is_zero());
        assert_eq!(order.item_count(), 0);
        assert_eq!(order.notes(), Some("ring twice"));
    }

    #[test]
    fn test_total_is_sum_of_subtotals() {
        let order = order_with_items();

        assert_eq!(order.item_count(), 2);
        assert_eq!(order.total_quantity(), 3);
        assert_eq!(order.total_amount(), Money::from_cents(4500));

        let sum: Money = order.items().iter().map(|i| i.subtotal).sum();
        assert_eq!(order.total_amount(), sum);
    }

    #[test]
    fn test_from_storage_recomputes_total() {
        let order = order_with_items();
        let rebuilt = Order::from_storage(order.record(), order.items().to_vec());

        assert_eq!(rebuilt, order);
        assert_eq!(rebuilt.total_amount(), Money::from_cents(4500));
    }

    #[test]
    fn test_confirm_only_from_pending() {
        let mut order = order_with_items();
        order.confirm().unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);

        let err = order.confirm().unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidOrderTransition {
                current: OrderStatus::Confirmed,
                action: "confirm",
            }
        );
    }

    #[test]
    fn test_cancel_pending_and_confirmed() {
        let mut pending = order_with_items();
        pending.cancel().unwrap();
        assert_eq!(pending.status(), OrderStatus::Cancelled);

        let mut confirmed = order_with_items();
        confirmed.confirm().unwrap();
        confirmed.cancel().unwrap();
        assert_eq!(confirmed.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn test_cannot_cancel_twice() {
        let mut order = order_with_items();
        order.cancel().unwrap();
        assert!(matches!(
            order.cancel(),
            Err(DomainError::InvalidOrderTransition { .. })
        ));
    }

    #[test]
    fn test_cannot_cancel_delivered() {
        let mut order = order_with_items();
        order.confirm().unwrap();
        order.advance_to(OrderStatus::Processing).unwrap();
        order.advance_to(OrderStatus::Shipped).unwrap();
        order.advance_to(OrderStatus::Delivered).unwrap();

        assert!(!order.can_be_cancelled());
        assert!(order.cancel().is_err());
        assert_eq!(order.status(), OrderStatus::Delivered);
    }

    #[test]
    fn test_cannot_add_items_after_confirmation() {
        let mut order = order_with_items();
        order.confirm().unwrap();

        let item = OrderItem::snapshot(order.id(), &product(100), 1).unwrap();
        assert!(order.add_item(item).is_err());
        assert_eq!(order.item_count(), 2);
    }

    #[test]
    fn test_advance_rejects_skipping_statuses() {
        let mut order = order_with_items();
        assert!(order.advance_to(OrderStatus::Shipped).is_err());
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn test_advance_cannot_confirm_unpaid_order() {
        let mut order = order_with_items();
        assert!(matches!(
            order.advance_to(OrderStatus::Confirmed),
            Err(DomainError::InvalidOrderTransition {
                current: OrderStatus::Pending,
                ..
            })
        ));
        assert_eq!(order.status(), OrderStatus::Pending);
    }
}
