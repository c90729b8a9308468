//! Order placement, lookup and cancellation.

use common::{OrderId, UserId};
use domain::{Order, OrderItem, OrderStatus, Product, User};
use store::{Store, Transaction};

use crate::compensation::restore_order_stock;
use crate::error::{CheckoutError, Result};
use crate::requests::PlaceOrder;

fn insufficient_stock(product: &Product, available: u32, requested: u32) -> CheckoutError {
    CheckoutError::InsufficientStock {
        product_id: product.id,
        product_name: product.name.clone(),
        available,
        requested,
    }
}

/// Loads an order the caller owns. Foreign and missing orders look the same.
pub(crate) async fn owned_order<T: Transaction>(
    tx: &mut T,
    order_id: OrderId,
    user_id: UserId,
    lock: bool,
) -> Result<Order> {
    let order = if lock {
        tx.lock_order(order_id).await?
    } else {
        tx.find_order(order_id).await?
    };

    order
        .filter(|order| order.is_owned_by(user_id))
        .ok_or_else(|| CheckoutError::not_found("Order", order_id))
}

/// Application service for the order side of checkout.
///
/// Every operation runs in exactly one store transaction; any error drops the
/// transaction and with it every write made so far.
pub struct OrderService<S: Store> {
    store: S,
}

impl<S: Store> OrderService<S> {
    /// Creates a new order service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places an order, taking the stock for every line.
    ///
    /// Lines are processed in request order. A product listed twice is checked
    /// against the stock left by its earlier line.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id, lines = request.items.len()))]
    pub async fn place_order(&self, request: PlaceOrder) -> Result<Order> {
        request.validate()?;

        let mut tx = self.store.begin().await?;

        let user = tx
            .find_user(request.user_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("User", request.user_id))?;
        if !user.is_active() {
            return Err(CheckoutError::InvalidState(format!(
                "User account is inactive: {}",
                user.username
            )));
        }

        let mut order = Order::new(user.id, request.shipping_address, request.notes);

        for line in &request.items {
            let product = tx
                .find_product(line.product_id)
                .await?
                .ok_or_else(|| CheckoutError::not_found("Product", line.product_id))?;

            if !product.is_active() {
                return Err(CheckoutError::InvalidState(format!(
                    "Product is not available: {}",
                    product.name
                )));
            }
            if !product.has_enough_stock(line.quantity) {
                return Err(insufficient_stock(
                    &product,
                    product.stock_quantity,
                    line.quantity,
                ));
            }

            let Some(reduced) = tx.decrement_stock(product.id, line.quantity).await? else {
                // Another placement took the stock between the check and the update.
                let available = tx
                    .find_product(product.id)
                    .await?
                    .map_or(0, |p| p.stock_quantity);
                return Err(insufficient_stock(&product, available, line.quantity));
            };

            order.add_item(OrderItem::snapshot(order.id(), &reduced, line.quantity)?)?;
        }

        order.recompute_total();
        tx.insert_order(&order).await?;
        tx.commit().await?;

        metrics::counter!("orders_placed_total").increment(1);
        tracing::info!(
            order_id = %order.id(),
            total = %order.total_amount(),
            items = order.item_count(),
            "order placed"
        );
        Ok(order)
    }

    /// Returns an order owned by `user_id`.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId, user_id: UserId) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let order = owned_order(&mut tx, order_id, user_id, false).await?;
        tx.commit().await?;
        Ok(order)
    }

    /// Returns the user's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        let mut tx = self.store.begin().await?;
        let orders = tx.orders_for_user(user_id).await?;
        tx.commit().await?;
        Ok(orders)
    }

    /// Cancels a pending or confirmed order and puts its stock back.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId, user_id: UserId) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        let mut order = owned_order(&mut tx, order_id, user_id, true).await?;

        let restored = Self::cancel_within(&mut tx, &mut order).await?;
        tx.commit().await?;

        Self::record_cancellation(&order, restored, "customer");
        Ok(order)
    }

    /// Returns every order, newest first. Admin only.
    #[tracing::instrument(skip(self))]
    pub async fn list_all_orders(&self, actor_id: UserId) -> Result<Vec<Order>> {
        let mut tx = self.store.begin().await?;
        require_admin(&mut tx, actor_id).await?;
        let orders = tx.all_orders().await?;
        tx.commit().await?;
        Ok(orders)
    }

    /// Returns the orders in `status`, newest first. Admin only.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders_by_status(
        &self,
        actor_id: UserId,
        status: OrderStatus,
    ) -> Result<Vec<Order>> {
        let mut tx = self.store.begin().await?;
        require_admin(&mut tx, actor_id).await?;
        let orders = tx.orders_by_status(status).await?;
        tx.commit().await?;
        Ok(orders)
    }

    /// Moves an order to `status`. Admin only.
    ///
    /// Cancelling through this path restores stock like a customer
    /// cancellation does.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        actor_id: UserId,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        require_admin(&mut tx, actor_id).await?;

        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Order", order_id))?;

        if status == OrderStatus::Cancelled {
            let restored = Self::cancel_within(&mut tx, &mut order).await?;
            tx.commit().await?;
            Self::record_cancellation(&order, restored, "admin");
            return Ok(order);
        }

        let previous = order.status();
        if !previous.can_transition_to(status) {
            return Err(CheckoutError::InvalidState(format!(
                "Cannot change order status from {previous} to {status}"
            )));
        }
        order.advance_to(status)?;
        tx.update_order(&order).await?;
        tx.commit().await?;

        tracing::info!(%order_id, from = %previous, to = %status, "order status updated");
        Ok(order)
    }

    async fn cancel_within(tx: &mut S::Tx, order: &mut Order) -> Result<u64> {
        if !order.can_be_cancelled() {
            return Err(CheckoutError::InvalidState(format!(
                "Order cannot be cancelled in status: {}",
                order.status()
            )));
        }
        // The gateway may still approve it; the settlement decides instead.
        if tx
            .find_payment_for_order(order.id())
            .await?
            .is_some_and(|p| p.status().is_awaiting_settlement())
        {
            return Err(CheckoutError::InvalidState(
                "Order has a payment awaiting settlement".to_string(),
            ));
        }

        let restored = restore_order_stock(tx, order).await?;
        order.cancel()?;
        tx.update_order(order).await?;
        Ok(restored)
    }

    fn record_cancellation(order: &Order, restored: u64, reason: &'static str) {
        metrics::counter!("orders_cancelled_total", "reason" => reason).increment(1);
        metrics::counter!("stock_units_restored_total").increment(restored);
        tracing::info!(order_id = %order.id(), reason, units_restored = restored, "order cancelled");
    }
}

async fn require_admin<T: Transaction>(tx: &mut T, actor_id: UserId) -> Result<User> {
    match tx.find_user(actor_id).await? {
        Some(user) if user.is_admin() && user.is_active() => Ok(user),
        _ => Err(CheckoutError::Forbidden),
    }
}
