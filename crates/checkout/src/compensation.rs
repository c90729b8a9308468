//! Compensating stock restoration shared by cancellation and failed payments.

use domain::Order;
use store::Transaction;

use crate::error::{CheckoutError, Result};

/// Puts every line quantity of `order` back onto its product.
///
/// Lines are looked up by order id. Must run in the same transaction as the
/// status change it compensates for. Returns the number of units restored.
pub(crate) async fn restore_order_stock<T: Transaction>(tx: &mut T, order: &Order) -> Result<u64> {
    let items = tx.items_for_order(order.id()).await?;
    let mut restored = 0u64;

    for item in &items {
        tx.restore_stock(item.product_id, item.quantity)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Product", item.product_id))?;
        restored += u64::from(item.quantity);
    }

    tracing::debug!(order_id = %order.id(), lines = items.len(), units = restored, "stock restored");
    Ok(restored)
}
