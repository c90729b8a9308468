use common::{OrderId, OrderItemId, ProductId};
use serde::{Deserialize, Serialize};

use crate::catalog::Product;
use crate::error::DomainError;
use crate::value_objects::Money;

/// A line of an order.
///
/// `product_name` and `unit_price` are copied from the product when the line
/// is created and never follow later catalog edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,

    /// The order this line belongs to.
    pub order_id: OrderId,

    /// The product that was bought.
    pub product_id: ProductId,

    /// Product name at time of purchase.
    pub product_name: String,

    /// Product price at time of purchase.
    pub unit_price: Money,

    /// Quantity ordered, at least one.
    pub quantity: u32,

    /// `unit_price * quantity`.
    pub subtotal: Money,
}

impl OrderItem {
    /// Creates a line for `order_id` from the product's current name and price.
    pub fn snapshot(
        order_id: OrderId,
        product: &Product,
        quantity: u32,
    ) -> Result<Self, DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity { quantity });
        }

        Ok(Self {
            id: OrderItemId::new(),
            order_id,
            product_id: product.id,
            product_name: product.name.clone(),
            unit_price: product.price,
            quantity,
            subtotal: product.price.multiply(quantity),
        })
    }
}
