//! Workflow inputs and their upstream validation.

use common::{OrderId, ProductId, UserId};
use domain::PaymentMethod;

use crate::error::{CheckoutError, Result};

pub const SHIPPING_ADDRESS_MIN_CHARS: usize = 10;
pub const SHIPPING_ADDRESS_MAX_CHARS: usize = 500;
pub const NOTES_MAX_CHARS: usize = 1000;

/// One requested line of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Request to place an order.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    /// The user placing the order.
    pub user_id: UserId,

    pub shipping_address: String,

    pub notes: Option<String>,

    /// Lines in request order. The same product may appear more than once.
    pub items: Vec<OrderLine>,
}

impl PlaceOrder {
    /// Creates a request without notes.
    pub fn new(user_id: UserId, shipping_address: impl Into<String>, items: Vec<OrderLine>) -> Self {
        Self {
            user_id,
            shipping_address: shipping_address.into(),
            notes: None,
            items,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Checks the request shape before any unit of work is opened.
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(CheckoutError::Validation(
                "Order must contain at least one item".to_string(),
            ));
        }
        if let Some(line) = self.items.iter().find(|line| line.quantity == 0) {
            return Err(CheckoutError::Validation(format!(
                "Quantity must be at least 1 for product {}",
                line.product_id
            )));
        }

        let address_chars = self.shipping_address.trim().chars().count();
        if !(SHIPPING_ADDRESS_MIN_CHARS..=SHIPPING_ADDRESS_MAX_CHARS).contains(&address_chars) {
            return Err(CheckoutError::Validation(format!(
                "Shipping address must be between {SHIPPING_ADDRESS_MIN_CHARS} and {SHIPPING_ADDRESS_MAX_CHARS} characters"
            )));
        }

        if let Some(notes) = &self.notes
            && notes.chars().count() > NOTES_MAX_CHARS
        {
            return Err(CheckoutError::Validation(format!(
                "Notes cannot exceed {NOTES_MAX_CHARS} characters"
            )));
        }

        Ok(())
    }
}

/// Request to pay for an order.
#[derive(Debug, Clone, Copy)]
pub struct ProcessPayment {
    pub order_id: OrderId,
    /// The user paying; must own the order.
    pub user_id: UserId,
    pub method: PaymentMethod,
}

impl ProcessPayment {
    pub fn new(order_id: OrderId, user_id: UserId, method: PaymentMethod) -> Self {
        Self {
            order_id,
            user_id,
            method,
        }
    }
}
