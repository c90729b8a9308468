use chrono::{DateTime, Utc};
use common::{CategoryId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::{Availability, Money};

/// A purchasable catalog product.
///
/// `stock_quantity` is unsigned, so it can never go below zero; callers must
/// go through [`Product::reduce_stock`] and [`Product::restore_stock`] to
/// change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub category_id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    /// Stock keeping unit, unique across the catalog when present.
    pub sku: Option<String>,
    pub price: Money,
    pub stock_quantity: u32,
    pub availability: Availability,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates an active product.
    pub fn new(
        category_id: CategoryId,
        name: impl Into<String>,
        price: Money,
        stock_quantity: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ProductId::new(),
            category_id,
            name: name.into(),
            description: None,
            sku: None,
            price,
            stock_quantity,
            availability: Availability::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the same product with the given SKU.
    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    /// Returns the same product marked inactive.
    pub fn deactivated(mut self) -> Self {
        self.availability = Availability::Inactive;
        self
    }

    pub fn is_active(&self) -> bool {
        self.availability.is_active()
    }

    /// Returns true if the product can currently be bought at all.
    pub fn is_in_stock(&self) -> bool {
        self.is_active() && self.stock_quantity > 0
    }

    pub fn has_enough_stock(&self, requested: u32) -> bool {
        self.stock_quantity >= requested
    }

    /// Takes `quantity` units out of stock.
    ///
    /// Fails without touching the stock if fewer units are available.
    pub fn reduce_stock(&mut self, quantity: u32) -> Result<(), DomainError> {
        if !self.has_enough_stock(quantity) {
            return Err(DomainError::InsufficientStock {
                product_id: self.id,
                product_name: self.name.clone(),
                available: self.stock_quantity,
                requested: quantity,
            });
        }
        self.stock_quantity -= quantity;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Puts `quantity` units back into stock.
    pub fn restore_stock(&mut self, quantity: u32) -> Result<(), DomainError> {
        self.stock_quantity =
            self.stock_quantity
                .checked_add(quantity)
                .ok_or(DomainError::StockOverflow {
                    product_id: self.id,
                    current: self.stock_quantity,
                    added: quantity,
                })?;
        self.updated_at = Utc::now();
        Ok(())
    }
}
