use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{CategoryId, OrderId, PaymentId, ProductId, UserId};
use domain::{
    Category, Order, OrderItem, OrderRecord, OrderStatus, Payment, PaymentRecord, Product, User,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    PAYMENT_ORDER_CONSTRAINT, PAYMENT_TRANSACTION_CONSTRAINT, Result, StoreError,
    store::{Store, Transaction},
};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    categories: HashMap<CategoryId, Category>,
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, OrderRecord>,
    order_items: HashMap<OrderId, Vec<OrderItem>>,
    payments: HashMap<PaymentId, PaymentRecord>,
}

impl Tables {
    fn order(&self, id: OrderId) -> Option<Order> {
        let record = self.orders.get(&id)?.clone();
        let items = self.order_items.get(&id).cloned().unwrap_or_default();
        Some(Order::from_storage(record, items))
    }

    fn orders_where(&self, keep: impl Fn(&OrderRecord) -> bool) -> Vec<Order> {
        let mut records: Vec<&OrderRecord> = self.orders.values().filter(|r| keep(r)).collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        records
            .into_iter()
            .filter_map(|record| self.order(record.id))
            .collect()
    }

    fn unique(constraint: &str) -> StoreError {
        StoreError::UniqueViolation {
            constraint: constraint.to_string(),
        }
    }
}

/// In-memory store for tests and local runs.
///
/// A transaction holds the store lock from `begin` until it is committed or
/// dropped and works on a private copy of the tables, so transactions are
/// fully serialized and an uncommitted transaction leaves no trace.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_on_commit: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every following commit to fail, discarding the writes.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.tables.lock().await.orders.len()
    }

    /// Returns the number of committed payments.
    pub async fn payment_count(&self) -> usize {
        self.tables.lock().await.payments.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTransaction {
            guard,
            working,
            fail_on_commit: self.fail_on_commit.load(Ordering::SeqCst),
        })
    }
}

/// Transaction over an [`InMemoryStore`].
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
    fail_on_commit: bool,
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn find_user(&mut self, id: UserId) -> Result<Option<User>> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn insert_user(&mut self, user: &User) -> Result<()> {
        let users = &self.working.users;
        if users.values().any(|u| u.username == user.username) {
            return Err(Tables::unique("users_username_key"));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(Tables::unique("users_email_key"));
        }
        self.working.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_category(&mut self, id: CategoryId) -> Result<Option<Category>> {
        Ok(self.working.categories.get(&id).cloned())
    }

    async fn insert_category(&mut self, category: &Category) -> Result<()> {
        if self
            .working
            .categories
            .values()
            .any(|c| c.slug == category.slug)
        {
            return Err(Tables::unique("categories_slug_key"));
        }
        self.working.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn find_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        if !self.working.categories.contains_key(&product.category_id) {
            return Err(StoreError::Constraint(format!(
                "products.category_id references missing category {}",
                product.category_id
            )));
        }
        if let Some(sku) = &product.sku
            && self
                .working
                .products
                .values()
                .any(|p| p.sku.as_ref() == Some(sku))
        {
            return Err(Tables::unique("products_sku_key"));
        }
        self.working.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn decrement_stock(
        &mut self,
        id: ProductId,
        quantity: u32,
    ) -> Result<Option<Product>> {
        let Some(product) = self.working.products.get_mut(&id) else {
            return Ok(None);
        };
        if product.reduce_stock(quantity).is_err() {
            return Ok(None);
        }
        Ok(Some(product.clone()))
    }

    async fn restore_stock(&mut self, id: ProductId, quantity: u32) -> Result<Option<Product>> {
        let Some(product) = self.working.products.get_mut(&id) else {
            return Ok(None);
        };
        product
            .restore_stock(quantity)
            .map_err(|e| StoreError::Constraint(e.to_string()))?;
        Ok(Some(product.clone()))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if self.working.orders.contains_key(&order.id()) {
            return Err(Tables::unique("orders_pkey"));
        }
        if !self.working.users.contains_key(&order.user_id()) {
            return Err(StoreError::Constraint(format!(
                "orders.user_id references missing user {}",
                order.user_id()
            )));
        }
        self.working.orders.insert(order.id(), order.record());
        self.working
            .order_items
            .insert(order.id(), order.items().to_vec());
        Ok(())
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.order(id))
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        // The whole store is already held by this transaction.
        Ok(self.working.order(id))
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        match self.working.orders.get_mut(&order.id()) {
            Some(record) => {
                *record = order.record();
                Ok(())
            }
            None => Err(StoreError::Corrupt(format!(
                "update of unknown order {}",
                order.id()
            ))),
        }
    }

    async fn items_for_order(&mut self, id: OrderId) -> Result<Vec<OrderItem>> {
        Ok(self.working.order_items.get(&id).cloned().unwrap_or_default())
    }

    async fn orders_for_user(&mut self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.working.orders_where(|r| r.user_id == user_id))
    }

    async fn orders_by_status(&mut self, status: OrderStatus) -> Result<Vec<Order>> {
        Ok(self.working.orders_where(|r| r.status == status))
    }

    async fn all_orders(&mut self) -> Result<Vec<Order>> {
        Ok(self.working.orders_where(|_| true))
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        let payments = &self.working.payments;
        if payments.values().any(|p| p.order_id == payment.order_id()) {
            return Err(Tables::unique(PAYMENT_ORDER_CONSTRAINT));
        }
        if let Some(txn) = payment.transaction_id()
            && payments
                .values()
                .any(|p| p.transaction_id.as_deref() == Some(txn))
        {
            return Err(Tables::unique(PAYMENT_TRANSACTION_CONSTRAINT));
        }
        self.working.payments.insert(payment.id(), payment.record());
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        if let Some(txn) = payment.transaction_id()
            && self
                .working
                .payments
                .values()
                .any(|p| p.id != payment.id() && p.transaction_id.as_deref() == Some(txn))
        {
            return Err(Tables::unique(PAYMENT_TRANSACTION_CONSTRAINT));
        }
        match self.working.payments.get_mut(&payment.id()) {
            Some(record) => {
                *record = payment.record();
                Ok(())
            }
            None => Err(StoreError::Corrupt(format!(
                "update of unknown payment {}",
                payment.id()
            ))),
        }
    }

    async fn find_payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(self
            .working
            .payments
            .values()
            .find(|p| p.order_id == order_id)
            .cloned()
            .map(Payment::from_storage))
    }

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self
            .working
            .payments
            .get(&id)
            .cloned()
            .map(Payment::from_storage))
    }

    async fn lock_payment_by_transaction(
        &mut self,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        Ok(self
            .working
            .payments
            .values()
            .find(|p| p.transaction_id.as_deref() == Some(transaction_id))
            .cloned()
            .map(Payment::from_storage))
    }

    async fn commit(mut self) -> Result<()> {
        if self.fail_on_commit {
            return Err(StoreError::Constraint(
                "commit rejected by test configuration".to_string(),
            ));
        }
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
