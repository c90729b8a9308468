use async_trait::async_trait;
use common::{CategoryId, OrderId, PaymentId, ProductId, UserId};
use domain::{Category, Order, OrderItem, OrderStatus, Payment, Product, User};

use crate::Result;

/// Unique constraint guarding the one-payment-per-order rule.
pub const PAYMENT_ORDER_CONSTRAINT: &str = "payments_order_id_key";

/// Unique constraint on gateway transaction ids.
pub const PAYMENT_TRANSACTION_CONSTRAINT: &str = "payments_transaction_id_key";

/// Entry point of the persistence boundary.
///
/// Every workflow opens exactly one [`Transaction`], does all of its reads and
/// writes through it, then commits. Implementations must be thread-safe.
#[async_trait]
pub trait Store: Send + Sync {
    type Tx: Transaction;

    /// Opens a new unit of work.
    async fn begin(&self) -> Result<Self::Tx>;
}

/// An all-or-nothing unit of work.
///
/// Nothing written through a transaction is visible to other transactions
/// until [`Transaction::commit`] succeeds. Dropping a transaction without
/// committing discards its writes.
#[async_trait]
pub trait Transaction: Send + Sized {
    // Users

    async fn find_user(&mut self, id: UserId) -> Result<Option<User>>;

    async fn insert_user(&mut self, user: &User) -> Result<()>;

    // Catalog

    async fn find_category(&mut self, id: CategoryId) -> Result<Option<Category>>;

    async fn insert_category(&mut self, category: &Category) -> Result<()>;

    async fn find_product(&mut self, id: ProductId) -> Result<Option<Product>>;

    async fn insert_product(&mut self, product: &Product) -> Result<()>;

    /// Takes `quantity` units out of stock if at least that many remain.
    ///
    /// The check and the write are one atomic step. Returns the updated
    /// product, or `None` when the product is missing or short of stock, in
    /// which case nothing is written.
    async fn decrement_stock(
        &mut self,
        id: ProductId,
        quantity: u32,
    ) -> Result<Option<Product>>;

    /// Puts `quantity` units back into stock. Returns `None` when the product
    /// is missing.
    async fn restore_stock(&mut self, id: ProductId, quantity: u32) -> Result<Option<Product>>;

    // Orders

    /// Inserts an order header together with all of its lines.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Like [`Transaction::find_order`], but also locks the order row until
    /// the transaction ends.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Writes the order header (status and timestamps). Lines are immutable.
    async fn update_order(&mut self, order: &Order) -> Result<()>;

    /// Returns the lines of an order in the order they were placed.
    async fn items_for_order(&mut self, id: OrderId) -> Result<Vec<OrderItem>>;

    /// Returns a user's orders, newest first.
    async fn orders_for_user(&mut self, user_id: UserId) -> Result<Vec<Order>>;

    /// Returns orders in `status`, newest first.
    async fn orders_by_status(&mut self, status: OrderStatus) -> Result<Vec<Order>>;

    /// Returns every order, newest first.
    async fn all_orders(&mut self) -> Result<Vec<Order>>;

    // Payments

    /// Inserts a payment. Fails with a unique violation on
    /// [`PAYMENT_ORDER_CONSTRAINT`] if the order already has one.
    async fn insert_payment(&mut self, payment: &Payment) -> Result<()>;

    async fn update_payment(&mut self, payment: &Payment) -> Result<()>;

    async fn find_payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>>;

    /// Finds and locks a payment by id.
    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>>;

    /// Finds and locks the payment carrying a gateway transaction id.
    async fn lock_payment_by_transaction(
        &mut self,
        transaction_id: &str,
    ) -> Result<Option<Payment>>;

    // Lifecycle

    /// Publishes every write made through this transaction.
    async fn commit(self) -> Result<()>;

    /// Discards every write made through this transaction.
    async fn rollback(self) -> Result<()>;
}
