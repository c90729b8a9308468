use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CategoryId, OrderId, OrderItemId, PaymentId, ProductId, UserId};
use domain::{
    Category, Money, Order, OrderItem, OrderRecord, OrderStatus, Payment, PaymentRecord, Product,
    User,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{Store, Transaction},
};

const PRODUCT_COLUMNS: &str = "id, category_id, name, description, sku, price, stock_quantity, availability, created_at, updated_at";

const ORDER_COLUMNS: &str =
    "id, user_id, status, shipping_address, notes, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, order_id, amount, status, method, transaction_id, gateway_reference, failure_reason, created_at, updated_at";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a new pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        tracing::info!(max_connections, "connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        Ok(PostgresTransaction {
            tx: self.pool.begin().await?,
        })
    }
}

/// Transaction over a [`PostgresStore`] connection.
///
/// Runs at the default READ COMMITTED isolation; row locks and conditional
/// updates carry the concurrency guarantees.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

fn write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        let constraint = db_err.constraint().unwrap_or_default().to_string();
        if db_err.is_unique_violation() {
            return StoreError::UniqueViolation { constraint };
        }
        if db_err.is_check_violation() || db_err.is_foreign_key_violation() {
            return StoreError::Constraint(constraint);
        }
    }
    StoreError::Database(err)
}

fn parse_column<T>(value: &str, column: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

fn to_count(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column}: negative value {value}")))
}

fn from_count(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| StoreError::Constraint(format!("{column}: {value} is out of range")))
}

fn row_to_user(row: PgRow) -> Result<User> {
    Ok(User {
        id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: parse_column(row.try_get::<&str, _>("role")?, "users.role")?,
        availability: parse_column(
            row.try_get::<&str, _>("availability")?,
            "users.availability",
        )?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_category(row: PgRow) -> Result<Category> {
    Ok(Category {
        id: CategoryId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
        availability: parse_column(
            row.try_get::<&str, _>("availability")?,
            "categories.availability",
        )?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_product(row: PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        category_id: CategoryId::from_uuid(row.try_get::<Uuid, _>("category_id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        sku: row.try_get("sku")?,
        price: Money::new(row.try_get::<Decimal, _>("price")?),
        stock_quantity: to_count(row.try_get("stock_quantity")?, "products.stock_quantity")?,
        availability: parse_column(
            row.try_get::<&str, _>("availability")?,
            "products.availability",
        )?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_order_record(row: &PgRow) -> Result<OrderRecord> {
    Ok(OrderRecord {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        status: parse_column(row.try_get::<&str, _>("status")?, "orders.status")?,
        shipping_address: row.try_get("shipping_address")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn row_to_item(row: PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        product_name: row.try_get("product_name")?,
        unit_price: Money::new(row.try_get::<Decimal, _>("unit_price")?),
        quantity: to_count(row.try_get("quantity")?, "order_items.quantity")?,
        subtotal: Money::new(row.try_get::<Decimal, _>("subtotal")?),
    })
}

fn row_to_payment(row: PgRow) -> Result<Payment> {
    Ok(Payment::from_storage(PaymentRecord {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        amount: Money::new(row.try_get::<Decimal, _>("amount")?),
        status: parse_column(row.try_get::<&str, _>("status")?, "payments.status")?,
        method: parse_column(row.try_get::<&str, _>("method")?, "payments.method")?,
        transaction_id: row.try_get("transaction_id")?,
        gateway_reference: row.try_get("gateway_reference")?,
        failure_reason: row.try_get("failure_reason")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    }))
}

impl PostgresTransaction {
    /// Loads the lines of several orders at once, grouped by order.
    async fn load_items(&mut self, order_ids: &[Uuid]) -> Result<HashMap<OrderId, Vec<OrderItem>>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, product_name, unit_price, quantity, subtotal
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no ASC
            "#,
        )
        .bind(order_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut grouped: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let item = row_to_item(row)?;
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(grouped)
    }

    /// Turns header rows into orders, keeping the row order.
    async fn assemble_orders(&mut self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let records = rows
            .iter()
            .map(row_to_order_record)
            .collect::<Result<Vec<_>>>()?;
        let ids: Vec<Uuid> = records.iter().map(|r| r.id.as_uuid()).collect();
        let mut items = self.load_items(&ids).await?;

        Ok(records
            .into_iter()
            .map(|record| {
                let lines = items.remove(&record.id).unwrap_or_default();
                Order::from_storage(record, lines)
            })
            .collect())
    }

    async fn fetch_order(&mut self, id: OrderId, lock: bool) -> Result<Option<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => Ok(self.assemble_orders(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn find_user(&mut self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, email, password_hash, role, availability, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_user).transpose()
    }

    async fn insert_user(&mut self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, role, availability, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.availability.as_str())
        .bind(user.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn find_category(&mut self, id: CategoryId) -> Result<Option<Category>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, slug, description, availability, created_at
            FROM categories
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_category).transpose()
    }

    async fn insert_category(&mut self, category: &Category) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO categories (id, name, slug, description, availability, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(category.id.as_uuid())
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.description)
        .bind(category.availability.as_str())
        .bind(category.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn find_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_product).transpose()
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(product.id.as_uuid())
        .bind(product.category_id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.sku)
        .bind(product.price.amount())
        .bind(from_count(product.stock_quantity, "products.stock_quantity")?)
        .bind(product.availability.as_str())
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn decrement_stock(
        &mut self,
        id: ProductId,
        quantity: u32,
    ) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity - $2, updated_at = NOW()
            WHERE id = $1 AND stock_quantity >= $2
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(from_count(quantity, "quantity")?)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(write_error)?;

        row.map(row_to_product).transpose()
    }

    async fn restore_stock(&mut self, id: ProductId, quantity: u32) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(from_count(quantity, "quantity")?)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(write_error)?;

        row.map(row_to_product).transpose()
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, total_amount, shipping_address, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.user_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.total_amount().amount())
        .bind(order.shipping_address())
        .bind(order.notes())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;

        for (line_no, item) in order.items().iter().enumerate() {
            let line_no = i32::try_from(line_no)
                .map_err(|_| StoreError::Constraint("order_items.line_no out of range".into()))?;
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, line_no, product_id, product_name, unit_price, quantity, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(line_no)
            .bind(item.product_id.as_uuid())
            .bind(&item.product_name)
            .bind(item.unit_price.amount())
            .bind(from_count(item.quantity, "order_items.quantity")?)
            .bind(item.subtotal.amount())
            .execute(&mut *self.tx)
            .await
            .map_err(write_error)?;
        }

        Ok(())
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.fetch_order(id, false).await
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        self.fetch_order(id, true).await
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, total_amount = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.total_amount().amount())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!(
                "update of unknown order {}",
                order.id()
            )));
        }
        Ok(())
    }

    async fn items_for_order(&mut self, id: OrderId) -> Result<Vec<OrderItem>> {
        let mut grouped = self.load_items(&[id.as_uuid()]).await?;
        Ok(grouped.remove(&id).unwrap_or_default())
    }

    async fn orders_for_user(&mut self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        self.assemble_orders(rows).await
    }

    async fn orders_by_status(&mut self, status: OrderStatus) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(status.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        self.assemble_orders(rows).await
    }

    async fn all_orders(&mut self) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&mut *self.tx)
        .await?;

        self.assemble_orders(rows).await
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO payments ({PAYMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(payment.id().as_uuid())
        .bind(payment.order_id().as_uuid())
        .bind(payment.amount().amount())
        .bind(payment.status().as_str())
        .bind(payment.method().as_str())
        .bind(payment.transaction_id())
        .bind(payment.gateway_reference())
        .bind(payment.failure_reason())
        .bind(payment.created_at())
        .bind(payment.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, transaction_id = $3, gateway_reference = $4,
                failure_reason = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(payment.id().as_uuid())
        .bind(payment.status().as_str())
        .bind(payment.transaction_id())
        .bind(payment.gateway_reference())
        .bind(payment.failure_reason())
        .bind(payment.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(write_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!(
                "update of unknown payment {}",
                payment.id()
            )));
        }
        Ok(())
    }

    async fn find_payment_for_order(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_payment).transpose()
    }

    async fn lock_payment(&mut self, id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_payment).transpose()
    }

    async fn lock_payment_by_transaction(
        &mut self,
        transaction_id: &str,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1 FOR UPDATE"
        ))
        .bind(transaction_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_payment).transpose()
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
