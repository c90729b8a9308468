//! HTTP API server with observability for the storefront checkout backend.
//!
//! Provides REST endpoints for order placement, cancellation, administration
//! and payment settlement, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use checkout::{OrderService, PaymentGateway, PaymentService};
use domain::{Category, Money, Product, Role, User};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{Store, StoreError, Transaction};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, G>(state: Arc<AppState<S, G>>, metrics_handle: PrometheusHandle) -> Router
where
    S: Store + Clone + 'static,
    G: PaymentGateway + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/api/orders", post(routes::orders::create::<S, G>))
        .route("/api/orders/my-orders", get(routes::orders::mine::<S, G>))
        .route("/api/orders/{id}", get(routes::orders::get::<S, G>))
        .route("/api/orders/{id}/cancel", put(routes::orders::cancel::<S, G>))
        .route("/api/orders/admin/all", get(routes::orders::admin_all::<S, G>))
        .route(
            "/api/orders/admin/status/{status}",
            get(routes::orders::admin_by_status::<S, G>),
        )
        .route(
            "/api/orders/admin/{id}/status",
            put(routes::orders::admin_update_status::<S, G>),
        )
        .route("/api/payments", post(routes::payments::process::<S, G>))
        .route(
            "/api/payments/order/{order_id}",
            get(routes::payments::for_order::<S, G>),
        )
        .route(
            "/api/payments/webhook/simulate",
            post(routes::payments::webhook::<S, G>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over `store`, settling payments through
/// `gateway` under the configured timeout.
pub fn create_state<S, G>(store: S, gateway: G, config: &Config) -> Arc<AppState<S, G>>
where
    S: Store + Clone + 'static,
    G: PaymentGateway + 'static,
{
    Arc::new(AppState {
        orders: OrderService::new(store.clone()),
        payments: PaymentService::new(store, gateway).with_gateway_timeout(config.gateway_timeout),
    })
}

/// Records inserted by [`seed_demo_catalog`].
#[derive(Debug, Clone)]
pub struct DemoCatalog {
    pub customer: User,
    pub admin: User,
    pub category: Category,
    pub products: Vec<Product>,
}

/// Inserts a customer, an admin and a small catalog so the server is usable
/// without a database.
pub async fn seed_demo_catalog<S: Store>(store: &S) -> Result<DemoCatalog, StoreError> {
    let customer = User::new("demo", "demo@example.com", "demo-password-hash");
    let admin =
        User::new("admin", "admin@example.com", "admin-password-hash").with_role(Role::Admin);
    let category = Category::new("Electronics", "electronics");
    let products = vec![
        Product::new(category.id, "Wireless Mouse", Money::from_cents(2_499), 50)
            .with_sku("ELEC-MOUSE-001"),
        Product::new(category.id, "Mechanical Keyboard", Money::from_cents(8_999), 25)
            .with_sku("ELEC-KEYB-001"),
        Product::new(category.id, "USB-C Hub", Money::from_cents(3_950), 5)
            .with_sku("ELEC-HUB-001"),
    ];

    let mut tx = store.begin().await?;
    tx.insert_user(&customer).await?;
    tx.insert_user(&admin).await?;
    tx.insert_category(&category).await?;
    for product in &products {
        tx.insert_product(product).await?;
    }
    tx.commit().await?;

    Ok(DemoCatalog {
        customer,
        admin,
        category,
        products,
    })
}
