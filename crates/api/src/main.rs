//! API server entry point.

use checkout::{PaymentGateway, SimulatedGateway};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use api::config::Config;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Serves the API over `store` until a shutdown signal arrives.
async fn run<S, G>(store: S, gateway: G, config: &Config, metrics_handle: PrometheusHandle)
where
    S: Store + Clone + 'static,
    G: PaymentGateway + 'static,
{
    let state = api::create_state(store, gateway, config);
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let gateway = SimulatedGateway::new(config.gateway_delay);

    // 3. Open the store and serve
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections)
                .await
                .expect("failed to connect to PostgreSQL");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            run(store, gateway, &config, metrics_handle).await;
        }
        None => {
            let store = InMemoryStore::new();
            let demo = api::seed_demo_catalog(&store)
                .await
                .expect("failed to seed demo catalog");
            tracing::info!(
                customer_id = %demo.customer.id,
                admin_id = %demo.admin.id,
                products = demo.products.len(),
                "DATABASE_URL not set, using in-memory store with demo catalog"
            );
            for product in &demo.products {
                tracing::info!(
                    product_id = %product.id,
                    name = %product.name,
                    stock = product.stock_quantity,
                    "demo product"
                );
            }
            run(store, gateway, &config, metrics_handle).await;
        }
    }
}
