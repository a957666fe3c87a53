use axum::{extract::FromRef, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use freelancer_chat_server::{handlers, health, metrics, middleware, realtime};

#[derive(Clone, FromRef)]
struct AppState {
    db_pool: PgPool,
    registry: Arc<realtime::ConnectionRegistry>,
    metrics_handle: PrometheusHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "freelancer_chat_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("Starting Freelancer Chat Server");

    // Initialize metrics
    let metrics_recorder = metrics::MetricsRecorder::new();
    let metrics_handle = metrics_recorder.handle().clone();
    tracing::info!("Metrics initialized");

    // Initialize database
    let db_pool = freelancer_chat_server::db::init_db_default().await?;
    tracing::info!("Database initialized");

    // Shared registry of live chat connections
    let registry = Arc::new(realtime::ConnectionRegistry::new());

    let app_state = AppState {
        db_pool,
        registry,
        metrics_handle,
    };

    // Build application router
    let app = Router::new()
        // Health check endpoints
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        // Chat endpoints
        .route("/chat", get(handlers::get_conversation))
        .route("/chat/inbox", get(handlers::get_inbox))
        .route("/chat/ws", get(realtime::chat_ws))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(axum::middleware::from_fn(
            middleware::log_requests_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(middleware::trace_span_for))
        .with_state(app_state);

    let port = std::env::var("SERVER_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
