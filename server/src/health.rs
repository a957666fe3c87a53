use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use sqlx::PgPool;
use std::{sync::Arc, time::SystemTime};

use crate::realtime::ConnectionRegistry;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: u64,
    version: String,
    checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    database: CheckStatus,
    realtime: RealtimeHealthStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    ready: bool,
    checks: ReadinessChecks,
}

#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    database: bool,
}

/// Health status for the realtime chat channel.
#[derive(Debug, Serialize)]
pub struct RealtimeHealthStatus {
    /// Number of currently open chat connections
    open_connections: usize,
    status: CheckStatus,
}

/// Liveness probe - checks if the application is running
/// Should return 200 OK if the application is alive
pub async fn liveness() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Readiness probe - checks if the application is ready to serve traffic.
/// Returns 200 OK when the database is reachable, 503 otherwise.
pub async fn readiness(State(pool): State<PgPool>) -> (StatusCode, Json<ReadinessResponse>) {
    let db_ready = check_database(&pool).await;

    let status = if db_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready: db_ready,
            checks: ReadinessChecks { database: db_ready },
        }),
    )
}

/// Health endpoint - detailed health information including database state
/// and realtime connection stats.
pub async fn health(
    State(pool): State<PgPool>,
    State(registry): State<Arc<ConnectionRegistry>>,
) -> (StatusCode, Json<HealthResponse>) {
    let db_healthy = check_database(&pool).await;
    let db_status = if db_healthy {
        CheckStatus::Healthy
    } else {
        CheckStatus::Unhealthy
    };

    // The registry is in-process state; reporting it can't fail.
    let realtime = RealtimeHealthStatus {
        open_connections: registry.connection_count(),
        status: CheckStatus::Healthy,
    };

    let status = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let timestamp = match SystemTime::now().duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => d.as_secs(),
        Err(_) => 0,
    };

    (
        status,
        Json(HealthResponse {
            status: if db_healthy {
                "healthy".to_string()
            } else {
                "unhealthy".to_string()
            },
            timestamp,
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks: HealthChecks {
                database: db_status,
                realtime,
            },
        }),
    )
}

async fn check_database(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}
