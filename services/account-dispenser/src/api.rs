//! Public HTTP surface
//!
//! - `GET /api/get-account` hands out one account per call
//! - `GET /health` reports pool health, 503 when nothing can be handed out
//! - `GET /metrics` renders Prometheus text exposition

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

use account_pool::AccountPool;

use crate::config::ServerConfig;
use crate::error::ApiError;

const GET_ACCOUNT_ROUTE: &str = "/api/get-account";
const HEALTH_ROUTE: &str = "/health";

/// Shared application state accessible from all public handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<AccountPool>,
    pub prometheus: PrometheusHandle,
}

/// Build the public router.
///
/// Applies CORS from `allowed_origins` and a concurrency limit of
/// `max_connections` in-flight requests.
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route(GET_ACCOUNT_ROUTE, get(get_account))
        .route(HEALTH_ROUTE, get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(build_cors_layer(&server.allowed_origins))
        .layer(tower::limit::ConcurrencyLimitLayer::new(server.max_connections))
        .with_state(state)
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any);

    if allowed_origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

/// GET /api/get-account
///
/// The allocation runs in its own task so a client disconnect cannot drop it
/// between its cooldown and available writes.
async fn get_account(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());

    let pool = Arc::clone(&state.pool);
    let result = match tokio::spawn(async move { pool.allocate().await }).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            error!(request_id, error = %e, "allocation task failed");
            Err(ApiError::Database)
        }
    };

    let response = match result {
        Ok(account) => {
            info!(request_id, "account dispensed");
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "success": true,
                    "account": account.expose(),
                })),
            )
                .into_response()
        }
        Err(e) => {
            match e {
                ApiError::OutOfStock => debug!(request_id, "no account available"),
                ApiError::Database => warn!(request_id, "account allocation failed"),
            }
            e.into_response()
        }
    };

    crate::metrics::record_request(
        GET_ACCOUNT_ROUTE,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let response = pool_health(&state.pool).await;
    crate::metrics::record_request(
        HEALTH_ROUTE,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// Pool health as JSON: 200 while an account is available, 503 when the
/// pool is empty or the store cannot be read.
pub(crate) async fn pool_health(pool: &AccountPool) -> Response {
    match pool.health(SystemTime::now()).await {
        Ok(body) => {
            let status = if body["status"] == "healthy" {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, Json(body)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "pool health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "error": ApiError::Database.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// Prometheus metrics endpoint
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}
