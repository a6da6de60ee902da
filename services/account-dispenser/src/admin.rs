//! Admin API
//!
//! Runs on a separate listener (`server.admin_listen_addr`, conventionally
//! 127.0.0.1:9090) and is never exposed with the public API.
//!
//! Endpoints:
//! - GET  /admin/pool: pool status summary, same body as `/health`
//! - POST /admin/sweep: run one recycler sweep now

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tracing::{error, info};

use account_pool::AccountPool;

use crate::error::ApiError;

/// Shared state for admin API handlers.
#[derive(Clone)]
pub struct AdminState {
    pool: Arc<AccountPool>,
}

impl AdminState {
    pub fn new(pool: Arc<AccountPool>) -> Self {
        Self { pool }
    }
}

/// Build the admin router.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/pool", get(pool_status))
        .route("/admin/sweep", post(sweep_now))
        .with_state(state)
}

/// GET /admin/pool
async fn pool_status(State(state): State<AdminState>) -> Response {
    crate::api::pool_health(&state.pool).await
}

/// POST /admin/sweep: promote every expired cooldown entry immediately.
///
/// Shares the pool lock with the background recycler, so a manual sweep and a
/// scheduled one never interleave.
async fn sweep_now(State(state): State<AdminState>) -> Response {
    let pool = Arc::clone(&state.pool);
    match tokio::spawn(async move { pool.sweep().await }).await {
        Ok(Ok(report)) => {
            info!(
                moved = report.moved,
                retained = report.retained,
                "manual sweep completed"
            );
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({
                    "retained": report.retained,
                    "moved": report.moved,
                })),
            )
                .into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "manual sweep failed");
            ApiError::from(e).into_response()
        }
        Err(e) => {
            error!(error = %e, "manual sweep task failed");
            ApiError::Database.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use account_pool::{Account, CooldownEntry, CooldownLine, PoolPaths, PoolStore};
    use axum::body::Body;
    use axum::http::Request;
    use std::time::{Duration, SystemTime};
    use tower::ServiceExt;

    const COOLDOWN: Duration = Duration::from_secs(3_600);

    async fn admin_app(dir: &tempfile::TempDir) -> (Router, Arc<AccountPool>) {
        let store = PoolStore::new(PoolPaths::in_dir(dir.path()));
        let now = SystemTime::now();
        let cooldown: Vec<CooldownLine> = vec![
            CooldownEntry::new(Account::new("expired"), now - COOLDOWN * 2).into(),
            CooldownEntry::new(Account::new("fresh"), now).into(),
        ];
        {
            let txn = store.lock().await;
            txn.available()
                .replace(&[Account::new("spare")])
                .await
                .unwrap();
            txn.cooldown().replace(&cooldown).await.unwrap();
        }
        let pool = Arc::new(AccountPool::new(store, COOLDOWN));
        (
            build_admin_router(AdminState::new(Arc::clone(&pool))),
            pool,
        )
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn pool_status_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _pool) = admin_app(&dir).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/admin/pool")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["accounts_available"], 1);
        assert_eq!(json["accounts_cooling_down"], 2);
        assert_eq!(json["accounts_released"], 0);
        assert_eq!(json["next_release_secs"], 0);
    }

    #[tokio::test]
    async fn sweep_promotes_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let (app, pool) = admin_app(&dir).await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/sweep")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({"retained": 1, "moved": 1})
        );

        let snapshot = pool.store().snapshot().await.unwrap();
        assert_eq!(snapshot.released, vec![Account::new("expired")]);
        assert_eq!(
            snapshot.cooldown[0].account(),
            Some(&Account::new("fresh"))
        );
        assert_eq!(snapshot.available, vec![Account::new("spare")]);
    }

    #[tokio::test]
    async fn sweep_store_failure_is_database_error() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _pool) = admin_app(&dir).await;
        std::fs::create_dir(PoolPaths::in_dir(dir.path()).released).unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/sweep")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"], "Database Error");
    }

    #[tokio::test]
    async fn sweep_requires_post() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _pool) = admin_app(&dir).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/admin/sweep")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
