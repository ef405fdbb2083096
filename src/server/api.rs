//! HTTP API.
//!
//! Exposes the route table and the query cache:
//! - GET /routes
//! - GET /routes/{*path}
//! - GET /cache/stats
//! - POST /cache/invalidate
//! - GET /metrics
//! - GET /health

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::RouteError;
use crate::query::client::CacheStats;
use crate::routes::table::{Navigation, RouteTable};
use crate::rpc::utils::ApiUtils;

/// Application state shared across handlers.
pub struct AppState {
    pub api: ApiUtils,
    pub routes: RouteTable,
    pub config: Arc<Config>,
    pub start_time: Instant,
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let timeout = state.config.server.request_timeout();

    Router::new()
        .route("/routes", get(list_routes))
        .route("/routes/{*path}", get(navigate))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/invalidate", post(invalidate))
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(timeout))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// ─── Request/Response Types ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RouteList {
    pub routes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct InvalidateRequest {
    /// Procedure path or dotted prefix, e.g. "posts".
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub invalidated: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache_entries: usize,
    pub in_flight: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Maps route failures to HTTP statuses.
pub struct ApiError(RouteError);

impl From<RouteError> for ApiError {
    fn from(e: RouteError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RouteError::NotFound(_) => StatusCode::NOT_FOUND,
            RouteError::Fetch(_) => StatusCode::BAD_GATEWAY,
            RouteError::Serialize(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn list_routes(State(state): State<Arc<AppState>>) -> Json<RouteList> {
    Json(RouteList {
        routes: state.routes.paths(),
    })
}

async fn navigate(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Json<Navigation>, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    info!(request_id = request_id, path = path, "Route request");

    match state.routes.navigate(&path).await {
        Ok(nav) => Ok(Json(nav)),
        Err(e) => {
            warn!(request_id = request_id, path = path, error = %e, "Route load failed");
            Err(e.into())
        }
    }
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStats> {
    Json(state.api.client().stats().await)
}

async fn invalidate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InvalidateRequest>,
) -> Json<InvalidateResponse> {
    let invalidated = state.api.client().invalidate_prefix(&req.path).await;
    Json(InvalidateResponse { invalidated })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.api.client().metrics().render(),
    )
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.api.client().stats().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        cache_entries: stats.total_entries,
        in_flight: stats.in_flight,
    })
}
