use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use chrono::Utc;
use nudge_core::models::{ChangeEventsResponse, SyncBatchRequest, SyncBatchResponse};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::require_auth;
use crate::authority::SyncAuthority;
use crate::config::AppConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub authority: Arc<SyncAuthority>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            authority: Arc::new(SyncAuthority::new()),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/sync/batch", post(sync_batch))
        .route("/sync/events", get(sync_events))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp_millis(),
    })
}

async fn sync_batch(
    State(state): State<AppState>,
    Json(request): Json<SyncBatchRequest>,
) -> Result<Json<SyncBatchResponse>, AppError> {
    let now = Utc::now().timestamp_millis();
    let response = state.authority.apply_batch(&request, now).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    owner_id: String,
    since: Option<i64>,
}

async fn sync_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<ChangeEventsResponse>, AppError> {
    if query.owner_id.trim().is_empty() {
        return Err(AppError::bad_request("owner_id is required"));
    }
    let events = state
        .authority
        .events_since(&query.owner_id, query.since)
        .await;
    Ok(Json(ChangeEventsResponse { events }))
}
