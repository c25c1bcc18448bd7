//! HTTP query surface over the store, plus the shared router.
//!
//! Thin by design: pagination, single lookup, aggregates, health. Real-time
//! consumers use the WebSocket endpoint.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use chainfeed_core::error::StoreError;
use chainfeed_storage::{TxQuery, TxStore};

use crate::hub::SubscriberHub;
use crate::ws::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<SubscriberHub>,
    pub store: Arc<dyn TxStore>,
}

/// Build the full HTTP+WS router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/transactions", get(list_transactions))
        .route("/api/transactions/:hash", get(get_transaction))
        .route("/api/stats", get(stats))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

enum ApiError {
    NotFound,
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response()
            }
            ApiError::Store(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response(),
        }
    }
}

async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TxQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.store.find_page(&query).await?;
    Ok(Json(page))
}

async fn get_transaction(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.store.find(&hash.to_ascii_lowercase()).await? {
        Some(tx) => Ok(Json(tx)),
        None => Err(ApiError::NotFound),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsQuery {
    chain_id: Option<u64>,
}

async fn stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let agg = state.store.aggregate(query.chain_id).await?;
    Ok(Json(agg))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "chains": state.hub.chain_statuses(),
        "subscribers": state.hub.subscriber_count(),
    }))
}
