//! Review gateway: the HTTP face of the approval queue.
//!
//! Maps the reviewer operations directly onto the queue contract (list
//! pending, approve, reject, statistics) plus a health probe. Everything
//! else about transport stays out of the decision core.

use crate::approval::{ApprovalQueue, PendingFilter, Priority, RequestKind};
use crate::error::ApprovalError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<ApprovalQueue>,
}

pub fn router(queue: Arc<ApprovalQueue>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/review/pending", get(handle_pending))
        .route("/review/{id}/approve", post(handle_approve))
        .route("/review/{id}/reject", post(handle_reject))
        .route("/review/stats", get(handle_stats))
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .with_state(AppState { queue })
}

/// Serve the review API until the task is cancelled.
pub async fn serve(queue: Arc<ApprovalQueue>, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "Review gateway listening");
    axum::serve(listener, router(queue)).await?;
    Ok(())
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct PendingParams {
    kind: Option<RequestKind>,
    priority: Option<Priority>,
    limit: Option<usize>,
}

async fn handle_pending(
    State(state): State<AppState>,
    Query(params): Query<PendingParams>,
) -> Json<serde_json::Value> {
    let pending = state.queue.pending(&PendingFilter {
        kind: params.kind,
        priority: params.priority,
        limit: params.limit,
    });
    Json(serde_json::json!({ "pending": pending }))
}

#[derive(Debug, Deserialize)]
struct ReviewBody {
    reviewer: String,
    notes: Option<String>,
}

async fn handle_approve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewBody>,
) -> (StatusCode, Json<serde_json::Value>) {
    resolve_response(state.queue.approve(id, &body.reviewer, body.notes.as_deref()))
}

async fn handle_reject(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewBody>,
) -> (StatusCode, Json<serde_json::Value>) {
    resolve_response(state.queue.reject(id, &body.reviewer, body.notes.as_deref()))
}

async fn handle_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.queue.statistics()))
}

fn resolve_response(
    result: Result<crate::approval::ApprovalRequest, ApprovalError>,
) -> (StatusCode, Json<serde_json::Value>) {
    match result {
        Ok(request) => (StatusCode::OK, Json(serde_json::json!(request))),
        Err(err) => {
            let status = match &err {
                ApprovalError::NotFound { .. } => StatusCode::NOT_FOUND,
                ApprovalError::Conflict { .. } => StatusCode::CONFLICT,
                ApprovalError::Expired { .. } => StatusCode::GONE,
            };
            (status, Json(serde_json::json!({ "error": err.to_string() })))
        }
    }
}
