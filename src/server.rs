//! Status/control HTTP API — the surface the dashboard consumes.
//!
//! Read-mostly: status, recent activity, recent errors. Control
//! commands flip the monitor's status; the cycle runner polls it at its
//! checkpoints, so `pause` and `stop` take effect between posts, never
//! mid-post.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::gate::ReplyGate;
use crate::monitor::{BotStatus, Monitor};
use crate::store::Store;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub store: Arc<dyn Store>,
    pub gate: Arc<ReplyGate>,
}

/// Build the Axum router for the status/control API.
pub fn api_routes(monitor: Arc<Monitor>, store: Arc<dyn Store>, gate: Arc<ReplyGate>) -> Router {
    let state = AppState {
        monitor,
        store,
        gate,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/activity", get(activity))
        .route("/api/errors", get(errors))
        .route("/api/control/{action}", post(control))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "replybot"
    }))
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.monitor.snapshot().await;
    // Totals come from the store so restarts don't zero the dashboard.
    let totals = match state.store.total_stats().await {
        Ok(totals) => Some(totals),
        Err(e) => {
            warn!(error = %e, "Failed to read total stats for status endpoint");
            None
        }
    };

    Json(serde_json::json!({
        "status": snapshot.status,
        "uptime_secs": snapshot.uptime_secs,
        "last_activity": snapshot.last_activity,
        "session_stats": snapshot.stats,
        "total_stats": totals,
        "sources": snapshot.sources,
        "providers": snapshot.providers,
        "reply_gate": state.gate.snapshot(),
    }))
}

#[derive(Debug, Deserialize)]
struct FeedQuery {
    limit: Option<usize>,
}

async fn activity(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(20).min(50);
    let activities = state.monitor.recent_activity(limit).await;
    Json(serde_json::json!({ "activities": activities }))
}

async fn errors(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(10).min(20);
    let errors = state.monitor.recent_errors(limit).await;
    Json(serde_json::json!({ "errors": errors }))
}

async fn control(
    State(state): State<AppState>,
    Path(action): Path<String>,
) -> impl IntoResponse {
    let (applied, message) = match action.as_str() {
        "start" => {
            state.monitor.set_status(BotStatus::Running).await;
            (true, "Bot started")
        }
        "stop" => {
            state.monitor.set_status(BotStatus::Stopped).await;
            (true, "Bot stopped")
        }
        "pause" => {
            state.monitor.set_status(BotStatus::Paused).await;
            (true, "Bot paused")
        }
        "resume" => {
            if state.monitor.resume().await {
                (true, "Bot resumed")
            } else {
                (false, "Bot is not paused")
            }
        }
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "success": false,
                    "message": "Unknown action"
                })),
            );
        }
    };

    if applied {
        info!(action, "Control command applied");
        state
            .monitor
            .log_activity("control", serde_json::json!({ "action": action }))
            .await;
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({ "success": applied, "message": message })),
    )
}

/// Bind and serve the API. Runs until the process exits.
pub async fn serve(router: Router, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Status API started");
    axum::serve(listener, router).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::store::LibSqlStore;

    async fn state() -> AppState {
        AppState {
            monitor: Arc::new(Monitor::new(
                vec!["india".into()],
                vec!["gemini".into()],
            )),
            store: Arc::new(LibSqlStore::open_memory().await.unwrap()),
            gate: Arc::new(ReplyGate::new(3, Duration::from_secs(600))),
        }
    }

    #[tokio::test]
    async fn control_start_and_stop_flip_status() {
        let state = state().await;
        control(State(state.clone()), Path("start".to_string())).await;
        assert_eq!(state.monitor.status().await, BotStatus::Running);

        control(State(state.clone()), Path("stop".to_string())).await;
        assert_eq!(state.monitor.status().await, BotStatus::Stopped);
    }

    #[tokio::test]
    async fn resume_requires_paused() {
        let state = state().await;
        control(State(state.clone()), Path("resume".to_string())).await;
        assert_eq!(state.monitor.status().await, BotStatus::Stopped);

        control(State(state.clone()), Path("pause".to_string())).await;
        control(State(state.clone()), Path("resume".to_string())).await;
        assert_eq!(state.monitor.status().await, BotStatus::Running);
    }

    #[tokio::test]
    async fn control_commands_land_in_activity_feed() {
        let state = state().await;
        control(State(state.clone()), Path("start".to_string())).await;

        let activities = state.monitor.recent_activity(10).await;
        assert_eq!(activities[0].kind, "control");
        assert_eq!(activities[0].details["action"], "start");
    }
}
