// ABOUTME: HTTP server receiving Slack Events API callbacks and interactivity payloads.
// ABOUTME: Acknowledges immediately and hands work to background tasks; serves health and metrics.

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Form, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use slackline_core::approval::ApprovalRegistry;
use slackline_core::metrics;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::actions::ActionHandler;
use crate::responder::Responder;
use crate::slack::events::{BlockActionsPayload, EventEnvelope};

/// Shared state for all routes
#[derive(Clone)]
pub struct AppState {
    pub responder: Responder,
    pub actions: ActionHandler,
    pub approvals: ApprovalRegistry,
    pub metrics: PrometheusHandle,
}

/// Form body Slack posts to the interactivity URL
#[derive(Debug, Deserialize)]
pub struct ActionForm {
    pub payload: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/slack/events", post(events_handler))
        .route("/slack/actions", post(actions_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind and serve until `shutdown` is cancelled
pub async fn serve(addr: &str, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %addr, "Listening for Slack events");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn events_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let envelope: EventEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting malformed event body");
            metrics::record_inbound("events", "bad_request");
            return (StatusCode::BAD_REQUEST, "malformed event body").into_response();
        }
    };

    match envelope {
        EventEnvelope::UrlVerification { challenge } => {
            tracing::info!("Answering url_verification challenge");
            metrics::record_inbound("events", "url_verification");
            Json(json!({ "challenge": challenge })).into_response()
        }
        EventEnvelope::EventCallback { event_id, event } => {
            let spawned = state.responder.accept(event_id.as_deref(), event);
            metrics::record_inbound("events", if spawned { "accepted" } else { "ignored" });
            StatusCode::OK.into_response()
        }
        EventEnvelope::Other => {
            metrics::record_inbound("events", "ignored");
            StatusCode::OK.into_response()
        }
    }
}

async fn actions_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ActionForm>,
) -> StatusCode {
    let payload: BlockActionsPayload = match serde_json::from_str(&form.payload) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting malformed interaction payload");
            metrics::record_inbound("actions", "bad_request");
            return StatusCode::BAD_REQUEST;
        }
    };

    metrics::record_inbound("actions", "accepted");
    let actions = state.actions.clone();
    tokio::spawn(async move {
        actions.handle(&payload).await;
    });
    StatusCode::OK
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.approvals.pending() {
        Ok(pending) => Json(json!({
            "status": "ok",
            "pending_approvals": pending.len(),
            "running_turns": state.responder.running_turns(),
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Health check could not read approvals");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics.render()
}
