// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP and WebSocket handlers.

use crate::socket;
use crate::AppState;
use axum::{
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::{Html, IntoResponse},
    Json,
};
use groundlink::{CloseReason, Session};
use std::sync::Arc;
use tracing::{debug, warn};

/// WebSocket upgrade handler
pub async fn ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Some(slot) = state.try_reserve_client() else {
        warn!("Connection rejected: max clients reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    let session = Session::new(state.relay.clone(), state.shutdown.clone());
    let session_id = session.id().to_string();

    ws.on_failed_upgrade(move |e| warn!("[{}] Upgrade failed: {}", session_id, e))
        .on_upgrade(move |socket| async move {
            let _slot = slot;
            let summary = socket::serve(session, socket).await;
            if summary.close_reason() == Some(CloseReason::Error) {
                debug!("[{}] Closed with error: {:?}", summary.id, summary.error);
            }
        })
        .into_response()
}

/// Liveness probe with a fixed body.
pub async fn test() -> &'static str {
    "ok"
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "clients": state.relay.session_count(),
        "max_clients": state.config.max_clients,
        "sample_period_ms": state.config.sample_period_ms,
        "relay": state.relay.stats().snapshot(),
    }))
}

/// Embedded demo page, served when no web directory is available.
pub async fn demo_page() -> Html<&'static str> {
    Html(include_str!("demo.html"))
}
