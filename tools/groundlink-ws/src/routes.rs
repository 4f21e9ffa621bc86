// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Route definitions.

use crate::handlers;
use crate::AppState;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/ws", get(handlers::ws))
        .route("/ws/", get(handlers::ws))
        .route("/test", get(handlers::test))
        .route("/health", get(handlers::health));

    let web_dir = &state.config.web_dir;
    if web_dir.is_dir() {
        info!("Serving web assets from {}", web_dir.display());
        router = router.fallback_service(ServeDir::new(web_dir));
    } else {
        warn!(
            "Web directory {} not found, serving embedded demo page",
            web_dir.display()
        );
        router = router.route("/", get(handlers::demo_page));
    }

    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
