// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::{DefaultBodyLimit, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::detect::detect_handler;
use super::handlers::{DetectorHealth, EnhancerHealth, HealthResponse};
use crate::pipeline::Pipeline;
use crate::version;

/// Multipart framing allowance on top of the raw upload limit
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .pipeline
        .max_upload_bytes()
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/", get(root_handler))
        // Health check
        .route("/health", get(health_handler))
        // Upload endpoints
        .route("/upload", post(detect_handler))
        .route("/v1/detect", post(detect_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(addr: SocketAddr, pipeline: Pipeline) -> anyhow::Result<()> {
    let app = build_router(AppState::new(pipeline));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({ "message": "Welcome to the skyscan detection node" }))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let detector = state.pipeline.detector();
    let enhancer = state.pipeline.enhancer();

    Json(HealthResponse {
        status: if detector.is_ready() { "ok" } else { "degraded" }.to_string(),
        version: version::VERSION_NUMBER.to_string(),
        detector: DetectorHealth {
            name: detector.name().to_string(),
            ready: detector.is_ready(),
        },
        enhancer: EnhancerHealth {
            name: enhancer.name().to_string(),
            configured: enhancer.is_configured(),
        },
    })
}
