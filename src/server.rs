//! HTTP surface: `GET /process` runs the pipeline, `GET /health` answers liveness probes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::pipeline::{PipelineError, PipelineResult, RecipePipeline};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RecipePipeline>,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
pub struct ProcessParams {
    #[serde(default)]
    pub input: String,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

async fn process_handler(
    State(state): State<AppState>,
    Query(params): Query<ProcessParams>,
) -> Result<Json<PipelineResult>, PipelineError> {
    let span = info_span!("process", request_id = %Uuid::new_v4());
    async move {
        info!(input_chars = params.input.len(), "Processing request");
        match state
            .pipeline
            .run_within(&params.input, state.request_timeout)
            .await
        {
            Ok(result) => {
                info!(ingredients = result.ingredients.len(), "Request completed");
                Ok(Json(result))
            }
            Err(e) => {
                error!(error = %e, "Request failed");
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/process", get(process_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Binds `config.host:config.port` and serves until Ctrl-C.
pub async fn serve(config: &ServerConfig, state: AppState) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(address = %addr, "Recipe server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated unexpectedly")
}
