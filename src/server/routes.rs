use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::time::timeout;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::core::protocol::{FeedbackRecord, FeedbackRequest, FeedbackResult};
use crate::server::host::HostLauncher;

#[derive(Clone)]
pub struct AppState {
    pub launcher: Arc<HostLauncher>,
    pub request_timeout: Duration,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/run_feedback_ui/", post(run_feedback_ui))
        .layer(
            ServiceBuilder::new().layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}

pub async fn start_server(port: u16, state: AppState) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("AskUser server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

/// Run one feedback session in its own host process and reply with its
/// result. Requests are serviced one host each; a request that outlives
/// the timeout gets its host torn down.
async fn run_feedback_ui(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Response {
    let request_id = Uuid::new_v4();
    tracing::info!(
        "[{}] Feedback requested for {}",
        request_id,
        request.project_directory
    );

    let mut host = match state.launcher.spawn(&request) {
        Ok(host) => host,
        Err(e) => {
            tracing::error!("[{}] Could not start session host: {}", request_id, e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Could not start feedback session: {}", e),
            );
        }
    };

    let result = match timeout(state.request_timeout, host.read_result()).await {
        Ok(Ok(result)) => {
            host.shutdown().await;
            result
        }
        Ok(Err(e)) => {
            tracing::error!("[{}] Session host {} failed: {}", request_id, host.pid(), e);
            host.terminate().await;
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error processing feedback result: {}", e),
            );
        }
        Err(_) => {
            tracing::error!(
                "[{}] Session host {} timed out after {}s",
                request_id,
                host.pid(),
                state.request_timeout.as_secs()
            );
            host.terminate().await;
            return error_response(
                StatusCode::GATEWAY_TIMEOUT,
                "Feedback session timed out.".to_string(),
            );
        }
    };

    if let Some(path) = &request.server_save_path {
        persist_result(path, &result);
    }

    tracing::info!(
        "[{}] Feedback collected: {} log bytes, {} feedback bytes",
        request_id,
        result.logs.len(),
        result.interactive_feedback.len()
    );
    Json(result).into_response()
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorBody { error })).into_response()
}

fn persist_result(path: &str, result: &FeedbackResult) {
    match write_record(Path::new(path), result) {
        Ok(()) => tracing::info!("Feedback result saved to: {}", path),
        Err(e) => tracing::warn!("Could not save feedback result to {}: {}", path, e),
    }
}

fn write_record(path: &Path, result: &FeedbackResult) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(&FeedbackRecord::new(result))?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn record_is_written_with_parents_created() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nested/out/result.json");
        let result = FeedbackResult {
            logs: "$ true\n".to_string(),
            interactive_feedback: "ship it".to_string(),
        };
        write_record(&target, &result).unwrap();

        let record: FeedbackRecord =
            serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(record.interactive_feedback, "ship it");
        assert_eq!(record.logs, "$ true\n");
    }
}
