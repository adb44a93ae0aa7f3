//! Axum route handlers for the fnd HTTP server.
//!
//! # Routes
//!
//! - `GET  /health`    — Returns `{"status": "ok"}`
//! - `GET  /debug/fnd` — Pipeline diagnostics (stage flags, callable surfaces, roots)
//! - `POST /analyze`   — Runs the credibility pipeline on one article

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::bridge::{DiagnosticReport, Evidence, PipelineBridge};

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    /// The pipeline singleton shared by all requests.
    pub bridge: Arc<PipelineBridge>,
}

impl AppState {
    /// State rooted at the application base directory.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            bridge: Arc::new(PipelineBridge::new(base_dir)),
        }
    }

    /// State around an existing bridge.
    pub fn with_bridge(bridge: Arc<PipelineBridge>) -> Self {
        Self { bridge }
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/debug/fnd", get(debug_handler))
        .route("/analyze", post(analyze_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

/// CORS layer from the `CORS_ORIGINS` comma-separated list (defaults to the
/// local frontend origin). Credentials are allowed, so origins, methods, and
/// headers are all explicit lists.
pub fn cors_layer() -> CorsLayer {
    let origins = std::env::var("CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());
    let origins: Vec<HeaderValue> = origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Request body for `POST /analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub k: Option<u32>,
}

/// Response body for `POST /analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub label: String,
    pub score: f64,
    pub evidence: Vec<Evidence>,
    pub explanation: Option<Value>,
}

/// GET /health — liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /debug/fnd — pipeline diagnostics (triggers lazy init).
async fn debug_handler(
    State(state): State<AppState>,
) -> Result<Json<DiagnosticReport>, (StatusCode, Json<Value>)> {
    state.bridge.introspect().await.map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
    })
}

/// POST /analyze — run the pipeline on one article.
///
/// `400` when `text` is blank after trimming; `500` with the bridge error
/// message on any mandatory-stage failure; otherwise `200` with best-effort
/// evidence and explanation.
async fn analyze_handler(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, (StatusCode, Json<Value>)> {
    if request.text.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "No text provided" })),
        ));
    }

    let k = request.k.unwrap_or(3);
    let result = state
        .bridge
        .analyze(&request.title, &request.text, k)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        })?;

    Ok(Json(AnalyzeResponse {
        label: result.label,
        score: result.score,
        evidence: result.evidence,
        // only structured explanations cross the API boundary
        explanation: result.explanation.filter(Value::is_object),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
