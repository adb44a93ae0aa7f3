//! fnd HTTP server binary.
//!
//! # Environment Variables
//!
//! - `PORT` — HTTP port (default: 8000)
//! - `FND_BASE_DIR` — application base directory holding `secrets/` and
//!   `vendor/` (default: current directory)
//! - `GCP_SA_KEY` / `GOOGLE_APPLICATION_CREDENTIALS` — service-account key
//!   candidates, in that priority order
//! - `CORS_ORIGINS` — comma-separated allowed origins (default:
//!   `http://localhost:3000`)
//! - `RUST_LOG` — tracing filter (default: "info,fnd=debug")

use std::path::PathBuf;

use fnd::server::{app_router, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fnd=debug".into()),
        )
        .init();

    let base_dir = std::env::var("FND_BASE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::current_dir().expect("cannot read current directory"));
    let port = std::env::var("PORT").unwrap_or_else(|_| "8000".to_string());
    let bind_addr = format!("0.0.0.0:{}", port);

    let state = AppState::new(&base_dir);

    // Warm the pipeline in the background. Failure is logged, not fatal: the
    // server stays up so /debug/fnd can be used to diagnose.
    {
        let bridge = state.bridge.clone();
        tokio::spawn(async move {
            match bridge.introspect().await {
                Ok(report) => tracing::info!(
                    retriever = report.retriever_loaded,
                    explainer = report.explainer_loaded,
                    "pipeline warmup complete"
                ),
                Err(e) => tracing::warn!(error = %e, "pipeline warmup failed"),
            }
        });
    }

    let app = app_router(state);

    tracing::info!("fnd server v{} starting on {}", fnd::VERSION, bind_addr);
    tracing::info!(base_dir = %base_dir.display(), "application base directory");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health    — liveness probe");
    tracing::info!("  GET  /debug/fnd — pipeline diagnostics");
    tracing::info!("  POST /analyze   — article analysis");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .await
        .expect("Server failed");
}
