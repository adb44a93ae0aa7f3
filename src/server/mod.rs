//! HTTP server exposing the credibility pipeline.
//!
//! # Endpoints
//!
//! - `GET  /health`    — Liveness probe
//! - `GET  /debug/fnd` — Pipeline diagnostics
//! - `POST /analyze`   — Analyze one article

pub mod routes;

pub use routes::{app_router, AppState};
