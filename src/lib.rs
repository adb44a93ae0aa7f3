//! # fnd — fake-news detection backend
//!
//! A thin orchestration layer exposing a news-article credibility pipeline
//! (classification → evidence retrieval → natural-language explanation) over
//! an HTTP API.
//!
//! The interesting part is the [`bridge`]: it lazily wires up to three
//! independently shipped pipeline stages (classifier required, retriever and
//! explainer optional), normalizes their heterogeneous call surfaces and
//! output shapes into one response contract, and degrades to
//! classification-only when optional stages are unavailable. Stages are
//! discovered by the [`stages`] loader from an ordered list of vendor roots
//! and authenticated via the [`credentials`] resolver.

pub mod bridge;
pub mod credentials;
pub mod server;
pub mod stages;

pub use bridge::{AnalysisResult, BridgeError, Evidence, PipelineBridge};
pub use stages::{Stage, StageError, StageLoader};

/// Crate version, reported in startup logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
