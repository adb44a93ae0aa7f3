//! Normalized pipeline result types and per-stage dispatch tables.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classifier entry points, probed in this priority order.
pub const CLASSIFY_ENTRY_POINTS: &[&str] = &["classify_article", "classify", "predict"];
/// Retriever entry points, probed in this priority order.
pub const RETRIEVE_ENTRY_POINTS: &[&str] =
    &["get_context", "retrieve_evidence", "retrieve_top_k", "search"];
/// Explainer entry points, probed in this priority order.
pub const EXPLAIN_ENTRY_POINTS: &[&str] = &["explain_with_llm", "explain", "generate_explanation"];

/// Evidence snippets are clipped to this many characters.
pub const SNIPPET_MAX_CHARS: usize = 300;
/// Synthesized explanations carry at most this much raw explainer text.
pub const EXPLANATION_MAX_CHARS: usize = 800;

/// A retrieved supporting snippet with source attribution. Order within an
/// [`AnalysisResult`] is the retriever's rank order; the bridge never
/// re-sorts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub doc_id: String,
    pub chunk_id: u64,
    pub snippet: String,
}

/// The normalized outcome of one analysis. Built fresh per request, never
/// persisted.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub label: String,
    /// Confidence in `[0, 1]` (positive/real-class probability when the
    /// classifier reports one).
    pub score: f64,
    pub evidence: Vec<Evidence>,
    /// Structured explanation, when the explainer stage produced one.
    pub explanation: Option<Value>,
    /// Unmodified classifier output, passed through for caller-side
    /// debugging.
    pub raw_classifier: Value,
}

/// What `/debug/fnd` reports: which stages loaded, the callable surface each
/// exposes, and where each was loaded from.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub predictor_loaded: bool,
    pub retriever_loaded: bool,
    pub explainer_loaded: bool,
    pub predictor_funcs: Vec<String>,
    pub retriever_funcs: Vec<String>,
    pub explainer_funcs: Vec<String>,
    pub sources: StageSources,
}

/// Vendor roots the stages were loaded from (`None` for absent stages).
#[derive(Debug, Clone, Serialize)]
pub struct StageSources {
    pub predictor: Option<String>,
    pub retriever: Option<String>,
    pub explainer: Option<String>,
}
