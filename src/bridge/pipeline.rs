//! The pipeline bridge — lazy, exactly-once stage wiring plus output
//! normalization.
//!
//! Initialization order: credential, then predictor (both mandatory, failures
//! propagate), then retriever and explainer (optional, failures are logged
//! and recorded as absence). The `tokio::sync::OnceCell` guard makes the
//! whole sequence run once: concurrent first callers block on the same
//! initializer, and a failed attempt leaves the cell empty so the next
//! request retries.
//!
//! Entry-point names are resolved against each stage's callable surface once
//! here, at bind time; `analyze` never re-probes.

use std::path::PathBuf;

use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::credentials::CredentialResolver;
use crate::stages::{first_entry, LoadedStage, StageError, StageLoader};

use super::error::BridgeError;
use super::types::{
    AnalysisResult, DiagnosticReport, Evidence, StageSources, CLASSIFY_ENTRY_POINTS,
    EXPLAIN_ENTRY_POINTS, EXPLANATION_MAX_CHARS, RETRIEVE_ENTRY_POINTS, SNIPPET_MAX_CHARS,
};

/// Relative definition paths within a vendor root.
const PREDICTOR_PATH: &str = "app/predictor.yaml";
const RETRIEVER_PATH: &str = "app/retriever.yaml";
const EXPLAINER_PATH: &str = "app/explainer.yaml";

/// A bound stage: the loaded unit plus the entry point picked for it (if any
/// of the known names matched).
struct StageSlot {
    loaded: LoadedStage,
    entry: Option<String>,
}

impl StageSlot {
    fn bind(loaded: LoadedStage, preferred: &[&str]) -> Self {
        let entry = first_entry(loaded.stage.entry_points(), preferred);
        Self { loaded, entry }
    }

    fn funcs(&self) -> Vec<String> {
        self.loaded.stage.entry_points().to_vec()
    }

    fn source(&self) -> String {
        self.loaded.source_root.display().to_string()
    }
}

/// Everything `ensure_initialized` produces; shared read-only by all requests
/// afterwards.
struct PipelineState {
    predictor: StageSlot,
    retriever: Option<StageSlot>,
    explainer: Option<StageSlot>,
}

/// The process-wide pipeline singleton.
pub struct PipelineBridge {
    resolver: CredentialResolver,
    loader: StageLoader,
    state: OnceCell<PipelineState>,
}

impl PipelineBridge {
    /// Bridge rooted at the application base directory (vendor roots and the
    /// default credential location live under it).
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self::with_parts(
            CredentialResolver::new(&base_dir),
            StageLoader::new(&base_dir),
        )
    }

    /// Bridge from explicit collaborators.
    pub fn with_parts(resolver: CredentialResolver, loader: StageLoader) -> Self {
        Self {
            resolver,
            loader,
            state: OnceCell::new(),
        }
    }

    async fn ensure_initialized(&self) -> Result<&PipelineState, BridgeError> {
        self.state.get_or_try_init(|| self.init()).await
    }

    async fn init(&self) -> Result<PipelineState, BridgeError> {
        let credential = self.resolver.resolve().await?;
        tracing::info!(project = %credential.project_id, "pipeline credential in place");

        let predictor = self.loader.load("predictor", PREDICTOR_PATH)?;
        let predictor = StageSlot::bind(predictor, CLASSIFY_ENTRY_POINTS);

        let retriever = self.load_optional("retriever", RETRIEVER_PATH, RETRIEVE_ENTRY_POINTS);
        let explainer = self.load_optional("explainer", EXPLAINER_PATH, EXPLAIN_ENTRY_POINTS);

        Ok(PipelineState {
            predictor,
            retriever,
            explainer,
        })
    }

    fn load_optional(&self, name: &str, rel_path: &str, preferred: &[&str]) -> Option<StageSlot> {
        match self.loader.load(name, rel_path) {
            Ok(loaded) => Some(StageSlot::bind(loaded, preferred)),
            Err(e) => {
                tracing::warn!(
                    stage = name,
                    error = %e,
                    "optional stage unavailable, pipeline degrades without it"
                );
                None
            }
        }
    }

    /// Report which stages loaded, their callable surfaces, and their source
    /// roots. Triggers lazy initialization; otherwise a pure read.
    pub async fn introspect(&self) -> Result<DiagnosticReport, BridgeError> {
        let state = self.ensure_initialized().await?;
        Ok(DiagnosticReport {
            predictor_loaded: true,
            retriever_loaded: state.retriever.is_some(),
            explainer_loaded: state.explainer.is_some(),
            predictor_funcs: state.predictor.funcs(),
            retriever_funcs: state.retriever.as_ref().map(StageSlot::funcs).unwrap_or_default(),
            explainer_funcs: state.explainer.as_ref().map(StageSlot::funcs).unwrap_or_default(),
            sources: StageSources {
                predictor: Some(state.predictor.source()),
                retriever: state.retriever.as_ref().map(StageSlot::source),
                explainer: state.explainer.as_ref().map(StageSlot::source),
            },
        })
    }

    /// Run the full pipeline on one article.
    ///
    /// Classification is mandatory; evidence and explanation are best-effort
    /// and degrade to empty/`None` on any optional-stage trouble.
    pub async fn analyze(
        &self,
        title: &str,
        text: &str,
        k: u32,
    ) -> Result<AnalysisResult, BridgeError> {
        let state = self.ensure_initialized().await?;
        tracing::debug!(title, k, "analyzing article");

        let entry = state
            .predictor
            .entry
            .as_deref()
            .ok_or(BridgeError::ClassifierInterfaceMissing)?;
        let raw_classifier = state
            .predictor
            .loaded
            .stage
            .invoke(entry, vec![json!(text)])
            .await
            .map_err(BridgeError::Stage)?;

        let label = extract_label(&raw_classifier);
        let score = extract_score(&raw_classifier);

        let evidence = match &state.retriever {
            Some(slot) => collect_evidence(slot, text, k).await,
            None => Vec::new(),
        };

        let explanation = match &state.explainer {
            Some(slot) => build_explanation(slot, text, &evidence, &label, score).await,
            None => None,
        };

        Ok(AnalysisResult {
            label,
            score,
            evidence,
            explanation,
            raw_classifier,
        })
    }
}

// ---------------------------------------------------------------------------
// Classifier output normalization
// ---------------------------------------------------------------------------

fn extract_label(raw: &Value) -> String {
    raw.get("label")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string()
}

/// Confidence fallback chain: second element of a `probs`/`probabilities`
/// vector (the positive/real-class probability), else a scalar `score`
/// field, else `0.5`.
fn extract_score(raw: &Value) -> f64 {
    let probs = raw
        .get("probs")
        .or_else(|| raw.get("probabilities"))
        .and_then(Value::as_array);
    if let Some(probs) = probs {
        if probs.len() >= 2 {
            if let Some(p) = probs[1].as_f64() {
                return p;
            }
        }
    }
    raw.get("score").and_then(Value::as_f64).unwrap_or(0.5)
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

async fn collect_evidence(slot: &StageSlot, text: &str, k: u32) -> Vec<Evidence> {
    let Some(entry) = slot.entry.as_deref() else {
        return Vec::new();
    };
    let stage = &slot.loaded.stage;
    let result = match stage.invoke(entry, vec![json!(text), json!(k)]).await {
        // fixed-arity retrievers take the text alone
        Err(StageError::BadArity) => stage.invoke(entry, vec![json!(text)]).await,
        other => other,
    };
    match result {
        Ok(Value::Array(items)) => items.iter().map(evidence_from_value).collect(),
        Ok(_) => Vec::new(),
        Err(e) => {
            tracing::warn!(
                stage = "retriever",
                error = %e,
                "evidence retrieval failed, continuing without evidence"
            );
            Vec::new()
        }
    }
}

fn evidence_from_value(item: &Value) -> Evidence {
    let meta = item.get("meta").and_then(Value::as_object);
    let doc_id = meta
        .and_then(|m| m.get("doc_id").or_else(|| m.get("source")))
        .map(stringify)
        .unwrap_or_default();
    let chunk_id = meta
        .and_then(|m| m.get("chunk_id"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let snippet = item
        .get("text")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| meta.and_then(|m| m.get("snippet")).and_then(Value::as_str))
        .unwrap_or("");
    Evidence {
        doc_id,
        chunk_id,
        snippet: truncate_chars(snippet, SNIPPET_MAX_CHARS),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ---------------------------------------------------------------------------
// Explanation
// ---------------------------------------------------------------------------

async fn build_explanation(
    slot: &StageSlot,
    text: &str,
    evidence: &[Evidence],
    label: &str,
    score: f64,
) -> Option<Value> {
    let entry = slot.entry.as_deref()?;
    let reshaped: Vec<Value> = evidence
        .iter()
        .map(|e| {
            json!({
                "text": e.snippet,
                "meta": { "doc_id": e.doc_id, "chunk_id": e.chunk_id },
            })
        })
        .collect();

    let stage = &slot.loaded.stage;
    let result = match stage
        .invoke(entry, vec![json!(text), Value::Array(reshaped)])
        .await
    {
        Err(StageError::BadArity) => stage.invoke(entry, vec![json!(text)]).await,
        other => other,
    };
    match result {
        Ok(raw) => shape_explanation(raw, label, score),
        Err(e) => {
            tracing::warn!(
                stage = "explainer",
                error = %e,
                "explanation failed, continuing without one"
            );
            None
        }
    }
}

/// Textual explainer output is parsed as JSON when possible; anything that
/// does not parse to an object becomes a synthesized verdict wrapper around
/// the raw text. Structured output passes through untouched.
fn shape_explanation(raw: Value, label: &str, score: f64) -> Option<Value> {
    match raw {
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(parsed @ Value::Object(_)) => Some(parsed),
            _ => Some(json!({
                "verdict": label,
                "confidence": (score * 100.0).round() as i64,
                "explanation": truncate_chars(&s, EXPLANATION_MAX_CHARS),
            })),
        },
        obj @ Value::Object(_) => Some(obj),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testkit::{fixture_builder, handler};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // -- normalization helpers ---------------------------------------------

    #[test]
    fn test_score_prefers_second_prob() {
        let raw = json!({"label": "Fake", "probs": [0.2, 0.8]});
        assert_eq!(extract_score(&raw), 0.8);
    }

    #[test]
    fn test_score_accepts_probabilities_alias() {
        let raw = json!({"label": "Fake", "probabilities": [0.9, 0.1]});
        assert_eq!(extract_score(&raw), 0.1);
    }

    #[test]
    fn test_score_falls_back_to_scalar_field() {
        let raw = json!({"label": "Real", "score": 0.3});
        assert_eq!(extract_score(&raw), 0.3);
    }

    #[test]
    fn test_score_short_probs_fall_through_to_score() {
        let raw = json!({"label": "Real", "probs": [0.9], "score": 0.4});
        assert_eq!(extract_score(&raw), 0.4);
    }

    #[test]
    fn test_score_defaults_to_half() {
        assert_eq!(extract_score(&json!({"label": "X"})), 0.5);
    }

    #[test]
    fn test_label_defaults_to_unknown() {
        assert_eq!(extract_label(&json!({"score": 0.2})), "Unknown");
    }

    #[test]
    fn test_evidence_snippet_truncated_to_300_chars() {
        let long = "x".repeat(500);
        let ev = evidence_from_value(&json!({"text": long, "meta": {"doc_id": "d1"}}));
        assert_eq!(ev.snippet.chars().count(), 300);
        assert_eq!(ev.doc_id, "d1");
    }

    #[test]
    fn test_evidence_doc_id_falls_back_to_source() {
        let ev = evidence_from_value(&json!({
            "text": "snippet",
            "meta": {"source": "reuters.com", "chunk_id": 4}
        }));
        assert_eq!(ev.doc_id, "reuters.com");
        assert_eq!(ev.chunk_id, 4);
    }

    #[test]
    fn test_evidence_snippet_falls_back_to_meta() {
        let ev = evidence_from_value(&json!({"meta": {"snippet": "from meta"}}));
        assert_eq!(ev.snippet, "from meta");
        assert_eq!(ev.doc_id, "");
        assert_eq!(ev.chunk_id, 0);
    }

    #[test]
    fn test_evidence_from_non_object_is_empty() {
        let ev = evidence_from_value(&json!("just a string"));
        assert_eq!(ev.doc_id, "");
        assert_eq!(ev.snippet, "");
    }

    #[test]
    fn test_shape_explanation_synthesizes_from_plain_text() {
        let shaped =
            shape_explanation(json!("This looks credible because..."), "Real", 0.62).unwrap();
        assert_eq!(
            shaped,
            json!({
                "verdict": "Real",
                "confidence": 62,
                "explanation": "This looks credible because...",
            })
        );
    }

    #[test]
    fn test_shape_explanation_parses_json_string() {
        let shaped =
            shape_explanation(json!("{\"verdict\": \"Fake\", \"confidence\": 91}"), "Real", 0.5)
                .unwrap();
        assert_eq!(shaped["verdict"], "Fake");
        assert_eq!(shaped["confidence"], 91);
    }

    #[test]
    fn test_shape_explanation_object_passthrough() {
        let obj = json!({"verdict": "Fake", "why": ["a", "b"]});
        assert_eq!(shape_explanation(obj.clone(), "Real", 0.5).unwrap(), obj);
    }

    #[test]
    fn test_shape_explanation_other_shapes_yield_none() {
        assert!(shape_explanation(json!(42), "Real", 0.5).is_none());
        assert!(shape_explanation(json!([1, 2]), "Real", 0.5).is_none());
        assert!(shape_explanation(Value::Null, "Real", 0.5).is_none());
    }

    // -- full bridge --------------------------------------------------------

    #[tokio::test]
    async fn test_classifier_entry_priority() {
        // the mock echoes back the entry it was invoked with as the label
        let echo = handler(|entry, _args| Ok(json!({"label": entry})));
        let fx = fixture_builder()
            .stage("predictor", &["predict", "classify"], echo)
            .build();
        let result = fx.bridge.analyze("", "some text", 3).await.unwrap();
        assert_eq!(result.label, "classify");
    }

    #[tokio::test]
    async fn test_classifier_with_only_predict() {
        let echo = handler(|entry, _args| Ok(json!({"label": entry})));
        let fx = fixture_builder().stage("predictor", &["predict"], echo).build();
        let result = fx.bridge.analyze("", "some text", 3).await.unwrap();
        assert_eq!(result.label, "predict");
    }

    #[tokio::test]
    async fn test_classifier_interface_missing() {
        let fx = fixture_builder()
            .stage("predictor", &["warm_cache"], handler(|_, _| Ok(json!(null))))
            .build();
        let err = fx.bridge.analyze("", "some text", 3).await.unwrap_err();
        assert!(matches!(err, BridgeError::ClassifierInterfaceMissing));

        // the stage still loaded, so diagnostics keep working
        let report = fx.bridge.introspect().await.unwrap();
        assert!(report.predictor_loaded);
        assert_eq!(report.predictor_funcs, vec!["warm_cache"]);
    }

    #[tokio::test]
    async fn test_raw_classifier_passthrough() {
        let raw = json!({"label": "Fake", "probs": [0.2, 0.8], "model": "v4"});
        let raw_clone = raw.clone();
        let fx = fixture_builder()
            .stage(
                "predictor",
                &["classify_article"],
                handler(move |_, _| Ok(raw_clone.clone())),
            )
            .build();
        let result = fx.bridge.analyze("", "text", 3).await.unwrap();
        assert_eq!(result.raw_classifier, raw);
        assert_eq!(result.label, "Fake");
        assert_eq!(result.score, 0.8);
    }

    #[tokio::test]
    async fn test_retriever_error_degrades_to_empty_evidence() {
        let fx = fixture_builder()
            .stage(
                "predictor",
                &["classify"],
                handler(|_, _| Ok(json!({"label": "Real", "score": 0.7}))),
            )
            .stage(
                "retriever",
                &["get_context"],
                handler(|_, _| Err(StageError::Invoke("index corrupted".to_string()))),
            )
            .build();
        let result = fx.bridge.analyze("", "text", 3).await.unwrap();
        assert_eq!(result.label, "Real");
        assert!(result.evidence.is_empty());
    }

    #[tokio::test]
    async fn test_retriever_bad_arity_retries_without_k() {
        let fx = fixture_builder()
            .stage(
                "predictor",
                &["classify"],
                handler(|_, _| Ok(json!({"label": "Real"}))),
            )
            .stage(
                "retriever",
                &["search"],
                handler(|_, args| {
                    if args.len() == 2 {
                        Err(StageError::BadArity)
                    } else {
                        Ok(json!([{"text": "hit", "meta": {"doc_id": "d9"}}]))
                    }
                }),
            )
            .build();
        let result = fx.bridge.analyze("", "text", 3).await.unwrap();
        assert_eq!(result.evidence.len(), 1);
        assert_eq!(result.evidence[0].doc_id, "d9");
    }

    #[tokio::test]
    async fn test_retriever_non_sequence_means_no_evidence() {
        let fx = fixture_builder()
            .stage(
                "predictor",
                &["classify"],
                handler(|_, _| Ok(json!({"label": "Real"}))),
            )
            .stage(
                "retriever",
                &["get_context"],
                handler(|_, _| Ok(json!({"unexpected": "shape"}))),
            )
            .build();
        let result = fx.bridge.analyze("", "text", 3).await.unwrap();
        assert!(result.evidence.is_empty());
    }

    #[tokio::test]
    async fn test_optional_stages_absent() {
        let fx = fixture_builder()
            .stage(
                "predictor",
                &["classify"],
                handler(|_, _| Ok(json!({"label": "Real", "score": 0.9}))),
            )
            .build();

        let report = fx.bridge.introspect().await.unwrap();
        assert!(report.predictor_loaded);
        assert!(!report.retriever_loaded);
        assert!(!report.explainer_loaded);
        assert!(report.retriever_funcs.is_empty());
        assert!(report.sources.retriever.is_none());

        // repeated analyses never error and never grow evidence
        for _ in 0..2 {
            let result = fx.bridge.analyze("", "text", 3).await.unwrap();
            assert!(result.evidence.is_empty());
            assert!(result.explanation.is_none());
        }
    }

    #[tokio::test]
    async fn test_explainer_receives_reshaped_evidence() {
        let fx = fixture_builder()
            .stage(
                "predictor",
                &["classify"],
                handler(|_, _| Ok(json!({"label": "Fake", "probs": [0.4, 0.6]}))),
            )
            .stage(
                "retriever",
                &["get_context"],
                handler(|_, _| {
                    Ok(json!([{"text": "snippet one", "meta": {"doc_id": "d1", "chunk_id": 2}}]))
                }),
            )
            .stage(
                "explainer",
                &["explain_with_llm"],
                handler(|_, args| Ok(json!({"seen": args.get(1).cloned()}))),
            )
            .build();

        let result = fx.bridge.analyze("", "text", 3).await.unwrap();
        let seen = &result.explanation.unwrap()["seen"];
        assert_eq!(seen[0]["text"], "snippet one");
        assert_eq!(seen[0]["meta"]["doc_id"], "d1");
        assert_eq!(seen[0]["meta"]["chunk_id"], 2);
    }

    #[tokio::test]
    async fn test_explainer_bad_arity_retries_with_text_only() {
        let fx = fixture_builder()
            .stage(
                "predictor",
                &["classify"],
                handler(|_, _| Ok(json!({"label": "Real", "score": 0.62}))),
            )
            .stage(
                "explainer",
                &["explain"],
                handler(|_, args| {
                    if args.len() == 2 {
                        Err(StageError::BadArity)
                    } else {
                        Ok(json!("This looks credible because..."))
                    }
                }),
            )
            .build();
        let result = fx.bridge.analyze("", "text", 3).await.unwrap();
        assert_eq!(
            result.explanation.unwrap(),
            json!({
                "verdict": "Real",
                "confidence": 62,
                "explanation": "This looks credible because...",
            })
        );
    }

    #[tokio::test]
    async fn test_explainer_error_degrades_to_none() {
        let fx = fixture_builder()
            .stage(
                "predictor",
                &["classify"],
                handler(|_, _| Ok(json!({"label": "Real"}))),
            )
            .stage(
                "explainer",
                &["explain"],
                handler(|_, _| Err(StageError::Invoke("llm quota exhausted".to_string()))),
            )
            .build();
        let result = fx.bridge.analyze("", "text", 3).await.unwrap();
        assert!(result.explanation.is_none());
    }

    #[tokio::test]
    async fn test_initialization_runs_once_across_concurrent_calls() {
        let constructions = Arc::new(AtomicUsize::new(0));
        let seen = constructions.clone();
        let fx = fixture_builder()
            .stage(
                "predictor",
                &["classify"],
                handler(|_, _| Ok(json!({"label": "Real"}))),
            )
            .on_construct(move || {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        let (a, b) = tokio::join!(
            fx.bridge.analyze("", "text", 3),
            fx.bridge.analyze("", "text", 3)
        );
        a.unwrap();
        b.unwrap();
        fx.bridge.analyze("", "text", 3).await.unwrap();
        fx.bridge.introspect().await.unwrap();

        assert_eq!(constructions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_initialization_is_retried_next_request() {
        let fx = fixture_builder()
            .stage(
                "predictor",
                &["classify"],
                handler(|_, _| Ok(json!({"label": "Real"}))),
            )
            .without_credential()
            .build();

        let err = fx.bridge.analyze("", "text", 3).await.unwrap_err();
        assert!(err.to_string().contains("not found"));

        // drop a key in place; the next request initializes successfully
        fx.write_credential();
        let result = fx.bridge.analyze("", "text", 3).await.unwrap();
        assert_eq!(result.label, "Real");
    }
}
