//! Stage definition types — the YAML schema vendor roots ship for each stage.
//!
//! A `StageDef` is pure data: it names the adapter kind, the public callable
//! surface the stage exposes, and how to reach the implementation. The
//! [`super::loader::StageLoader`] resolves a definition into a live
//! [`super::Stage`] through its adapter registry.
//!
//! # Example YAML
//!
//! ```yaml
//! stage:
//!   kind: http
//!   entry_points: ["classify_article", "predict"]
//!   endpoint: "http://127.0.0.1:9601/invoke"
//! ```

use serde::{Deserialize, Serialize};

/// A complete stage definition loaded from YAML.
///
/// The top-level `stage:` key wraps the inner definition so YAML files are
/// self-describing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDef {
    pub stage: StageInner,
}

impl StageDef {
    /// Parse a `StageDef` from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Parse a `StageDef` from a YAML file on disk.
    pub fn from_yaml_file(path: &std::path::Path) -> Result<Self, super::error::StageError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&content)?)
    }
}

/// The inner stage definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageInner {
    /// Adapter kind (`"http"`, `"command"`, or a custom registered kind).
    pub kind: String,

    /// Public callable names this stage exposes. Bridge-side dispatch probes
    /// these against its per-stage priority lists.
    #[serde(default)]
    pub entry_points: Vec<String>,

    // --- http kind ---
    /// Invocation endpoint URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Environment variable holding the endpoint URL. Takes precedence over
    /// `endpoint` when set and non-empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_env: Option<String>,

    // --- command kind ---
    /// Program to run. Relative paths are rebased against the vendor root the
    /// definition was loaded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    /// Extra arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_http_def() {
        let yaml = r#"
stage:
  kind: http
  entry_points: ["classify_article", "predict"]
  endpoint: "http://127.0.0.1:9601/invoke"
"#;
        let def = StageDef::from_yaml(yaml).unwrap();
        assert_eq!(def.stage.kind, "http");
        assert_eq!(def.stage.entry_points, vec!["classify_article", "predict"]);
        assert_eq!(
            def.stage.endpoint.as_deref(),
            Some("http://127.0.0.1:9601/invoke")
        );
        assert!(def.stage.program.is_none());
    }

    #[test]
    fn test_parse_command_def_with_defaults() {
        let yaml = r#"
stage:
  kind: command
  program: "serve.py"
"#;
        let def = StageDef::from_yaml(yaml).unwrap();
        assert_eq!(def.stage.kind, "command");
        assert!(def.stage.entry_points.is_empty());
        assert!(def.stage.args.is_empty());
        assert_eq!(def.stage.program.as_deref(), Some("serve.py"));
    }

    #[test]
    fn test_parse_invalid_yaml() {
        assert!(StageDef::from_yaml("stage: [not, a, mapping").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = StageDef::from_yaml_file(std::path::Path::new("/nonexistent/stage.yaml"));
        assert!(err.is_err());
    }
}
