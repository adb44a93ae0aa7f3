//! HTTP-backed stage adapter.
//!
//! The stage implementation runs in its own process (typically the vendor's
//! model server) and is reached through a single invocation endpoint. The
//! endpoint comes from the definition directly or, when `endpoint_env` names
//! a set and non-empty environment variable, from the environment.

use async_trait::async_trait;
use serde_json::Value;

use super::adapter::{invocation_request, unwrap_envelope, Stage};
use super::def::StageInner;
use super::error::StageError;

/// Stage invoked by POSTing invocation envelopes to an HTTP endpoint.
pub struct HttpStage {
    client: reqwest::Client,
    endpoint: String,
    entry_points: Vec<String>,
}

impl HttpStage {
    /// Build an `HttpStage` from a parsed definition.
    pub fn from_def(def: &StageInner) -> Result<Self, StageError> {
        let from_env = def
            .endpoint_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|url| !url.trim().is_empty());
        let endpoint = from_env.or_else(|| def.endpoint.clone()).ok_or_else(|| {
            StageError::Definition(
                "http stage needs 'endpoint' or a set 'endpoint_env'".to_string(),
            )
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            entry_points: def.entry_points.clone(),
        })
    }

    /// The resolved invocation endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Stage for HttpStage {
    fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    async fn invoke(&self, entry: &str, args: Vec<Value>) -> Result<Value, StageError> {
        let request = invocation_request(entry, &args);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;
        // The body is the envelope regardless of status; vendors report
        // failures inside it.
        let body: Value = response.json().await?;
        unwrap_envelope(body)
    }
}
