//! The stage capability trait and the invocation wire contract shared by all
//! adapters.
//!
//! A stage is invoked with `{"fn": <entry>, "args": [...]}` and answers with
//! either `{"ok": <value>}` or `{"error": {"kind": ..., "message": ...}}`.
//! The `bad_arity` error kind is the out-of-process equivalent of a
//! wrong-argument-count failure; callers react to it by retrying with a
//! shorter argument list.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::error::StageError;

/// Error kind a stage reports when the entry point rejects the argument list.
pub const BAD_ARITY_KIND: &str = "bad_arity";

/// A loaded pipeline stage with a duck-typed callable surface.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Public callable names this stage exposes.
    fn entry_points(&self) -> &[String];

    /// Invoke one of the entry points with positional JSON arguments.
    async fn invoke(&self, entry: &str, args: Vec<Value>) -> Result<Value, StageError>;
}

/// Build the invocation request envelope.
pub fn invocation_request(entry: &str, args: &[Value]) -> Value {
    json!({ "fn": entry, "args": args })
}

/// Unwrap a stage response envelope into its payload.
pub fn unwrap_envelope(value: Value) -> Result<Value, StageError> {
    let Value::Object(mut map) = value else {
        return Err(StageError::Invoke(
            "stage response is not an envelope object".to_string(),
        ));
    };
    if let Some(ok) = map.remove("ok") {
        return Ok(ok);
    }
    match map.remove("error") {
        Some(err) => {
            let kind = err.get("kind").and_then(Value::as_str).unwrap_or("");
            if kind == BAD_ARITY_KIND {
                return Err(StageError::BadArity);
            }
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unspecified stage error");
            Err(StageError::Invoke(format!("{kind}: {message}")))
        }
        None => Err(StageError::Invoke(
            "stage response carries neither 'ok' nor 'error'".to_string(),
        )),
    }
}

/// Pick the first of `preferred` that the stage actually exposes.
///
/// This is the name-priority dispatch decision; it is made once when a stage
/// is bound into the pipeline, never per call.
pub fn first_entry(available: &[String], preferred: &[&str]) -> Option<String> {
    preferred
        .iter()
        .find(|name| available.iter().any(|a| a == *name))
        .map(|name| name.to_string())
}
