//! Subprocess stage adapter.
//!
//! Runs the vendor program once per invocation with the request envelope on
//! stdin and the response envelope on stdout. The child's working directory
//! is the vendor root the stage was loaded from, so the vendor's own
//! relative-path assumptions (model files, lexicons) resolve without touching
//! this process's working directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::adapter::{invocation_request, unwrap_envelope, Stage};
use super::def::StageInner;
use super::error::StageError;

/// Stage invoked by spawning a vendor program per call.
pub struct CommandStage {
    program: PathBuf,
    args: Vec<String>,
    entry_points: Vec<String>,
    source_root: PathBuf,
}

impl CommandStage {
    /// Build a `CommandStage` from a parsed definition and the vendor root it
    /// was found in. A relative `program` is rebased against that root.
    pub fn from_def(def: &StageInner, source_root: &Path) -> Result<Self, StageError> {
        let program = def.program.as_ref().ok_or_else(|| {
            StageError::Definition("command stage needs 'program'".to_string())
        })?;
        let mut program = PathBuf::from(program);
        if program.is_relative() {
            program = source_root.join(program);
        }
        Ok(Self {
            program,
            args: def.args.clone(),
            entry_points: def.entry_points.clone(),
            source_root: source_root.to_path_buf(),
        })
    }
}

#[async_trait]
impl Stage for CommandStage {
    fn entry_points(&self) -> &[String] {
        &self.entry_points
    }

    async fn invoke(&self, entry: &str, args: Vec<Value>) -> Result<Value, StageError> {
        let request = invocation_request(entry, &args);
        let payload = serde_json::to_vec(&request)
            .map_err(|e| StageError::Invoke(format!("could not encode request: {e}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.source_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await?;
            // dropping stdin closes the pipe and lets the child finish
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StageError::Invoke(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        let body: Value = serde_json::from_slice(&output.stdout).map_err(|e| {
            StageError::Invoke(format!(
                "{} emitted invalid JSON: {e}",
                self.program.display()
            ))
        })?;
        unwrap_envelope(body)
    }
}
