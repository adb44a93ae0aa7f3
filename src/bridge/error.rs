//! Pipeline bridge errors.
//!
//! Only mandatory-path failures appear here: credential problems, a
//! predictor that cannot be loaded, or a predictor without a recognized
//! callable. Retriever and explainer failures never become errors — the
//! bridge converts them to absent evidence / absent explanation.

use thiserror::Error;

use crate::credentials::CredentialError;
use crate::stages::StageError;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Credential discovery or validation failed.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// The predictor failed to load or to run.
    #[error(transparent)]
    Stage(#[from] StageError),

    /// The predictor loaded but exposes none of the known classify entry
    /// points.
    #[error("predictor has no classify_article/classify/predict")]
    ClassifierInterfaceMissing,
}
