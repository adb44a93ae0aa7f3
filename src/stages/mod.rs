//! Pluggable pipeline stages.
//!
//! Each pipeline step (classifier, retriever, explainer) ships as an
//! independently versioned vendor drop described by a small YAML definition.
//! This module owns:
//!
//! - [`def`] — the YAML schema ([`StageDef`])
//! - [`adapter`] — the [`Stage`] trait and the invocation wire contract
//! - [`http`] / [`command`] — the built-in adapter kinds
//! - [`loader`] — vendor-root search with first-hit-wins fallback
//! - [`error`] — [`StageError`]

pub mod adapter;
pub mod command;
pub mod def;
pub mod error;
pub mod http;
pub mod loader;

pub use adapter::{first_entry, Stage};
pub use command::CommandStage;
pub use def::{StageDef, StageInner};
pub use error::StageError;
pub use http::HttpStage;
pub use loader::{AdapterFactory, AdapterRegistry, LoadedStage, StageLoader};
