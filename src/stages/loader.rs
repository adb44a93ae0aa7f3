//! Stage loader — resolves vendor-shipped stage definitions into live stages.
//!
//! Vendor roots are searched in a fixed priority order; the first root whose
//! `root/rel_path` exists and resolves wins. A failure at one root (bad YAML,
//! unusable definition) is recorded and the next root is tried, so a broken
//! primary vendor drop never shadows a working fallback. When every root is
//! exhausted the attempts are aggregated into one diagnostic error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::adapter::Stage;
use super::command::CommandStage;
use super::def::StageDef;
use super::error::StageError;
use super::http::HttpStage;

/// Constructs a stage from its definition and the vendor root it came from.
pub type AdapterFactory =
    Box<dyn Fn(&StageDef, &Path) -> Result<Box<dyn Stage>, StageError> + Send + Sync>;

/// Registry mapping definition kinds to adapter factories.
///
/// `http` and `command` are pre-registered; callers may add their own kinds
/// (embedded or test stages) before loading.
pub struct AdapterRegistry {
    factories: HashMap<String, AdapterFactory>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("http", Box::new(|def, _root| {
            Ok(Box::new(HttpStage::from_def(&def.stage)?) as Box<dyn Stage>)
        }));
        registry.register("command", Box::new(|def, root| {
            Ok(Box::new(CommandStage::from_def(&def.stage, root)?) as Box<dyn Stage>)
        }));
        registry
    }

    /// Register (or replace) a factory for a kind.
    pub fn register(&mut self, kind: &str, factory: AdapterFactory) {
        self.factories.insert(kind.to_string(), factory);
    }

    fn construct(&self, def: &StageDef, root: &Path) -> Result<Box<dyn Stage>, StageError> {
        let factory = self
            .factories
            .get(&def.stage.kind)
            .ok_or_else(|| StageError::UnknownKind(def.stage.kind.clone()))?;
        factory(def, root)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A resolved stage together with where it came from.
pub struct LoadedStage {
    /// Stable logical identifier (`predictor` | `retriever` | `explainer`).
    pub logical_name: String,
    /// The vendor root the definition was loaded from.
    pub source_root: PathBuf,
    /// The live stage.
    pub stage: Arc<dyn Stage>,
}

impl std::fmt::Debug for LoadedStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedStage")
            .field("logical_name", &self.logical_name)
            .field("source_root", &self.source_root)
            .finish_non_exhaustive()
    }
}

/// Loads stage definitions from an ordered list of vendor roots.
pub struct StageLoader {
    vendor_roots: Vec<PathBuf>,
    registry: AdapterRegistry,
}

impl StageLoader {
    /// Create a loader with the default vendor roots under `base_dir`
    /// (`vendor/fnd` preferred, `vendor/fnp` as fallback — both package
    /// layouts are in the wild).
    pub fn new(base_dir: &Path) -> Self {
        Self::with_roots(vec![
            base_dir.join("vendor").join("fnd"),
            base_dir.join("vendor").join("fnp"),
        ])
    }

    /// Create a loader with explicit vendor roots.
    pub fn with_roots(vendor_roots: Vec<PathBuf>) -> Self {
        Self {
            vendor_roots,
            registry: AdapterRegistry::new(),
        }
    }

    /// Mutable access to the adapter registry, for registering extra kinds.
    pub fn registry_mut(&mut self) -> &mut AdapterRegistry {
        &mut self.registry
    }

    /// Load the stage named `logical_name` from `rel_path` under the first
    /// vendor root that has it.
    pub fn load(&self, logical_name: &str, rel_path: &str) -> Result<LoadedStage, StageError> {
        let mut last_err: Option<StageError> = None;

        for root in &self.vendor_roots {
            let file = root.join(rel_path);
            if !file.exists() {
                continue;
            }
            match self.load_from(root, &file) {
                Ok(stage) => {
                    tracing::debug!(
                        stage = logical_name,
                        root = %root.display(),
                        "stage loaded"
                    );
                    return Ok(LoadedStage {
                        logical_name: logical_name.to_string(),
                        source_root: root.clone(),
                        stage: Arc::from(stage),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        stage = logical_name,
                        root = %root.display(),
                        error = %e,
                        "stage failed to load from this root, trying next"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(StageError::LoadFailed {
            logical_name: logical_name.to_string(),
            attempted: self.vendor_roots.clone(),
            last: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("no vendor root contains {rel_path}")),
        })
    }

    fn load_from(&self, root: &Path, file: &Path) -> Result<Box<dyn Stage>, StageError> {
        let def = StageDef::from_yaml_file(file)?;
        self.registry.construct(&def, root)
    }
}
