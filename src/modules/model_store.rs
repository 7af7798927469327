use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use tracing::{error, info, warn};
use crate::modules::forest::ClassifierModel;
use crate::modules::vocabulary::Modality;

/// Where the model handed to a session came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOrigin {
    Trained { path: PathBuf },
    Untrained { reason: FallbackReason },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    NotConfigured,
    Missing,
    Unreadable(String),
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub model: ClassifierModel,
    pub origin: ModelOrigin,
}

impl LoadedModel {
    pub fn untrained(modality: Modality, reason: FallbackReason) -> Self {
        LoadedModel {
            model: ClassifierModel::untrained(modality),
            origin: ModelOrigin::Untrained { reason },
        }
    }

    pub fn is_trained(&self) -> bool {
        matches!(self.origin, ModelOrigin::Trained { .. }) && self.model.is_trained()
    }
}

/// Loads and persists classifier bundles. Loading never fails: anything that
/// prevents using the artifact yields the untrained placeholder instead.
pub struct ModelStore;

impl ModelStore {
    /// load reads the bundle at `path` for `modality`.
    ///
    /// # Arguments
    /// * `path` - Option<&Path>; `None` means no artifact is configured
    /// * `modality` - Modality the artifact must have been trained for
    ///
    /// # Returns
    /// * `LoadedModel`
    pub fn load(path: Option<&Path>, modality: Modality) -> LoadedModel {
        let path = match path {
            None => {
                info!(%modality, "no model configured, using untrained default");
                return LoadedModel::untrained(modality, FallbackReason::NotConfigured)
            }
            Some(path) => path,
        };

        if !path.exists() {
            warn!(%modality, path = %path.display(), "model not found, using untrained default");
            return LoadedModel::untrained(modality, FallbackReason::Missing)
        }

        let model = match Self::read(path) {
            Ok(model) => model,
            Err(e) => {
                error!(%modality, path = %path.display(), error = %e, "failed to load model");
                return LoadedModel::untrained(modality, FallbackReason::Unreadable(e.to_string()))
            }
        };

        if let Err(e) = model.validate(modality) {
            error!(%modality, path = %path.display(), error = %e, "model artifact is invalid");
            return LoadedModel::untrained(modality, FallbackReason::Invalid(format!("{:#}", e)))
        }

        info!(%modality, path = %path.display(), trees = model.forest.trees.len(), "loaded model");
        LoadedModel {
            model,
            origin: ModelOrigin::Trained { path: path.to_path_buf() },
        }
    }

    fn read(path: &Path) -> Result<ClassifierModel, Error> {
        let content = fs::read_to_string(path)?;
        let model = serde_json::from_str(&content)?;
        Ok(model)
    }

    /// save writes a trained bundle to `path`, creating parent directories.
    /// Untrained placeholders are refused.
    pub fn save(path: &Path, model: &ClassifierModel) -> Result<(), Error> {
        model
            .validate(model.modality)
            .context("refusing to persist a model that would not load")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(model)?;
        fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
        info!(modality = %model.modality, path = %path.display(), "saved model");
        Ok(())
    }
}
