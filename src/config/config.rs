use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const ENV_STORE_URI: &str = "GESTURE_STORE_URI";
pub const ENV_STORE_DB: &str = "GESTURE_STORE_DB";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GestureConfig {
    pub model_path: PathBuf,
    pub min_detection_confidence: f32,
}

impl GestureConfig {
    pub fn new() -> Self {
        GestureConfig {
            model_path: PathBuf::from("./models/gesture_model.json"),
            min_detection_confidence: 0.5,
        }
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExpressionConfig {
    /// No trained expression model ships by default; the threshold table is used.
    pub model_path: Option<PathBuf>,
    pub min_detection_confidence: f32,
}

impl ExpressionConfig {
    pub fn new() -> Self {
        ExpressionConfig {
            model_path: None,
            min_detection_confidence: 0.5,
        }
    }
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub uri: String,
    pub database: String,
    pub connect_timeout_ms: u64,
    pub op_timeout_ms: u64,
    pub enabled: bool,
}

impl StoreConfig {
    pub fn new() -> Self {
        StoreConfig {
            uri: "http://localhost:50051".to_string(),
            database: "gesture_ai".to_string(),
            connect_timeout_ms: 5000,
            op_timeout_ms: 2000,
            enabled: true,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub gesture: GestureConfig,
    pub expression: ExpressionConfig,
    pub store: StoreConfig,
    pub log_filter: String,
}

impl PipelineConfig {
    pub fn new() -> Self {
        PipelineConfig {
            gesture: GestureConfig::new(),
            expression: ExpressionConfig::new(),
            store: StoreConfig::new(),
            log_filter: "info".to_string(),
        }
    }

    /// load reads the pipeline configuration from a JSON file.
    ///
    /// A missing file yields the defaults, a file that exists but cannot be
    /// parsed is an error. Fields absent from the file keep their defaults.
    ///
    /// # Arguments
    /// * `path` - location of the JSON configuration
    ///
    /// # Returns
    /// * `Result<PipelineConfig, Error>`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "configuration file not found, using defaults");
            return Ok(Self::new());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse configuration {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// apply_env overrides the store location from `GESTURE_STORE_URI` and
    /// `GESTURE_STORE_DB` when they are set and non-empty.
    pub fn apply_env(mut self) -> Self {
        self.apply_overrides(
            std::env::var(ENV_STORE_URI).ok(),
            std::env::var(ENV_STORE_DB).ok(),
        );
        self
    }

    fn apply_overrides(&mut self, uri: Option<String>, database: Option<String>) {
        if let Some(uri) = uri.filter(|v| !v.trim().is_empty()) {
            self.store.uri = uri;
        }
        if let Some(database) = database.filter(|v| !v.trim().is_empty()) {
            self.store.database = database;
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}
