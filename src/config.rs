//! Classifier configuration. Loaded once per process from JSON.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdsConfig {
    /// Root for persisted artifacts (`models/`) and the audit log (`logs/`)
    pub data_dir: PathBuf,
    /// Name of the label column in training data
    pub label_column: String,
    /// Model fitting parameters
    pub training: TrainingConfig,
    /// Detection session parameters
    pub detection: DetectionConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    /// Width of each hidden dense layer
    pub hidden_layers: Vec<usize>,
    /// Dropout rate after each hidden layer (missing entries mean 0.0)
    pub dropout: Vec<f32>,
    /// Epochs without validation-loss improvement before stopping
    pub patience: usize,
    /// Share of rows held out for validation and evaluation (0.0–1.0)
    pub test_size: f64,
    /// Seed for the split, weight init, shuffling and dropout
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Worker threads for batch detection (1 = sequential)
    pub workers: usize,
    /// Refuse input files lacking any trained categorical column
    pub strict_columns: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for IdsConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .map(|d| d.join("retro-ids"))
                .unwrap_or_else(|| PathBuf::from(".retro-ids")),
            label_column: "label".to_string(),
            training: TrainingConfig::default(),
            detection: DetectionConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 128,
            learning_rate: 0.001,
            hidden_layers: vec![128, 64],
            dropout: vec![0.3, 0.2],
            patience: 6,
            test_size: 0.3,
            seed: 42,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            strict_columns: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl IdsConfig {
    /// Load from JSON file if present; otherwise return default. An
    /// unreadable or malformed file is logged and replaced by the default.
    pub fn load(path: &Path) -> Self {
        Self::try_load(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "config ignored, using defaults");
            Self::default()
        })
    }

    /// As [`IdsConfig::load`], but a file that exists and cannot be read or
    /// parsed is an error.
    pub fn try_load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Configuration rooted at `data_dir`, everything else default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join("models")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.data_dir.join("logs").join("ids_logs.csv")
    }
}
