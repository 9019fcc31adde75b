//! Serializable pipeline configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file is a valid configuration.

use leakfree_core::features::FeatureSet;
use leakfree_core::merge::{ProcessOptions, RunMode};
use leakfree_core::validate::ValidationConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which derived columns to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSetKind {
    Basic,
    #[default]
    FeatureEngineered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    pub feature_set: FeatureSetKind,
    pub include_rsi: bool,
    pub mode: RunMode,
    pub overwrite: bool,
    pub refit_scaler: bool,
    /// Worker threads for per-instrument processing. 0 = rayon default.
    pub threads: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            feature_set: FeatureSetKind::FeatureEngineered,
            include_rsi: true,
            mode: RunMode::Incremental,
            overwrite: false,
            refit_scaler: false,
            threads: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Raw input CSV (`Date, Ticker, Open, High, Low, Close, [Adj Close], Volume`).
    pub raw: PathBuf,
    /// Root of the processed store. Scaler states live beside the partitions.
    pub processed_dir: PathBuf,
    /// Optional ticker universe; when set, only these instruments are processed.
    pub universe: Option<PathBuf>,
    /// Where CSV exports are written.
    pub export_dir: PathBuf,
    /// JSONL run history.
    pub history: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw: PathBuf::from("data/raw/raw_data.csv"),
            processed_dir: PathBuf::from("data/processed"),
            universe: None,
            export_dir: PathBuf::from("data/export"),
            history: PathBuf::from("data/history.jsonl"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub n_folds: usize,
    /// Exact train fraction for the holdout split. Unset: the final split is
    /// the last walk-forward fold.
    pub holdout_fraction: Option<f64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            n_folds: 4,
            holdout_fraction: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub process: ProcessConfig,
    pub paths: PathsConfig,
    pub split: SplitConfig,
    pub validation: ValidationConfig,
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.split.n_folds == 0 {
            return Err(ConfigError::Invalid("split.n_folds must be at least 1".into()));
        }
        if let Some(f) = self.split.holdout_fraction {
            if !(f > 0.0 && f < 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "split.holdout_fraction must be in (0, 1), got {f}"
                )));
            }
        }
        if self.process.refit_scaler
            && !(self.process.mode == RunMode::Fresh && self.process.overwrite)
        {
            return Err(ConfigError::Invalid(
                "process.refit_scaler requires mode = \"fresh\" and overwrite = true".into(),
            ));
        }
        let v = &self.validation;
        if !(0.0..=1.0).contains(&v.imbalance_threshold) {
            return Err(ConfigError::Invalid(format!(
                "validation.imbalance_threshold must be in [0, 1], got {}",
                v.imbalance_threshold
            )));
        }
        if v.derivation_tolerance <= 0.0 {
            return Err(ConfigError::Invalid(
                "validation.derivation_tolerance must be positive".into(),
            ));
        }
        if v.scaled_range_margin < 0.0 {
            return Err(ConfigError::Invalid(
                "validation.scaled_range_margin must be non-negative".into(),
            ));
        }
        Ok(())
    }

    pub fn feature_set(&self) -> FeatureSet {
        match self.process.feature_set {
            FeatureSetKind::Basic => FeatureSet::Basic,
            FeatureSetKind::FeatureEngineered => FeatureSet::FeatureEngineered {
                rsi: self.process.include_rsi,
            },
        }
    }

    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            feature_set: self.feature_set(),
            mode: self.process.mode,
            overwrite: self.process.overwrite,
            refit_scaler: self.process.refit_scaler,
        }
    }

    /// Deterministic hash of the configuration, recorded in the run history.
    pub fn config_hash(&self) -> Result<String, ConfigError> {
        let json = serde_json::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}
