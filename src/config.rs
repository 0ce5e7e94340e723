use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::records::{COLUMN_NAMES, KEY_COLUMNS};

pub const DEFAULT_SEED: u64 = 1408;

/// Every knob of the pipeline, loaded once and handed to each stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub clean_data: CleanConfig,
    pub build_models: ModelConfig,
    pub upload: TransferConfig,
    pub download: TransferConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanConfig {
    pub col_names: Vec<String>,
}

impl Default for CleanConfig {
    fn default() -> Self {
        CleanConfig {
            col_names: COLUMN_NAMES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub target_column: String,
    pub columns_for_modeling: Vec<String>,
    pub test_size: f64,
    pub n_estimators: usize,
    pub max_depth: usize,
    /// Shared by the train/test split and the forest.
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            target_column: "diagnosis".to_string(),
            columns_for_modeling: KEY_COLUMNS.iter().map(|c| c.to_string()).collect(),
            test_size: 0.3,
            n_estimators: 10,
            max_depth: 3,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub bucket: String,
    /// Directory that holds the buckets.
    pub root: PathBuf,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// File to upload; ignored by download.
    pub local_path: PathBuf,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            bucket: "heart-data".to_string(),
            root: PathBuf::from("data/buckets"),
            access_key_id: None,
            secret_access_key: None,
            local_path: PathBuf::from("data/external/heart.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Row cap for listings.
    pub max_rows_show: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("data/pd_predictions.csv"),
            max_rows_show: 10,
        }
    }
}

impl PipelineConfig {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        info!("Configuration file loaded from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.clean_data.col_names.is_empty() {
            return Err(config_error("clean_data.col_names is empty"));
        }
        let model = &self.build_models;
        if model.target_column.is_empty() {
            return Err(config_error("build_models.target_column is empty"));
        }
        if model.columns_for_modeling.is_empty() {
            return Err(config_error("build_models.columns_for_modeling is empty"));
        }
        if model.columns_for_modeling.contains(&model.target_column) {
            return Err(config_error(
                "build_models.target_column is also listed as a feature",
            ));
        }
        // Range checks for test_size, n_estimators and max_depth live with the
        // partitioner and the forest, which report them as fitting errors.
        Ok(())
    }
}

fn config_error(reason: &str) -> PipelineError {
    PipelineError::Config {
        reason: reason.to_string(),
    }
}
