//! Heart-disease risk pipeline: clean the raw table, train a random forest,
//! score new rows and store the predictions.
//!
//! Stages are plain functions over polars `DataFrame`s; the binary in
//! `main.rs` wires them to the command line.

pub mod clean;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod forest;
pub mod importance;
pub mod io;
pub mod model;
pub mod records;
pub mod scale;
pub mod score;
pub mod split;
pub mod storage;
pub mod transfer;
mod tree;

pub use clean::{clean_data, impute_invalid_values};
pub use config::PipelineConfig;
pub use error::{FitError, PipelineError, Result};
pub use evaluate::{evaluate, predict, Metrics, Predictions};
pub use forest::{RandomForest, RandomForestConfig};
pub use importance::{feature_importances, importance_table, FeatureImportance};
pub use io::{read_table, write_table};
pub use model::{build_models, BuildOutput, TrainedModel};
pub use records::{PredictionKey, PredictionRecord};
pub use scale::StandardScaler;
pub use score::score_data;
pub use split::{split_features_target, train_test_split, Partitions};
pub use storage::{persist_predictions, CsvPredictionStore, PredictionStore};
pub use transfer::{Credentials, LocalBucket, ObjectStore};
