use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors raised while partitioning, scaling, training or predicting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("test_size must be in (0, 1), got {test_size}")]
    InvalidTestSize { test_size: f64 },
    #[error("features have {features} rows but target has {target}")]
    LengthMismatch { features: usize, target: usize },
    #[error("split of {n_samples} rows with test_size {test_size} leaves an empty partition")]
    EmptyPartition { n_samples: usize, test_size: f64 },
    #[error("dataset has zero samples")]
    EmptyDataset,
    #[error("row {row} has {got} features, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        got: usize,
    },
    #[error("non-finite value at row {row}, feature {feature}")]
    NonFiniteValue { row: usize, feature: usize },
    #[error("feature {feature} is constant, cannot standardize it")]
    DegenerateFeature { feature: usize },
    #[error("label {label} at row {row} is not a binary class (0 or 1)")]
    InvalidLabel { row: usize, label: f64 },
    #[error("n_trees must be at least 1, got {n_trees}")]
    InvalidTreeCount { n_trees: usize },
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth { max_depth: usize },
    #[error("holdout target contains a single class, AUC is undefined")]
    SingleClass,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("column {column:?} does not exist in the table")]
    MissingColumn { column: String },
    #[error("table has {found} columns but {expected} column names were given")]
    ColumnCountMismatch { expected: usize, found: usize },
    #[error("column {column:?} has non-numeric type {dtype}")]
    InvalidSchema { column: String, dtype: String },
    #[error("column {column:?} has a missing value at row {row}")]
    MissingValue { column: String, row: usize },
    #[error("model expects features {expected:?}, table has {found:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("invalid credentials: {reason}")]
    Credential { reason: String },
    #[error("duplicate prediction key {key}")]
    DuplicateKey { key: String },
    #[error("invalid prediction record at row {row}: {reason}")]
    InvalidRecord { row: usize, reason: String },
    #[error("invalid configuration: {reason}")]
    Config { reason: String },
    #[error("incompatible model format in {path:?}: expected {expected}, found {found}")]
    IncompatibleModel {
        path: PathBuf,
        expected: u32,
        found: u32,
    },
    #[error("object {key:?} not found in bucket {bucket:?}")]
    ObjectNotFound { bucket: String, key: String },
    #[error(transparent)]
    Fitting(#[from] FitError),
    #[error(transparent)]
    Polars(#[from] PolarsError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
