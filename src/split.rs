use log::info;
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::clean::column_as_f64;
use crate::error::{FitError, PipelineError, Result};

/// Train and holdout halves of a feature matrix and its labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Partitions {
    pub x_train: Vec<Vec<f64>>,
    pub x_test: Vec<Vec<f64>>,
    pub y_train: Vec<usize>,
    pub y_test: Vec<usize>,
}

fn require_columns(df: &DataFrame, columns: &[&str]) -> Result<()> {
    let present = df.get_column_names();
    for column in columns {
        if !present.contains(column) {
            log::warn!("Column '{}' referenced for modeling does not exist", column);
            return Err(PipelineError::MissingColumn {
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

/// Project the feature columns (in the given order) and the target column.
pub fn split_features_target(
    df: &DataFrame,
    target_column: &str,
    feature_columns: &[String],
) -> Result<(DataFrame, Series)> {
    let mut wanted: Vec<&str> = feature_columns.iter().map(String::as_str).collect();
    wanted.push(target_column);
    require_columns(df, &wanted)?;

    let features = df.select(feature_columns)?;
    let target = df.column(target_column)?.clone();
    Ok((features, target))
}

/// Row-major `f64` matrix of a fully numeric, null-free table.
pub fn to_matrix(df: &DataFrame) -> Result<Vec<Vec<f64>>> {
    let mut rows = vec![Vec::with_capacity(df.width()); df.height()];
    for series in df.get_columns() {
        for (i, value) in column_as_f64(series)?.into_iter().enumerate() {
            let v = value.ok_or_else(|| PipelineError::MissingValue {
                column: series.name().to_string(),
                row: i,
            })?;
            rows[i].push(v);
        }
    }
    Ok(rows)
}

/// Binary class labels of a target column.
pub fn to_labels(target: &Series) -> Result<Vec<usize>> {
    column_as_f64(target)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            None => Err(PipelineError::MissingValue {
                column: target.name().to_string(),
                row,
            }),
            Some(v) if v == 0.0 => Ok(0),
            Some(v) if v == 1.0 => Ok(1),
            Some(label) => Err(FitError::InvalidLabel { row, label }.into()),
        })
        .collect()
}

/// Shuffle rows with a seeded RNG and hold out `ceil(test_size * n)` of them.
pub fn train_test_split(
    features: &[Vec<f64>],
    target: &[usize],
    test_size: f64,
    seed: u64,
) -> std::result::Result<Partitions, FitError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(FitError::InvalidTestSize { test_size });
    }
    if features.len() != target.len() {
        return Err(FitError::LengthMismatch {
            features: features.len(),
            target: target.len(),
        });
    }
    let n_samples = features.len();
    let n_test = (test_size * n_samples as f64).ceil() as usize;
    if n_test == 0 || n_test >= n_samples {
        return Err(FitError::EmptyPartition {
            n_samples,
            test_size,
        });
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let (test_idx, train_idx) = indices.split_at(n_test);

    let take_rows =
        |idx: &[usize]| -> Vec<Vec<f64>> { idx.iter().map(|&i| features[i].clone()).collect() };
    let take_labels = |idx: &[usize]| -> Vec<usize> { idx.iter().map(|&i| target[i]).collect() };

    info!(
        "Split {} rows into {} train and {} test rows",
        n_samples,
        train_idx.len(),
        test_idx.len()
    );
    Ok(Partitions {
        x_train: take_rows(train_idx),
        x_test: take_rows(test_idx),
        y_train: take_labels(train_idx),
        y_test: take_labels(test_idx),
    })
}
