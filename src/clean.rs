//! Range validation and mode imputation for the raw heart-disease table.

use log::{debug, error, info, warn};
use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::records::{bounds_for, Bounds, COLUMN_NAMES};

/// Read any numeric column as `f64`, keeping nulls.
pub(crate) fn column_as_f64(series: &Series) -> Result<Vec<Option<f64>>> {
    let cast = series.cast(&DataType::Float64)?;
    let values = cast.f64()?.into_iter().collect();
    Ok(values)
}

/// Most frequent non-missing value. Ties go to the smallest value.
pub fn mode(values: &[Option<f64>]) -> Option<f64> {
    let mut sorted: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .filter(|v| !v.is_nan())
        .collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut best: Option<(f64, usize)> = None;
    let mut start = 0;
    while start < sorted.len() {
        let value = sorted[start];
        let mut end = start;
        while end < sorted.len() && sorted[end] == value {
            end += 1;
        }
        let count = end - start;
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((value, count));
        }
        start = end;
    }
    best.map(|(value, _)| value)
}

fn replace_column(df: &mut DataFrame, original: &Series, values: Vec<Option<f64>>) -> Result<()> {
    let replacement = Series::new(original.name(), values).cast(original.dtype())?;
    df.with_column(replacement)?;
    Ok(())
}

/// Replace every value of `column` outside `bounds` with the column mode.
///
/// Returns how many cells were replaced. When the column is absent the table
/// is left untouched and `PipelineError::MissingColumn` is returned.
pub fn impute_invalid_values(df: &mut DataFrame, column: &str, bounds: Bounds) -> Result<usize> {
    let series = df
        .column(column)
        .map_err(|_| PipelineError::MissingColumn {
            column: column.to_string(),
        })?
        .clone();
    let mut values = column_as_f64(&series)?;

    let mode_val = match mode(&values) {
        Some(m) => m,
        None => return Ok(0),
    };

    let mut replaced = 0;
    for value in values.iter_mut() {
        if let Some(v) = value {
            if *v > bounds.upper || *v < bounds.lower {
                *value = Some(mode_val);
                replaced += 1;
            }
        }
    }

    if replaced > 0 {
        replace_column(df, &series, values)?;
    }
    debug!(
        "Replaced {} invalid values in column '{}' with mode {}",
        replaced, column, mode_val
    );
    Ok(replaced)
}

/// Fail unless every column is an integer or floating point type.
pub fn check_column_types(df: &DataFrame) -> Result<()> {
    for series in df.get_columns() {
        if !series.dtype().is_numeric() {
            warn!("The datatype of column '{}' is invalid", series.name());
            return Err(PipelineError::InvalidSchema {
                column: series.name().to_string(),
                dtype: series.dtype().to_string(),
            });
        }
    }
    info!("The datatypes of all columns in the dataset are valid");
    Ok(())
}

/// Fill nulls and NaNs in each column with that column's mode.
pub fn fill_missing_values(df: &mut DataFrame) -> Result<usize> {
    let columns: Vec<Series> = df.get_columns().to_vec();
    let mut filled = 0;

    for series in &columns {
        let mut values: Vec<Option<f64>> = column_as_f64(series)?
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect();
        if values.iter().all(Option::is_some) {
            continue;
        }
        let mode_val = match mode(&values) {
            Some(m) => m,
            None => {
                warn!("Column '{}' has no values to impute from", series.name());
                continue;
            }
        };
        for value in values.iter_mut().filter(|v| v.is_none()) {
            *value = Some(mode_val);
            filled += 1;
        }
        replace_column(df, series, values)?;
    }

    info!("Missing values in the data have been imputed ({} cells)", filled);
    Ok(filled)
}

/// Rename, type-check, fill and range-impute a raw table.
///
/// A bounded column missing from the table is logged and skipped, so the
/// result may still hold out-of-range values for it.
pub fn clean_data(mut df: DataFrame, col_names: &[String]) -> Result<DataFrame> {
    if df.width() != col_names.len() {
        error!("Mismatch in the size of dataframe columns and configured column names");
        return Err(PipelineError::ColumnCountMismatch {
            expected: col_names.len(),
            found: df.width(),
        });
    }
    df.set_column_names(col_names)?;

    check_column_types(&df)?;
    fill_missing_values(&mut df)?;

    for column in COLUMN_NAMES {
        let Some(bounds) = bounds_for(column) else {
            continue;
        };
        match impute_invalid_values(&mut df, column, bounds) {
            Ok(_) => {}
            Err(PipelineError::MissingColumn { .. }) => {
                warn!("Column '{}' does not exist", column);
            }
            Err(e) => {
                warn!(
                    "The invalid values in the column '{}' could not be replaced: {}",
                    column, e
                );
            }
        }
    }

    info!("Data is clean and ready to use");
    Ok(df)
}
