//! Prediction store keyed by the seven categorical inputs.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use log::{debug, info, warn};
use polars::prelude::*;

use crate::clean::column_as_f64;
use crate::error::{PipelineError, Result};
use crate::records::{
    PredictionKey, PredictionRecord, KEY_COLUMNS, LABEL_COLUMN, PROBABILITY_COLUMN,
};

/// Table of prediction records with a composite primary key.
pub trait PredictionStore {
    /// Create the table if it does not exist yet.
    fn create_schema(&mut self) -> Result<()>;

    /// Insert all records or none. Any key already stored, or repeated
    /// within `records`, fails the whole batch with `DuplicateKey`.
    fn bulk_insert(&mut self, records: &[PredictionRecord]) -> Result<usize>;

    /// Remove every record, returning how many were removed.
    fn delete_all(&mut self) -> Result<usize>;

    fn lookup(&self, key: &PredictionKey) -> Result<Option<PredictionRecord>>;

    /// Up to `limit` records in insertion order.
    fn list(&self, limit: usize) -> Result<Vec<PredictionRecord>>;
}

const STORE_HEADER: [&str; 9] = [
    "age",
    "sex",
    "chest_pain",
    "fasting_blood_sugar",
    "electrocardiographic",
    "induced_angina",
    "thal",
    "y_prob",
    "y_bin",
];

/// A prediction table kept in a single CSV file.
#[derive(Debug, Clone)]
pub struct CsvPredictionStore {
    path: PathBuf,
}

impl CsvPredictionStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        CsvPredictionStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<PredictionRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)?;
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: PredictionRecord = result?;
            records.push(record);
        }
        Ok(records)
    }

    fn write_header_only(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut wtr = WriterBuilder::new()
            .has_headers(false)
            .from_path(&self.path)?;
        wtr.write_record(STORE_HEADER)?;
        wtr.flush()?;
        Ok(())
    }
}

impl PredictionStore for CsvPredictionStore {
    fn create_schema(&mut self) -> Result<()> {
        if self.path.exists() {
            debug!("Prediction table {} already exists", self.path.display());
            return Ok(());
        }
        self.write_header_only()?;
        info!("Prediction table created at {}", self.path.display());
        Ok(())
    }

    fn bulk_insert(&mut self, records: &[PredictionRecord]) -> Result<usize> {
        let stored: HashSet<PredictionKey> = self.read_all()?.iter().map(|r| r.key()).collect();
        check_unique_keys(stored, records)?;

        self.create_schema()?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
        for record in records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        info!("{} prediction records added to {}", records.len(), self.path.display());
        Ok(records.len())
    }

    fn delete_all(&mut self) -> Result<usize> {
        let removed = self.read_all()?.len();
        if self.path.exists() {
            self.write_header_only()?;
        }
        info!("Prediction table truncated, {} records removed", removed);
        Ok(removed)
    }

    fn lookup(&self, key: &PredictionKey) -> Result<Option<PredictionRecord>> {
        Ok(self.read_all()?.into_iter().find(|r| r.key() == *key))
    }

    fn list(&self, limit: usize) -> Result<Vec<PredictionRecord>> {
        let mut records = self.read_all()?;
        records.truncate(limit);
        Ok(records)
    }
}

/// `DuplicateKey` for the first record whose key is in `seen` or repeats
/// an earlier record.
fn check_unique_keys(
    mut seen: HashSet<PredictionKey>,
    records: &[PredictionRecord],
) -> Result<()> {
    for record in records {
        if !seen.insert(record.key()) {
            return Err(PipelineError::DuplicateKey {
                key: record.key().to_string(),
            });
        }
    }
    Ok(())
}

fn require_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name).map_err(|_| PipelineError::MissingColumn {
        column: name.to_string(),
    })
}

fn key_field(value: Option<f64>, column: &str, row: usize) -> Result<u32> {
    match value {
        Some(v) if v.fract() == 0.0 && (0.0..=u32::MAX as f64).contains(&v) => Ok(v as u32),
        other => Err(PipelineError::InvalidRecord {
            row,
            reason: format!("{} must be a non-negative integer, got {:?}", column, other),
        }),
    }
}

/// Convert a scored table into prediction records.
///
/// Needs the seven key columns plus `y_prob` and `y_bin`; other columns are
/// ignored.
pub fn records_from_table(df: &DataFrame) -> Result<Vec<PredictionRecord>> {
    let mut keys = Vec::with_capacity(KEY_COLUMNS.len());
    for column in KEY_COLUMNS {
        keys.push(column_as_f64(require_column(df, column)?)?);
    }
    let probs = column_as_f64(require_column(df, PROBABILITY_COLUMN)?)?;
    let labels = column_as_f64(require_column(df, LABEL_COLUMN)?)?;

    let mut records = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let mut k = [0u32; 7];
        for (slot, (column, values)) in k.iter_mut().zip(KEY_COLUMNS.iter().zip(&keys)) {
            *slot = key_field(values[row], column, row)?;
        }
        let y_prob = match probs[row] {
            Some(p) if p.is_finite() => format!("{:?}", p),
            other => {
                return Err(PipelineError::InvalidRecord {
                    row,
                    reason: format!("y_prob must be a finite number, got {:?}", other),
                })
            }
        };
        let y_bin = match labels[row] {
            Some(v) if v == 0.0 => 0,
            Some(v) if v == 1.0 => 1,
            other => {
                return Err(PipelineError::InvalidRecord {
                    row,
                    reason: format!("y_bin must be 0 or 1, got {:?}", other),
                })
            }
        };
        records.push(PredictionRecord {
            age: k[0],
            sex: k[1],
            chest_pain: k[2],
            fasting_blood_sugar: k[3],
            electrocardiographic: k[4],
            induced_angina: k[5],
            thal: k[6],
            y_prob,
            y_bin,
        });
    }
    Ok(records)
}

/// Store a scored table, optionally wiping earlier predictions first.
pub fn persist_predictions<S: PredictionStore + ?Sized>(
    store: &mut S,
    df: &DataFrame,
    truncate: bool,
) -> Result<usize> {
    let records = records_from_table(df)?;
    if truncate {
        check_unique_keys(HashSet::new(), &records)?;
        info!("Attempting to truncate the prediction table");
        store.delete_all()?;
    }
    store.create_schema()?;
    match store.bulk_insert(&records) {
        Ok(n) => Ok(n),
        Err(e) => {
            if matches!(e, PipelineError::DuplicateKey { .. }) && !truncate {
                warn!("Existing predictions collide with the new batch, rerun with --truncate");
            }
            Err(e)
        }
    }
}
