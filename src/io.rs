use std::fs::{self, File};
use std::path::Path;

use log::info;
use polars::prelude::*;
use polars_io::parquet::{ParquetReader, ParquetWriter};

use crate::error::Result;

/// Cell text read as missing in CSV input, besides empty fields.
pub const NULL_TOKENS: [&str; 3] = ["NA", "NaN", "null"];

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TableFormat {
    Csv,
    Parquet,
}

impl TableFormat {
    /// Parquet for `.parquet`/`.pq`, CSV otherwise.
    pub fn from_path(path: &Path) -> TableFormat {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("parquet") | Some("pq") => TableFormat::Parquet,
            _ => TableFormat::Csv,
        }
    }
}

pub async fn read_table<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
    let path = path.as_ref();
    let file = File::open(path)?;

    let df = match TableFormat::from_path(path) {
        TableFormat::Parquet => ParquetReader::new(file).finish()?,
        TableFormat::Csv => CsvReader::new(file)
            .has_header(true)
            .with_null_values(Some(NullValues::AllColumns(
                NULL_TOKENS.iter().map(|t| t.to_string()).collect(),
            )))
            .finish()?,
    };
    info!(
        "Input data loaded from {} ({} rows, {} columns)",
        path.display(),
        df.height(),
        df.width()
    );
    Ok(df)
}

pub async fn write_table<P: AsRef<Path>>(path: P, df: &mut DataFrame) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;

    match TableFormat::from_path(path) {
        TableFormat::Parquet => {
            ParquetWriter::new(&mut file).finish(df)?;
        }
        TableFormat::Csv => CsvWriter::new(&mut file).finish(df)?,
    }
    info!("Output saved to {}", path.display());
    Ok(())
}
