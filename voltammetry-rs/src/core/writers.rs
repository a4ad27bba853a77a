//! Output directory handling and CSV export of derived curves.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use crate::processors::cycles::DerivedCurve;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create the output directory.
    #[error("failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Header of the exported curve table.
pub const CURVE_CSV_HEADER: [&str; 6] = [
    "cycle",
    "index",
    "voltage_ref",
    "voltage_rhe",
    "current_density",
    "capacitance",
];

/// Creates a directory and its parents if they don't exist.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| WriteError::CreateDirectory {
            path: dir.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => ensure_dir(parent),
        None => Ok(()),
    }
}

/// Write derived curves to a long-format CSV.
///
/// One row per sample with the columns in [`CURVE_CSV_HEADER`]. The `cycle`
/// column is 1-based, matching the chart legends.
///
/// # Arguments
///
/// * `path` - Output file path (parent directories will be created if needed)
/// * `curves` - Zero-based cycle index and curve for every cycle to export
pub fn write_curves_csv(path: &Path, curves: &[(usize, &DerivedCurve)]) -> Result<()> {
    ensure_parent_dirs(path)?;

    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut csv_writer = csv::Writer::from_writer(BufWriter::new(file));

    let path_str = path.display().to_string();
    let csv_err = |e: csv::Error| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    csv_writer.write_record(CURVE_CSV_HEADER).map_err(csv_err)?;

    for &(cycle, curve) in curves {
        for k in 0..curve.len() {
            csv_writer
                .write_record(&[
                    (cycle + 1).to_string(),
                    k.to_string(),
                    curve.voltage_ref[k].to_string(),
                    curve.voltage_rhe[k].to_string(),
                    curve.current_density[k].to_string(),
                    curve.capacitance[k].to_string(),
                ])
                .map_err(csv_err)?;
        }
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    })?;

    Ok(())
}
