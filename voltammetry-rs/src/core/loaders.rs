//! Loader for cyclic voltammetry CSV exports.
//!
//! The expected layout is the one written by the potentiostat software:
//! - Row 1: column names
//! - Row 2: units (discarded)
//! - Remaining rows: numeric samples
//!
//! Columns come in (voltage, current) pairs, one pair per cycle, left to right.
//! Voltages are in V against the measurement reference and currents in µA.

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, warn};
use thiserror::Error;

use crate::config::LoaderConfig;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0} is not valid UTF-8")]
    Encoding(PathBuf),

    #[error("Non-numeric value {value:?} at row {row}, column {column}")]
    Parse {
        row: u64,
        column: usize,
        value: String,
    },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Text encoding a file was decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
}

/// One voltammetry table: voltage/current column pairs, one pair per cycle.
#[derive(Debug, Clone)]
pub struct Experiment {
    /// Column names from the first row.
    pub headers: Vec<String>,
    /// Units from the second row.
    pub units: Vec<String>,
    /// Encoding the source text was decoded with.
    pub encoding: TextEncoding,
    /// Source file path.
    pub source_path: Option<PathBuf>,
    columns: Vec<Vec<f64>>,
}

impl Experiment {
    /// Build an experiment from numeric columns.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::MalformedInput`] if there are fewer than two
    /// columns, an odd number of columns, or columns of unequal length, and
    /// [`LoaderError::EmptyFile`] if the columns hold no rows.
    pub fn from_columns(columns: Vec<Vec<f64>>) -> Result<Self> {
        validate_column_count(columns.len())?;

        let rows = columns[0].len();
        if let Some((idx, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != rows) {
            return Err(LoaderError::MalformedInput(format!(
                "column {} has {} rows, expected {}",
                idx,
                col.len(),
                rows
            )));
        }
        if rows == 0 {
            return Err(LoaderError::EmptyFile(PathBuf::new()));
        }

        Ok(Self {
            headers: Vec::new(),
            units: Vec::new(),
            encoding: TextEncoding::Utf8,
            source_path: None,
            columns,
        })
    }

    /// Number of voltage/current column pairs.
    #[inline]
    pub fn num_cycles(&self) -> usize {
        self.columns.len() / 2
    }

    /// Number of data rows (including any trailing padding).
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.len())
    }

    /// File stem of the source path, used to name outputs.
    pub fn name(&self) -> Option<String> {
        self.source_path
            .as_ref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().to_string())
    }

    /// Returns the cycle at `index`, or `None` if out of range.
    ///
    /// Trailing rows where both voltage and current are empty (NaN) are
    /// padding left by longer cycles in the same file and are cut off.
    pub fn cycle(&self, index: usize) -> Option<Cycle<'_>> {
        (index < self.num_cycles()).then(|| self.pair(index))
    }

    /// Iterate over all cycles in column order.
    pub fn cycles(&self) -> impl ExactSizeIterator<Item = Cycle<'_>> + '_ {
        (0..self.num_cycles()).map(move |i| self.pair(i))
    }

    fn pair(&self, index: usize) -> Cycle<'_> {
        let voltage = &self.columns[2 * index];
        let current = &self.columns[2 * index + 1];

        let len = voltage
            .iter()
            .zip(current)
            .rposition(|(v, i)| !(v.is_nan() && i.is_nan()))
            .map_or(0, |last| last + 1);

        Cycle {
            index,
            voltage: &voltage[..len],
            current: &current[..len],
        }
    }
}

/// One voltage/current column pair, borrowed from its [`Experiment`].
#[derive(Debug, Clone, Copy)]
pub struct Cycle<'a> {
    /// Zero-based cycle index (column pair position).
    pub index: usize,
    /// Voltage samples in V, chronological.
    pub voltage: &'a [f64],
    /// Current samples in µA, aligned with `voltage`.
    pub current: &'a [f64],
}

impl Cycle<'_> {
    #[inline]
    pub fn len(&self) -> usize {
        self.voltage.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.voltage.is_empty()
    }
}

fn validate_column_count(n: usize) -> Result<()> {
    if n < 2 {
        return Err(LoaderError::MalformedInput(format!(
            "expected at least one voltage/current column pair, found {} column(s)",
            n
        )));
    }
    if n % 2 != 0 {
        return Err(LoaderError::MalformedInput(format!(
            "expected voltage/current column pairs, found an odd column count ({})",
            n
        )));
    }
    Ok(())
}

/// Decode raw bytes as UTF-8, optionally falling back to Latin-1 once.
///
/// Latin-1 maps every byte to the code point of the same value, so the
/// fallback itself cannot fail.
pub fn decode_text(bytes: Vec<u8>, path: &Path, fallback: bool) -> Result<(String, TextEncoding)> {
    match String::from_utf8(bytes) {
        Ok(text) => Ok((text, TextEncoding::Utf8)),
        Err(e) if fallback => {
            warn!("{} is not valid UTF-8, reading it as Latin-1", path.display());
            let text = e.into_bytes().iter().map(|&b| char::from(b)).collect();
            Ok((text, TextEncoding::Latin1))
        }
        Err(_) => Err(LoaderError::Encoding(path.to_path_buf())),
    }
}

/// Load a voltammetry export from a CSV file.
///
/// # Arguments
///
/// * `path` - Path to the CSV file
/// * `config` - Loader options (encoding fallback)
///
/// # Returns
///
/// An [`Experiment`] holding every column as `f64`. Empty cells, and cells
/// missing from short rows, become NaN.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded, the column count
/// is not a positive even number, a row is wider than the header, a cell is
/// not numeric, or there are no rows after the units row.
pub fn load_experiment<P: AsRef<Path>>(path: P, config: &LoaderConfig) -> Result<Experiment> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let (text, encoding) = decode_text(bytes, path, config.encoding_fallback)?;

    let mut experiment = parse_experiment(&text).map_err(|e| match e {
        LoaderError::EmptyFile(_) => LoaderError::EmptyFile(path.to_path_buf()),
        other => other,
    })?;
    experiment.encoding = encoding;
    experiment.source_path = Some(path.to_path_buf());

    debug!(
        "Loaded {}: {} cycle(s), {} row(s), {:?}",
        path.display(),
        experiment.num_cycles(),
        experiment.num_rows(),
        encoding
    );

    Ok(experiment)
}

/// Parse already-decoded CSV text into an [`Experiment`].
pub fn parse_experiment(text: &str) -> Result<Experiment> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() {
        return Err(LoaderError::EmptyFile(PathBuf::new()));
    }
    validate_column_count(headers.len())?;

    let mut records = reader.records();

    let units: Vec<String> = match records.next() {
        Some(record) => record?.iter().map(str::to_string).collect(),
        None => return Err(LoaderError::EmptyFile(PathBuf::new())),
    };

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];

    // Header is line 1 and units line 2
    for (offset, result) in records.enumerate() {
        let record = result?;
        let row = record
            .position()
            .map_or(offset as u64 + 3, |p| p.line());
        push_record(&mut columns, &record, row)?;
    }

    if columns[0].is_empty() {
        return Err(LoaderError::EmptyFile(PathBuf::new()));
    }

    Ok(Experiment {
        headers,
        units,
        encoding: TextEncoding::Utf8,
        source_path: None,
        columns,
    })
}

/// Append one data row. Cells missing at the end of a short row read as NaN.
fn push_record(columns: &mut [Vec<f64>], record: &StringRecord, row: u64) -> Result<()> {
    if record.len() > columns.len() {
        return Err(LoaderError::MalformedInput(format!(
            "row {} has {} fields, header has {}",
            row,
            record.len(),
            columns.len()
        )));
    }

    for (column, values) in columns.iter_mut().enumerate() {
        let cell = record.get(column).unwrap_or("");
        values.push(parse_cell(cell, row, column)?);
    }
    Ok(())
}

fn parse_cell(cell: &str, row: u64, column: usize) -> Result<f64> {
    if cell.is_empty() {
        return Ok(f64::NAN);
    }
    cell.parse::<f64>().map_err(|_| LoaderError::Parse {
        row,
        column,
        value: cell.to_string(),
    })
}
