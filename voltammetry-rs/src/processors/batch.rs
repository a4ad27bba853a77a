//! Directory-level batch processing: load, convert, plot, repeat.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use log::{error, info, warn};
use thiserror::Error;

use crate::config::{PipelineConfig, ScanSelection};
use crate::core::loaders::load_experiment;
use crate::core::writers::{ensure_dir, write_curves_csv};
use crate::visualization::{self, cycle_color, ChartKind, Quantity, Series, VoltageReference};

use super::cycles::{CycleProcessor, DerivedCurve, ProcessedCycle};
use super::smoothing::SavitzkyGolay;

/// Errors that can occur while setting up a batch run.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("No CSV files found in {folder}")]
    NoFilesFound { folder: PathBuf },
}

/// Outcome of one successfully processed file.
#[derive(Debug, Clone)]
pub struct FileReport {
    /// Input CSV path.
    pub path: PathBuf,
    /// Number of voltage/current pairs in the file.
    pub num_cycles: usize,
    /// Number of cycles drawn on each chart.
    pub plotted: usize,
    /// Every file written for this input.
    pub outputs: Vec<PathBuf>,
}

/// Result of a batch run over a directory.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub processed: Vec<FileReport>,
    /// Files that failed, with the rendered error chain.
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchSummary {
    /// Total number of files written across all inputs.
    pub fn outputs_written(&self) -> usize {
        self.processed.iter().map(|r| r.outputs.len()).sum()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// List the `.csv` files directly inside `dir`, sorted by path.
pub fn find_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(BatchError::DirectoryNotFound(dir.to_path_buf()).into());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}

/// Build the cycle processor described by the config.
pub fn build_processor(config: &PipelineConfig) -> Result<CycleProcessor> {
    let constants = config.constants().context("Invalid electrode configuration")?;
    let processor = CycleProcessor::new(constants);

    match &config.processing.smoothing {
        Some(smoothing) => {
            let filter =
                SavitzkyGolay::from_config(smoothing).context("Invalid smoothing configuration")?;
            Ok(processor.with_smoothing(filter))
        }
        None => Ok(processor),
    }
}

/// Curve of a cycle for the given scan selection, if it is drawn at all.
fn selected_curve(cycle: &ProcessedCycle, selection: ScanSelection) -> Option<&DerivedCurve> {
    match selection {
        ScanSelection::Cathodic => cycle.cathodic.as_ref(),
        ScanSelection::Full => Some(&cycle.curve),
    }
}

fn axis_data<'a>(curve: &'a DerivedCurve, kind: &ChartKind) -> (&'a [f64], &'a [f64]) {
    let x = match kind.reference {
        VoltageReference::AgAgCl => &curve.voltage_ref,
        VoltageReference::Rhe => &curve.voltage_rhe,
    };
    let y = match kind.quantity {
        Quantity::CurrentDensity => &curve.current_density,
        Quantity::Capacitance => &curve.capacitance,
    };
    (x.as_slice(), y.as_slice())
}

/// Process one CSV file and write its charts into `output_dir`.
///
/// # Returns
///
/// A [`FileReport`] listing every file written.
pub fn process_file(
    path: &Path,
    processor: &CycleProcessor,
    config: &PipelineConfig,
    output_dir: &Path,
) -> Result<FileReport> {
    let experiment = load_experiment(path, &config.loader)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    let basename = experiment
        .name()
        .unwrap_or_else(|| "voltammogram".to_string());
    let selection = config.processing.scan;
    let num_cycles = experiment.num_cycles();

    let cycles: Vec<ProcessedCycle> = processor.for_experiment(&experiment).collect();

    let drawn: Vec<(&ProcessedCycle, &DerivedCurve)> = cycles
        .iter()
        .filter_map(|c| selected_curve(c, selection).map(|curve| (c, curve)))
        .collect();

    if drawn.is_empty() {
        warn!(
            "{}: no cycle has a cathodic turning point, charts will be empty",
            path.display()
        );
    }

    ensure_dir(output_dir)?;
    let mut outputs = Vec::with_capacity(9);

    for kind in ChartKind::all(selection) {
        let series: Vec<Series<'_>> = drawn
            .iter()
            .map(|(cycle, curve)| {
                let (x, y) = axis_data(curve, &kind);
                Series {
                    label: cycle.label(),
                    color: cycle_color(cycle.index, num_cycles),
                    x,
                    y,
                }
            })
            .collect();

        let stem = output_dir.join(kind.file_stem(&basename));
        let written =
            visualization::render_chart(&stem, &kind.title(&basename), &kind, &series, &config.plot)
                .with_context(|| format!("Failed to render {}", stem.display()))?;
        outputs.extend(written);
    }

    if config.processing.export_csv {
        let csv_path = output_dir.join(format!("{}_{}_cycles.csv", basename, selection.file_tag()));
        let rows: Vec<(usize, &DerivedCurve)> =
            drawn.iter().map(|(cycle, curve)| (cycle.index, *curve)).collect();
        write_curves_csv(&csv_path, &rows)?;
        outputs.push(csv_path);
    }

    info!(
        "{}: {} cycle(s), {} plotted, {} file(s) written",
        path.display(),
        num_cycles,
        drawn.len(),
        outputs.len()
    );

    Ok(FileReport {
        path: path.to_path_buf(),
        num_cycles,
        plotted: drawn.len(),
        outputs,
    })
}

/// Process every CSV file in `config.input_dir`, one after another.
///
/// Failures are isolated per file unless `processing.fail_fast` is set, in
/// which case the first failure aborts the run.
pub fn process_directory(config: &PipelineConfig, progress: &ProgressBar) -> Result<BatchSummary> {
    let files = find_csv_files(&config.input_dir)?;
    if files.is_empty() {
        return Err(BatchError::NoFilesFound {
            folder: config.input_dir.clone(),
        }
        .into());
    }

    let processor = build_processor(config)?;
    let output_dir = config.output_dir();
    ensure_dir(&output_dir)?;

    progress.set_length(files.len() as u64);

    let mut summary = BatchSummary::default();

    for path in files {
        let name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        progress.set_message(name);

        match process_file(&path, &processor, config, &output_dir) {
            Ok(report) => summary.processed.push(report),
            Err(e) if config.processing.fail_fast => {
                progress.abandon();
                return Err(e);
            }
            Err(e) => {
                error!("{}: {:#}", path.display(), e);
                summary.failed.push((path, format!("{:#}", e)));
            }
        }

        progress.inc(1);
    }

    progress.finish_and_clear();

    Ok(summary)
}
