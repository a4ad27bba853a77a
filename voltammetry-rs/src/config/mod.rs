//! Configuration types for the voltammetry pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Offset of the Ag/AgCl reference against RHE at pH 0, in volts.
pub const RHE_BASE_OFFSET_V: f64 = 0.197;

/// Nernstian slope applied per pH unit, in volts.
pub const RHE_SLOPE_V_PER_PH: f64 = 0.059;

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{name} must be strictly positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Working electrode and measurement parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectrodeConfig {
    /// Disk electrode diameter in millimetres
    #[serde(default = "default_diameter_mm")]
    pub diameter_mm: f64,

    /// Potential scan rate in mV/s
    #[serde(default = "default_scan_rate_mv_s")]
    pub scan_rate_mv_s: f64,

    /// Electrolyte pH used for the RHE conversion
    #[serde(default = "default_ph")]
    pub ph: f64,
}

fn default_diameter_mm() -> f64 {
    7.0
}

fn default_scan_rate_mv_s() -> f64 {
    10.0
}

fn default_ph() -> f64 {
    6.5
}

impl Default for ElectrodeConfig {
    fn default() -> Self {
        Self {
            diameter_mm: default_diameter_mm(),
            scan_rate_mv_s: default_scan_rate_mv_s(),
            ph: default_ph(),
        }
    }
}

/// CSV loading options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Retry a non UTF-8 file once as Latin-1
    #[serde(default = "default_true")]
    pub encoding_fallback: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            encoding_fallback: true,
        }
    }
}

/// Which part of each cycle ends up in the charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSelection {
    /// Only the initial downward sweep, up to the first turning point.
    #[default]
    Cathodic,
    /// The whole recorded cycle.
    Full,
}

impl ScanSelection {
    /// Segment used in output file names.
    pub fn file_tag(self) -> &'static str {
        match self {
            ScanSelection::Cathodic => "cathodic",
            ScanSelection::Full => "full",
        }
    }

    /// Wording used in chart titles.
    pub fn title(self) -> &'static str {
        match self {
            ScanSelection::Cathodic => "Cathodic Scans",
            ScanSelection::Full => "Full Scans",
        }
    }
}

/// Savitzky-Golay smoothing parameters for the current columns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    #[serde(default = "default_window_length")]
    pub window_length: usize,

    #[serde(default = "default_polyorder")]
    pub polyorder: usize,
}

fn default_window_length() -> usize {
    5
}

fn default_polyorder() -> usize {
    2
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window_length: default_window_length(),
            polyorder: default_polyorder(),
        }
    }
}

/// Per-file processing options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default)]
    pub scan: ScanSelection,

    /// Smooth raw currents before conversion (disabled when absent)
    #[serde(default)]
    pub smoothing: Option<SmoothingConfig>,

    /// Abort the whole batch on the first failing file
    #[serde(default)]
    pub fail_fast: bool,

    /// Also write the plotted curves as CSV next to the images
    #[serde(default)]
    pub export_csv: bool,
}

/// Chart rendering options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    /// PNG width in pixels
    #[serde(default = "default_width")]
    pub width: u32,

    /// PNG height in pixels
    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_svg_width")]
    pub svg_width: u32,

    #[serde(default = "default_svg_height")]
    pub svg_height: u32,

    /// Stroke width of each cycle curve
    #[serde(default = "default_line_width")]
    pub line_width: u32,

    /// Draw title, axis text and legend (needs system fonts)
    #[serde(default = "default_true")]
    pub labels: bool,
}

// 6.4 x 4.8 in at 300 dpi
fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1440
}

fn default_svg_width() -> u32 {
    640
}

fn default_svg_height() -> u32 {
    480
}

fn default_line_width() -> u32 {
    2
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            svg_width: default_svg_width(),
            svg_height: default_svg_height(),
            line_width: default_line_width(),
            labels: true,
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory scanned for `.csv` exports
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// Output subdirectory created inside `input_dir`
    #[serde(default = "default_output_folder")]
    pub output_folder: String,

    #[serde(default)]
    pub electrode: ElectrodeConfig,

    #[serde(default)]
    pub loader: LoaderConfig,

    #[serde(default)]
    pub processing: ProcessingConfig,

    #[serde(default)]
    pub plot: PlotConfig,
}

fn default_input_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_output_folder() -> String {
    "Voltammograms plotted".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_folder: default_output_folder(),
            electrode: ElectrodeConfig::default(),
            loader: LoaderConfig::default(),
            processing: ProcessingConfig::default(),
            plot: PlotConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directory the charts are written to.
    pub fn output_dir(&self) -> PathBuf {
        self.input_dir.join(&self.output_folder)
    }

    /// Derive the physical constants used by every cycle.
    pub fn constants(&self) -> Result<Constants> {
        Constants::from_electrode(&self.electrode)
    }
}

/// Physical constants shared by every experiment in a run.
///
/// Built once from [`ElectrodeConfig`] and then only read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constants {
    area_m2: f64,
    scan_rate_v_s: f64,
    ph: f64,
    rhe_offset_v: f64,
}

impl Constants {
    /// Build constants from SI values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonPositive`] when the area or scan rate is not
    /// strictly positive. The pH is taken as-is.
    pub fn new(area_m2: f64, scan_rate_v_s: f64, ph: f64) -> Result<Self> {
        // Written as negations so NaN is rejected as well
        if !(area_m2 > 0.0) {
            return Err(ConfigError::NonPositive {
                name: "electrode area",
                value: area_m2,
            });
        }
        if !(scan_rate_v_s > 0.0) {
            return Err(ConfigError::NonPositive {
                name: "scan rate",
                value: scan_rate_v_s,
            });
        }

        Ok(Self {
            area_m2,
            scan_rate_v_s,
            ph,
            rhe_offset_v: rhe_offset(ph),
        })
    }

    /// Build constants from a disk diameter in mm and a scan rate in mV/s.
    pub fn from_electrode(electrode: &ElectrodeConfig) -> Result<Self> {
        if !(electrode.diameter_mm > 0.0) {
            return Err(ConfigError::NonPositive {
                name: "electrode diameter",
                value: electrode.diameter_mm,
            });
        }
        Self::new(
            disk_area_m2(electrode.diameter_mm),
            electrode.scan_rate_mv_s / 1000.0,
            electrode.ph,
        )
    }

    #[inline]
    pub fn area_m2(&self) -> f64 {
        self.area_m2
    }

    #[inline]
    pub fn scan_rate_v_s(&self) -> f64 {
        self.scan_rate_v_s
    }

    #[inline]
    pub fn ph(&self) -> f64 {
        self.ph
    }

    /// Volts added to an Ag/AgCl potential to express it against RHE.
    #[inline]
    pub fn rhe_offset_v(&self) -> f64 {
        self.rhe_offset_v
    }
}

/// Area of a disk electrode in m², given its diameter in mm.
pub fn disk_area_m2(diameter_mm: f64) -> f64 {
    let radius_m = (diameter_mm / 1000.0) / 2.0;
    std::f64::consts::PI * radius_m * radius_m
}

/// RHE conversion offset for a given pH.
pub fn rhe_offset(ph: f64) -> f64 {
    RHE_BASE_OFFSET_V + RHE_SLOPE_V_PER_PH * ph
}
