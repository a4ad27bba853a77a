//! Batch plotting of cyclic voltammetry exports.
//!
//! This crate provides tools for:
//! - Loading potentiostat CSV exports made of voltage/current column pairs
//! - Converting each cycle to RHE voltage, current density and capacitance
//! - Locating the end of the cathodic sweep and trimming cycles to it
//! - Rendering per-cycle charts as PNG and SVG
//!
//! # Example
//!
//! ```no_run
//! use voltammetry_pipeline::{core::loaders::load_experiment, CycleProcessor, PipelineConfig};
//!
//! let config = PipelineConfig::default();
//! let experiment = load_experiment("run.csv", &config.loader).unwrap();
//! let processor = CycleProcessor::new(config.constants().unwrap());
//! for cycle in processor.for_experiment(&experiment) {
//!     println!("{}: boundary {:?}", cycle.label(), cycle.curve.cathodic_end);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use crate::config::{Constants, PipelineConfig, PlotConfig, ProcessingConfig, ScanSelection};
pub use crate::core::loaders::{Cycle, Experiment};
pub use crate::processors::cycles::{CycleProcessor, DerivedCurve, ProcessedCycle};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
