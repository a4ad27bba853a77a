//! Core data types and I/O operations.

pub mod loaders;
pub mod writers;

pub use loaders::{load_experiment, Cycle, Experiment, LoaderError};
pub use writers::{ensure_dir, write_curves_csv, WriteError};
