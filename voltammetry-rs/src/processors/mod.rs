//! Data processing modules.

pub mod batch;
pub mod cycles;
pub mod smoothing;

// Re-export key types for convenience
pub use batch::{
    build_processor, find_csv_files, process_directory, process_file, BatchError, BatchSummary,
    FileReport,
};
pub use cycles::{
    find_cathodic_end, trim_to_cathodic, CycleCurves, CycleProcessor, DerivedCurve,
    ProcessedCycle,
};
pub use smoothing::{savgol, SavitzkyGolay, SmoothingError};
