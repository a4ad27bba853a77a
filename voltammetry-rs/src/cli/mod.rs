//! Command-line interface for the voltammetry pipeline.

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::ScanSelection;
use crate::core::loaders;
use crate::processors::batch;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "voltammetry-pipeline")]
#[command(about = "Plot cyclic voltammetry cycles as current density and capacitance", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plot every CSV file in a directory
    Plot(PlotArgs),

    /// Print per-cycle turning points for one CSV file
    Inspect {
        /// CSV file to inspect
        file: PathBuf,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Destination file
        path: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Overrides applied on top of the loaded configuration.
#[derive(Args, Debug, Default)]
struct PlotArgs {
    /// Directory containing CSV exports (defaults to the config value)
    input_dir: Option<PathBuf>,
    /// Name of the output subdirectory
    #[arg(long)]
    output_folder: Option<String>,
    /// Electrolyte pH
    #[arg(long, allow_negative_numbers = true)]
    ph: Option<f64>,
    /// Disk electrode diameter in mm
    #[arg(long)]
    diameter_mm: Option<f64>,
    /// Scan rate in mV/s
    #[arg(long)]
    scan_rate: Option<f64>,
    /// Plot whole cycles instead of the cathodic scan only
    #[arg(long)]
    full: bool,
    /// Stop at the first file that fails
    #[arg(long)]
    fail_fast: bool,
    /// Also export the plotted curves as CSV
    #[arg(long)]
    export_csv: bool,
    /// Skip titles, axis text and legends
    #[arg(long)]
    no_labels: bool,
}

impl PlotArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.input_dir {
            config.input_dir = dir.clone();
        }
        if let Some(folder) = &self.output_folder {
            config.output_folder = folder.clone();
        }
        if let Some(ph) = self.ph {
            config.electrode.ph = ph;
        }
        if let Some(d) = self.diameter_mm {
            config.electrode.diameter_mm = d;
        }
        if let Some(rate) = self.scan_rate {
            config.electrode.scan_rate_mv_s = rate;
        }
        if self.full {
            config.processing.scan = ScanSelection::Full;
        }
        if self.fail_fast {
            config.processing.fail_fast = true;
        }
        if self.export_csv {
            config.processing.export_csv = true;
        }
        if self.no_labels {
            config.plot.labels = false;
        }
    }
}

/// Create a progress bar for the per-file loop
fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                error!("Failed to load config from {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => PipelineConfig::default(),
    };

    let ok = match cli.command {
        Commands::Plot(args) => cmd_plot(config, &args),
        Commands::Inspect { file } => cmd_inspect(&file, &config),
        Commands::InitConfig { path, force } => cmd_init_config(&path, force),
    };

    if !ok {
        std::process::exit(1);
    }
}

fn cmd_plot(mut config: PipelineConfig, args: &PlotArgs) -> bool {
    args.apply(&mut config);

    let start = Instant::now();

    let constants = match config.constants() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return false;
        }
    };

    println!("Plotting voltammograms...");
    println!("Input directory: {}", config.input_dir.display());
    println!("Output directory: {}", config.output_dir().display());
    println!("Scan: {}", config.processing.scan.file_tag());
    println!(
        "Electrode: {} mm disk ({:.4e} m^2), {} mV/s, pH {} (RHE offset {:.4} V)",
        config.electrode.diameter_mm,
        constants.area_m2(),
        config.electrode.scan_rate_mv_s,
        constants.ph(),
        constants.rhe_offset_v()
    );

    let progress = create_progress_bar();

    match batch::process_directory(&config, &progress) {
        Ok(summary) => {
            let plotted: usize = summary.processed.iter().map(|r| r.plotted).sum();

            print_summary(
                "Plotting Complete",
                &[
                    ("Input directory", config.input_dir.display().to_string()),
                    ("Output directory", config.output_dir().display().to_string()),
                    ("Files processed", summary.processed.len().to_string()),
                    ("Files failed", summary.failed.len().to_string()),
                    ("Cycles plotted", plotted.to_string()),
                    ("Files written", summary.outputs_written().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );

            for (path, reason) in &summary.failed {
                eprintln!("FAILED {}: {}", path.display(), reason);
            }

            !summary.has_failures()
        }
        Err(e) => {
            progress.finish_and_clear();
            error!("Plotting failed: {:#}", e);
            false
        }
    }
}

fn cmd_inspect(file: &Path, config: &PipelineConfig) -> bool {
    let experiment = match loaders::load_experiment(file, &config.loader) {
        Ok(exp) => exp,
        Err(e) => {
            error!("Failed to load {}: {}", file.display(), e);
            return false;
        }
    };

    let processor = match batch::build_processor(config) {
        Ok(p) => p,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            return false;
        }
    };

    println!("{}", file.display());
    println!(
        "{:>6} {:>8} {:>10} {:>14} {:>14} {:>10}",
        "Cycle", "Rows", "Boundary", "V (Ag/AgCl)", "V (RHE)", "Cathodic"
    );

    let mut with_boundary = 0;
    for cycle in processor.for_experiment(&experiment) {
        let (boundary, v_ref, v_rhe) = match cycle.curve.cathodic_end {
            Some(idx) => {
                with_boundary += 1;
                (
                    idx.to_string(),
                    format!("{:.4}", cycle.curve.voltage_ref[idx]),
                    format!("{:.4}", cycle.curve.voltage_rhe[idx]),
                )
            }
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };
        let cathodic_rows = cycle
            .cathodic
            .as_ref()
            .map_or("excluded".to_string(), |c| c.len().to_string());

        println!(
            "{:>6} {:>8} {:>10} {:>14} {:>14} {:>10}",
            cycle.index + 1,
            cycle.curve.len(),
            boundary,
            v_ref,
            v_rhe,
            cathodic_rows
        );
    }

    print_summary(
        "Inspection Complete",
        &[
            ("File", file.display().to_string()),
            ("Encoding", format!("{:?}", experiment.encoding)),
            ("Cycles", experiment.num_cycles().to_string()),
            ("With turning point", with_boundary.to_string()),
            (
                "RHE offset (V)",
                format!("{:.4}", processor.constants().rhe_offset_v()),
            ),
        ],
    );

    true
}

fn cmd_init_config(path: &Path, force: bool) -> bool {
    if path.exists() && !force {
        error!(
            "{} already exists, pass --force to overwrite",
            path.display()
        );
        return false;
    }

    match PipelineConfig::default().to_yaml(path) {
        Ok(()) => {
            println!("Wrote default configuration to {}", path.display());
            true
        }
        Err(e) => {
            error!("Failed to write {}: {}", path.display(), e);
            false
        }
    }
}
