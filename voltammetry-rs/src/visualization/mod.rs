//! Voltammogram charts.
//!
//! Each chart is a set of per-cycle line series drawn with plotters and saved
//! twice: a PNG through the bitmap backend and an SVG through the SVG backend.
//! Cycles are coloured along the magma colormap by their position in the file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use palette::{Mix, Srgb};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use plotters_svg::SVGBackend;
use thiserror::Error;

use crate::config::{PlotConfig, ScanSelection};

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("Plotting error: {0}")]
    PlottingError(String),
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Height all font and margin sizes are expressed against.
const REFERENCE_HEIGHT: f64 = 480.0;

/// Magma colormap sampled at nine evenly spaced stops.
const MAGMA_STOPS: [(u8, u8, u8); 9] = [
    (0, 0, 4),
    (28, 16, 68),
    (79, 18, 123),
    (129, 37, 129),
    (181, 54, 122),
    (229, 80, 100),
    (251, 135, 97),
    (254, 194, 135),
    (252, 253, 191),
];

/// Sample the magma colormap at `t` in `[0, 1]`.
///
/// Values outside the range are clamped and NaN maps to the darkest stop.
pub fn magma(t: f64) -> RGBColor {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let last = MAGMA_STOPS.len() - 1;
    let scaled = t * last as f64;
    let lo = (scaled.floor() as usize).min(last);
    let hi = (lo + 1).min(last);
    let frac = (scaled - lo as f64) as f32;

    let (r0, g0, b0) = MAGMA_STOPS[lo];
    let (r1, g1, b1) = MAGMA_STOPS[hi];
    let a: Srgb<f32> = Srgb::new(r0, g0, b0).into_format();
    let b: Srgb<f32> = Srgb::new(r1, g1, b1).into_format();
    let mixed: Srgb<u8> = a.mix(b, frac).into_format();

    RGBColor(mixed.red, mixed.green, mixed.blue)
}

/// Colour of cycle `index` out of `num_cycles`, independent of trimming.
pub fn cycle_color(index: usize, num_cycles: usize) -> RGBColor {
    if num_cycles == 0 {
        return magma(0.0);
    }
    magma(index as f64 / num_cycles as f64)
}

/// Quantity on the y axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    CurrentDensity,
    Capacitance,
}

impl Quantity {
    pub const ALL: [Quantity; 2] = [Quantity::CurrentDensity, Quantity::Capacitance];

    pub fn file_tag(self) -> &'static str {
        match self {
            Quantity::CurrentDensity => "density",
            Quantity::Capacitance => "capacitance",
        }
    }

    pub fn axis_label(self) -> &'static str {
        match self {
            Quantity::CurrentDensity => "Current Density (A/m^2)",
            Quantity::Capacitance => "Capacitance (F/m^2)",
        }
    }
}

/// Voltage reference on the x axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoltageReference {
    AgAgCl,
    Rhe,
}

impl VoltageReference {
    pub const ALL: [VoltageReference; 2] = [VoltageReference::AgAgCl, VoltageReference::Rhe];

    pub fn file_tag(self) -> &'static str {
        match self {
            VoltageReference::AgAgCl => "AgAgCl",
            VoltageReference::Rhe => "RHE",
        }
    }

    pub fn axis_label(self) -> &'static str {
        match self {
            VoltageReference::AgAgCl => "Voltage (V) vs Ag/AgCl",
            VoltageReference::Rhe => "Voltage vs RHE (V)",
        }
    }

    fn title_suffix(self) -> &'static str {
        match self {
            VoltageReference::AgAgCl => "",
            VoltageReference::Rhe => " (RHE)",
        }
    }
}

/// Identifies one of the charts produced per input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartKind {
    pub selection: ScanSelection,
    pub quantity: Quantity,
    pub reference: VoltageReference,
}

impl ChartKind {
    /// The four charts for a scan selection, in output order.
    pub fn all(selection: ScanSelection) -> Vec<ChartKind> {
        VoltageReference::ALL
            .iter()
            .flat_map(|&reference| {
                Quantity::ALL.iter().map(move |&quantity| ChartKind {
                    selection,
                    quantity,
                    reference,
                })
            })
            .collect()
    }

    /// `{basename}_{selection}_{quantity}_{reference}`, without extension.
    pub fn file_stem(&self, basename: &str) -> String {
        format!(
            "{}_{}_{}_{}",
            basename,
            self.selection.file_tag(),
            self.quantity.file_tag(),
            self.reference.file_tag()
        )
    }

    pub fn title(&self, basename: &str) -> String {
        format!(
            "{} - {}{}",
            basename,
            self.selection.title(),
            self.reference.title_suffix()
        )
    }
}

/// One labelled curve on a chart.
#[derive(Debug, Clone)]
pub struct Series<'a> {
    pub label: String,
    pub color: RGBColor,
    pub x: &'a [f64],
    pub y: &'a [f64],
}

/// Append `.{ext}` to a path without touching dots already in the name.
pub fn with_suffix(stem: &Path, ext: &str) -> PathBuf {
    let mut name = OsString::from(stem.as_os_str());
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Render a chart to `{stem}.png` and `{stem}.svg`.
///
/// A chart without series is still written, with default axis ranges and an
/// empty legend.
///
/// # Returns
///
/// The paths of the written PNG and SVG files.
pub fn render_chart(
    stem: &Path,
    title: &str,
    kind: &ChartKind,
    series: &[Series<'_>],
    config: &PlotConfig,
) -> Result<[PathBuf; 2]> {
    let png_path = with_suffix(stem, "png");
    let svg_path = with_suffix(stem, "svg");

    {
        let root = BitMapBackend::new(&png_path, (config.width, config.height)).into_drawing_area();
        draw_chart(&root, title, kind, series, config)?;
    }
    {
        let root =
            SVGBackend::new(&svg_path, (config.svg_width, config.svg_height)).into_drawing_area();
        draw_chart(&root, title, kind, series, config)?;
    }

    Ok([png_path, svg_path])
}

fn plot_err<E: std::fmt::Display>(e: E) -> VisualizationError {
    VisualizationError::PlottingError(e.to_string())
}

fn draw_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    title: &str,
    kind: &ChartKind,
    series: &[Series<'_>],
    config: &PlotConfig,
) -> Result<()> {
    let (_, height) = root.dim_in_pixel();
    let unit = (height as f64 / REFERENCE_HEIGHT).max(0.25);
    let px = |v: f64| (v * unit).round() as u32;

    root.fill(&WHITE).map_err(plot_err)?;

    let (x_min, x_max, y_min, y_max) = compute_bounds(series);
    let x_padding = (x_max - x_min) * 0.05;
    let y_padding = (y_max - y_min) * 0.05;

    let mut builder = ChartBuilder::on(root);
    builder.margin(px(12.0));
    if config.labels {
        builder
            .caption(title, ("sans-serif", px(16.0)))
            .x_label_area_size(px(45.0))
            .y_label_area_size(px(75.0));
    }

    let mut chart = builder
        .build_cartesian_2d(
            (x_min - x_padding)..(x_max + x_padding),
            (y_min - y_padding)..(y_max + y_padding),
        )
        .map_err(plot_err)?;

    if config.labels {
        chart
            .configure_mesh()
            .disable_x_mesh()
            .disable_y_mesh()
            .x_desc(kind.reference.axis_label())
            .y_desc(kind.quantity.axis_label())
            .label_style(("sans-serif", px(11.0)))
            .axis_desc_style(("sans-serif", px(13.0)))
            .y_label_formatter(&|v| format_tick(*v))
            .draw()
            .map_err(plot_err)?;
    }

    let stroke = px(config.line_width as f64 / 2.0).max(1);

    for s in series {
        let color = s.color;
        for (run_idx, run) in finite_runs(s.x, s.y).into_iter().enumerate() {
            let anno = chart
                .draw_series(LineSeries::new(run, color.stroke_width(stroke)))
                .map_err(plot_err)?;
            if run_idx == 0 {
                let legend_len = px(20.0) as i32;
                anno.label(s.label.as_str()).legend(move |(x, y)| {
                    PathElement::new(vec![(x, y), (x + legend_len, y)], color.stroke_width(stroke))
                });
            }
        }
    }

    if config.labels {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .label_font(("sans-serif", px(11.0)))
            .border_style(BLACK.mix(0.4))
            .background_style(WHITE.mix(0.8))
            .draw()
            .map_err(plot_err)?;
    }

    root.present().map_err(plot_err)?;

    Ok(())
}

/// Split a curve into runs of consecutive finite points so gaps stay gaps.
fn finite_runs(x: &[f64], y: &[f64]) -> Vec<Vec<(f64, f64)>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();

    for (&xv, &yv) in x.iter().zip(y) {
        if xv.is_finite() && yv.is_finite() {
            current.push((xv, yv));
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }

    runs
}

/// Compute the bounds (min/max) for x and y over every finite point.
fn compute_bounds(series: &[Series<'_>]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::MAX;
    let mut x_max = f64::MIN;
    let mut y_min = f64::MAX;
    let mut y_max = f64::MIN;

    for s in series {
        for (&x, &y) in s.x.iter().zip(s.y) {
            if !(x.is_finite() && y.is_finite()) {
                continue;
            }
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }
    }

    if x_min > x_max {
        // Nothing to draw
        return (0.0, 1.0, 0.0, 1.0);
    }

    let (x_min, x_max) = widen_if_flat(x_min, x_max);
    let (y_min, y_max) = widen_if_flat(y_min, y_max);

    (x_min, x_max, y_min, y_max)
}

/// Give a zero-width range some extent, proportional to its magnitude.
///
/// Flatness is judged relative to the values, so small but real spreads
/// such as nF-scale capacitances are kept as they are.
fn widen_if_flat(lo: f64, hi: f64) -> (f64, f64) {
    let magnitude = lo.abs().max(hi.abs());
    if hi - lo > magnitude * 4.0 * f64::EPSILON {
        return (lo, hi);
    }
    let pad = if magnitude > 0.0 { magnitude * 0.1 } else { 1.0 };
    (lo - pad, hi + pad)
}

/// Plain decimal ticks, switching to scientific notation for very small or
/// very large magnitudes.
fn format_tick(v: f64) -> String {
    let magnitude = v.abs();
    if magnitude != 0.0 && !(1e-2..1e4).contains(&magnitude) {
        format!("{:.2e}", v)
    } else {
        format!("{:.3}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn unlabeled() -> PlotConfig {
        PlotConfig {
            width: 120,
            height: 90,
            svg_width: 80,
            svg_height: 60,
            line_width: 2,
            labels: false,
        }
    }

    #[test]
    fn test_magma_endpoints_and_clamping() {
        assert_eq!(magma(0.0), RGBColor(0, 0, 4));
        assert_eq!(magma(1.0), RGBColor(252, 253, 191));
        assert_eq!(magma(-2.0), magma(0.0));
        assert_eq!(magma(5.0), magma(1.0));
        assert_eq!(magma(f64::NAN), magma(0.0));
        assert_eq!(magma(0.5), RGBColor(181, 54, 122));
    }

    #[test]
    fn test_magma_gets_brighter() {
        let luminance = |c: RGBColor| c.0 as u32 + c.1 as u32 + c.2 as u32;
        let mut previous = 0;
        for i in 0..=10 {
            let l = luminance(magma(i as f64 / 10.0));
            assert!(l >= previous);
            previous = l;
        }
    }

    #[test]
    fn test_cycle_color_uses_position() {
        assert_eq!(cycle_color(0, 4), magma(0.0));
        assert_eq!(cycle_color(2, 4), magma(0.5));
        assert_eq!(cycle_color(0, 0), magma(0.0));
    }

    #[test]
    fn test_chart_kinds_and_names() {
        let kinds = ChartKind::all(ScanSelection::Cathodic);
        let stems: Vec<String> = kinds.iter().map(|k| k.file_stem("run1")).collect();
        assert_eq!(
            stems,
            vec![
                "run1_cathodic_density_AgAgCl",
                "run1_cathodic_capacitance_AgAgCl",
                "run1_cathodic_density_RHE",
                "run1_cathodic_capacitance_RHE",
            ]
        );
        assert_eq!(kinds[0].title("run1"), "run1 - Cathodic Scans");
        assert_eq!(kinds[2].title("run1"), "run1 - Cathodic Scans (RHE)");

        let full = ChartKind::all(ScanSelection::Full);
        assert_eq!(full[3].file_stem("x"), "x_full_capacitance_RHE");
    }

    #[test]
    fn test_with_suffix_keeps_dots() {
        let path = with_suffix(Path::new("out/sample.1_cathodic_density_RHE"), "png");
        assert_eq!(path, PathBuf::from("out/sample.1_cathodic_density_RHE.png"));
    }

    #[test]
    fn test_finite_runs_split_on_nan() {
        let x = [0.0, 1.0, f64::NAN, 3.0, 4.0];
        let y = [1.0, 2.0, 3.0, 4.0, f64::INFINITY];
        let runs = finite_runs(&x, &y);
        assert_eq!(runs, vec![vec![(0.0, 1.0), (1.0, 2.0)], vec![(3.0, 4.0)]]);
    }

    #[test]
    fn test_compute_bounds_defaults_and_flat() {
        assert_eq!(compute_bounds(&[]), (0.0, 1.0, 0.0, 1.0));

        let x = [0.5, 0.5];
        let y = [2.0, 3.0];
        let series = [Series {
            label: "Cycle 1".to_string(),
            color: magma(0.0),
            x: &x,
            y: &y,
        }];
        let (x_min, x_max, y_min, y_max) = compute_bounds(&series);
        assert!((x_min - 0.45).abs() < 1e-12);
        assert!((x_max - 0.55).abs() < 1e-12);
        assert_eq!((y_min, y_max), (2.0, 3.0));
    }

    #[test]
    fn test_compute_bounds_keeps_tiny_spread() {
        let x = [0.1, 0.2, 0.3];
        let y = [1.0e-9, 1.5e-9, 2.0e-9];
        let series = [Series {
            label: "Cycle 1".to_string(),
            color: magma(0.0),
            x: &x,
            y: &y,
        }];
        let (_, _, y_min, y_max) = compute_bounds(&series);
        assert_eq!((y_min, y_max), (1.0e-9, 2.0e-9));
    }

    #[test]
    fn test_widen_if_flat() {
        assert_eq!(widen_if_flat(0.0, 0.0), (-1.0, 1.0));
        let (lo, hi) = widen_if_flat(-2.0, -2.0);
        assert!((lo + 2.2).abs() < 1e-12 && (hi + 1.8).abs() < 1e-12);
        assert_eq!(widen_if_flat(1.0e-12, 3.0e-12), (1.0e-12, 3.0e-12));
    }

    #[test]
    fn test_render_chart_reports_backend_failure() {
        let dir = tempdir().unwrap();
        let stem = dir.path().join("missing").join("chart");
        let kind = ChartKind::all(ScanSelection::Cathodic)[0];

        match render_chart(&stem, "chart", &kind, &[], &unlabeled()) {
            Err(VisualizationError::PlottingError(msg)) => assert!(!msg.is_empty()),
            other => panic!("Expected PlottingError, got {:?}", other),
        }
    }

    #[test]
    fn test_format_tick() {
        assert_eq!(format_tick(0.0), "0.000");
        assert_eq!(format_tick(0.25), "0.250");
        assert_eq!(format_tick(0.0005), "5.00e-4");
    }

    #[test]
    fn test_render_chart_writes_png_and_svg() {
        let dir = tempdir().unwrap();
        let stem = dir.path().join("demo_cathodic_density_AgAgCl");
        let kind = ChartKind::all(ScanSelection::Cathodic)[0];

        let x = [0.5, 0.3, 0.1];
        let y = [1.0, 2.0, 3.0];
        let series = [Series {
            label: "Cycle 1".to_string(),
            color: cycle_color(0, 1),
            x: &x,
            y: &y,
        }];

        let [png, svg] = render_chart(&stem, "demo", &kind, &series, &unlabeled()).unwrap();
        assert!(png.exists());
        assert!(svg.exists());
        let content = std::fs::read_to_string(&svg).unwrap();
        assert!(content.contains("<svg"));
    }

    #[test]
    fn test_render_chart_without_series() {
        let dir = tempdir().unwrap();
        let stem = dir.path().join("empty");
        let kind = ChartKind::all(ScanSelection::Cathodic)[1];

        let [png, svg] = render_chart(&stem, "empty", &kind, &[], &unlabeled()).unwrap();
        assert!(png.exists());
        assert!(svg.exists());
    }
}
