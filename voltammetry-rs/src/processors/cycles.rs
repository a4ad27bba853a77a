//! Per-cycle derived quantities and cathodic scan detection.
//!
//! For each voltage/current pair this computes the RHE-referenced voltage,
//! the current density and the areal capacitance, and locates the end of the
//! initial downward sweep so charts can be restricted to the cathodic scan.

use log::{debug, warn};

use crate::config::Constants;
use crate::core::loaders::{Cycle, Experiment};

use super::smoothing::SavitzkyGolay;

/// Microamps per amp.
const MICROAMPS_PER_AMP: f64 = 1_000_000.0;

/// Derived sequences for one cycle, all index-aligned with the raw samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedCurve {
    /// Voltage as measured (Ag/AgCl), in V.
    pub voltage_ref: Vec<f64>,
    /// Voltage against RHE, in V.
    pub voltage_rhe: Vec<f64>,
    /// Current density in A/m².
    pub current_density: Vec<f64>,
    /// Areal capacitance in F/m².
    pub capacitance: Vec<f64>,
    /// First strict local minimum of the voltage, if any.
    pub cathodic_end: Option<usize>,
}

impl DerivedCurve {
    /// Returns the number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.voltage_ref.len()
    }

    /// Returns true if the curve holds no samples.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.voltage_ref.is_empty()
    }

    /// Copy of the first `end` samples of every sequence.
    ///
    /// The boundary index is kept only if it still falls inside the slice.
    pub fn prefix(&self, end: usize) -> DerivedCurve {
        let end = end.min(self.len());
        DerivedCurve {
            voltage_ref: self.voltage_ref[..end].to_vec(),
            voltage_rhe: self.voltage_rhe[..end].to_vec(),
            current_density: self.current_density[..end].to_vec(),
            capacitance: self.capacitance[..end].to_vec(),
            cathodic_end: self.cathodic_end.filter(|&idx| idx < end),
        }
    }
}

/// One cycle of an experiment after conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedCycle {
    /// Zero-based cycle index. Shown to users as `index + 1`.
    pub index: usize,
    /// Full, untrimmed curve.
    pub curve: DerivedCurve,
    /// Curve cut at the cathodic boundary, or `None` when no boundary exists.
    pub cathodic: Option<DerivedCurve>,
}

impl ProcessedCycle {
    /// Legend label for this cycle.
    pub fn label(&self) -> String {
        format!("Cycle {}", self.index + 1)
    }
}

/// Find the end of the initial cathodic sweep.
///
/// Returns the first index `j` in `1..=n-2` with
/// `voltage[j - 1] > voltage[j] < voltage[j + 1]`. Plateaus never qualify
/// and later, deeper minima are ignored.
pub fn find_cathodic_end(voltage: &[f64]) -> Option<usize> {
    voltage
        .windows(3)
        .position(|w| w[0] > w[1] && w[1] < w[2])
        .map(|pos| pos + 1)
}

/// Restrict a curve to its cathodic sweep.
///
/// Returns `None` when `boundary` is `None` or `Some(0)`; otherwise every
/// sequence is cut to `[0, boundary)`, dropping the boundary sample itself.
pub fn trim_to_cathodic(curve: &DerivedCurve, boundary: Option<usize>) -> Option<DerivedCurve> {
    match boundary {
        None | Some(0) => None,
        Some(end) => Some(curve.prefix(end)),
    }
}

/// Converts raw cycles into derived curves using fixed run constants.
#[derive(Debug, Clone)]
pub struct CycleProcessor {
    constants: Constants,
    smoothing: Option<SavitzkyGolay>,
}

impl CycleProcessor {
    /// Create a processor without smoothing.
    pub fn new(constants: Constants) -> Self {
        Self {
            constants,
            smoothing: None,
        }
    }

    /// Smooth raw currents with the given filter before conversion.
    pub fn with_smoothing(mut self, filter: SavitzkyGolay) -> Self {
        self.smoothing = Some(filter);
        self
    }

    #[inline]
    pub fn constants(&self) -> &Constants {
        &self.constants
    }

    /// Compute the derived sequences for one cycle.
    ///
    /// The cathodic boundary is searched on the RHE voltage, which has the
    /// same turning points as the measured one.
    pub fn convert(&self, cycle: &Cycle<'_>) -> DerivedCurve {
        let smoothed = self.smooth(cycle);
        let current = smoothed.as_deref().unwrap_or(cycle.current);

        let offset = self.constants.rhe_offset_v();
        let area = self.constants.area_m2();
        let scan_rate = self.constants.scan_rate_v_s();

        let voltage_ref = cycle.voltage.to_vec();
        let voltage_rhe: Vec<f64> = voltage_ref.iter().map(|v| v + offset).collect();
        let current_density: Vec<f64> = current
            .iter()
            .map(|i| (i / MICROAMPS_PER_AMP) / area)
            .collect();
        let capacitance = current_density.iter().map(|j| j / scan_rate).collect();
        let cathodic_end = find_cathodic_end(&voltage_rhe);

        DerivedCurve {
            voltage_ref,
            voltage_rhe,
            current_density,
            capacitance,
            cathodic_end,
        }
    }

    /// Convert and trim one cycle.
    pub fn process(&self, cycle: &Cycle<'_>) -> ProcessedCycle {
        let curve = self.convert(cycle);
        let cathodic = trim_to_cathodic(&curve, curve.cathodic_end);

        match curve.cathodic_end {
            Some(idx) => debug!(
                "Cycle {}: cathodic scan ends at sample {} of {}",
                cycle.index + 1,
                idx,
                curve.len()
            ),
            None => debug!("Cycle {}: no cathodic turning point", cycle.index + 1),
        }

        ProcessedCycle {
            index: cycle.index,
            curve,
            cathodic,
        }
    }

    /// Lazily process every cycle of an experiment in column order.
    ///
    /// The iterator borrows the experiment and can be recreated at will;
    /// each call yields the same sequence.
    pub fn for_experiment<'a>(&'a self, experiment: &'a Experiment) -> CycleCurves<'a> {
        CycleCurves {
            processor: self,
            experiment,
            current: 0,
        }
    }

    fn smooth(&self, cycle: &Cycle<'_>) -> Option<Vec<f64>> {
        let filter = self.smoothing.as_ref()?;
        match filter.apply(cycle.current) {
            Ok(values) => Some(values),
            Err(e) => {
                warn!(
                    "Cycle {}: Savitzky-Golay smoothing (window {}, order {}) skipped: {}",
                    cycle.index + 1,
                    filter.window(),
                    filter.polyorder(),
                    e
                );
                None
            }
        }
    }
}

/// Iterator over the processed cycles of one experiment.
pub struct CycleCurves<'a> {
    processor: &'a CycleProcessor,
    experiment: &'a Experiment,
    current: usize,
}

impl Iterator for CycleCurves<'_> {
    type Item = ProcessedCycle;

    fn next(&mut self) -> Option<Self::Item> {
        let cycle = self.experiment.cycle(self.current)?;
        self.current += 1;
        Some(self.processor.process(&cycle))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.experiment.num_cycles().saturating_sub(self.current);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for CycleCurves<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn constants(ph: f64) -> Constants {
        let area = std::f64::consts::PI * 0.0035 * 0.0035;
        Constants::new(area, 0.01, ph).unwrap()
    }

    fn scenario_experiment() -> Experiment {
        Experiment::from_columns(vec![
            vec![0.5, 0.3, 0.1, 0.2, 0.4],
            vec![10.0, 20.0, 30.0, 25.0, 15.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_find_cathodic_end_v_shape() {
        assert_eq!(find_cathodic_end(&[0.5, 0.3, 0.1, 0.2, 0.4]), Some(2));
        assert_eq!(find_cathodic_end(&[1.0, 0.0, 1.0]), Some(1));
        assert_eq!(
            find_cathodic_end(&[0.9, 0.7, 0.5, 0.3, 0.1, -0.1, 0.0, 0.2]),
            Some(5)
        );
    }

    #[test]
    fn test_find_cathodic_end_monotonic_is_none() {
        assert_eq!(find_cathodic_end(&[0.1, 0.2, 0.3, 0.4]), None);
        assert_eq!(find_cathodic_end(&[0.4, 0.3, 0.2, 0.1]), None);
    }

    #[test]
    fn test_find_cathodic_end_returns_first_not_deepest() {
        let voltage = [0.5, 0.2, 0.3, 0.1, -0.5, 0.0];
        assert_eq!(find_cathodic_end(&voltage), Some(1));
    }

    #[test]
    fn test_find_cathodic_end_ignores_plateau() {
        assert_eq!(find_cathodic_end(&[0.5, 0.1, 0.1, 0.5]), None);
        assert_eq!(find_cathodic_end(&[0.5, 0.1, 0.1, 0.0, 0.3]), Some(3));
    }

    #[test]
    fn test_find_cathodic_end_short_input() {
        assert_eq!(find_cathodic_end(&[]), None);
        assert_eq!(find_cathodic_end(&[0.1]), None);
        assert_eq!(find_cathodic_end(&[0.2, 0.1]), None);
    }

    #[test]
    fn test_trim_to_cathodic_none_and_zero() {
        let processor = CycleProcessor::new(constants(7.0));
        let experiment = scenario_experiment();
        let curve = processor.convert(&experiment.cycle(0).unwrap());

        assert!(trim_to_cathodic(&curve, None).is_none());
        assert!(trim_to_cathodic(&curve, Some(0)).is_none());
        assert_eq!(trim_to_cathodic(&curve, Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_scenario_boundary_and_trim() {
        let processor = CycleProcessor::new(constants(7.0));
        let experiment = scenario_experiment();
        let area = processor.constants().area_m2();

        let processed: Vec<ProcessedCycle> = processor.for_experiment(&experiment).collect();
        assert_eq!(processed.len(), 1);

        let cycle = &processed[0];
        assert_eq!(cycle.curve.cathodic_end, Some(2));
        assert_eq!(cycle.curve.voltage_ref[2], 0.1);
        assert_eq!(cycle.curve.current_density[0], (10.0 / 1e6) / area);

        let trimmed = cycle.cathodic.as_ref().unwrap();
        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed.voltage_ref, vec![0.5, 0.3]);
        assert_eq!(trimmed.current_density, cycle.curve.current_density[..2].to_vec());
        assert_eq!(trimmed.capacitance.len(), 2);
        assert_eq!(trimmed.voltage_rhe.len(), 2);
        assert_eq!(trimmed.cathodic_end, None);
        assert_eq!(cycle.label(), "Cycle 1");
    }

    #[test]
    fn test_convert_sequences_are_aligned() {
        let processor = CycleProcessor::new(constants(6.5));
        let experiment = scenario_experiment();
        let curve = processor.convert(&experiment.cycle(0).unwrap());

        assert_eq!(curve.voltage_ref.len(), 5);
        assert_eq!(curve.voltage_rhe.len(), 5);
        assert_eq!(curve.current_density.len(), 5);
        assert_eq!(curve.capacitance.len(), 5);
    }

    #[test]
    fn test_convert_is_pure() {
        let processor = CycleProcessor::new(constants(6.5));
        let experiment = scenario_experiment();
        let cycle = experiment.cycle(0).unwrap();

        let first = processor.convert(&cycle);
        let second = processor.convert(&cycle);
        for (a, b) in first.current_density.iter().zip(&second.current_density) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(first, second);
    }

    #[test]
    fn test_capacitance_times_scan_rate_is_density() {
        let processor = CycleProcessor::new(constants(6.5));
        let experiment = scenario_experiment();
        let curve = processor.convert(&experiment.cycle(0).unwrap());
        let scan_rate = processor.constants().scan_rate_v_s();

        for (c, j) in curve.capacitance.iter().zip(&curve.current_density) {
            assert!((c * scan_rate - j).abs() <= 1e-12 * j.abs().max(1.0));
        }
    }

    #[test]
    fn test_rhe_shift_is_constant_offset() {
        let processor = CycleProcessor::new(constants(7.0));
        let experiment = scenario_experiment();
        let curve = processor.convert(&experiment.cycle(0).unwrap());
        let offset = processor.constants().rhe_offset_v();

        assert!((offset - 0.610).abs() < 1e-12);
        for (rhe, raw) in curve.voltage_rhe.iter().zip(&curve.voltage_ref) {
            assert_eq!(*rhe, raw + offset);
            assert!((rhe - raw - offset).abs() < 1e-12);
        }
    }

    #[test]
    fn test_monotonic_cycle_is_excluded() {
        let processor = CycleProcessor::new(constants(7.0));
        let experiment = Experiment::from_columns(vec![
            vec![0.1, 0.2, 0.3, 0.4],
            vec![1.0, 2.0, 3.0, 4.0],
            vec![0.5, 0.3, 0.1, 0.2],
            vec![1.0, 2.0, 3.0, 4.0],
        ])
        .unwrap();

        let processed: Vec<ProcessedCycle> = processor.for_experiment(&experiment).collect();
        assert_eq!(processed.len(), 2);
        assert!(processed[0].cathodic.is_none());
        assert_eq!(processed[1].index, 1);
        assert_eq!(processed[1].cathodic.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_for_experiment_is_restartable() {
        let processor = CycleProcessor::new(constants(7.0));
        let experiment = scenario_experiment();

        let iter = processor.for_experiment(&experiment);
        assert_eq!(iter.len(), 1);

        let first: Vec<ProcessedCycle> = processor.for_experiment(&experiment).collect();
        let second: Vec<ProcessedCycle> = processor.for_experiment(&experiment).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_smoothing_applies_to_current_only() {
        let filter = SavitzkyGolay::new(3, 1).unwrap();
        let processor = CycleProcessor::new(constants(7.0)).with_smoothing(filter);
        let experiment = Experiment::from_columns(vec![
            vec![0.5, 0.3, 0.1, 0.2, 0.4],
            vec![0.0, 3.0, 0.0, 3.0, 0.0],
        ])
        .unwrap();

        let curve = processor.convert(&experiment.cycle(0).unwrap());
        let area = processor.constants().area_m2();
        assert_eq!(curve.voltage_ref, vec![0.5, 0.3, 0.1, 0.2, 0.4]);
        // Centered 3-point linear fit is a moving average
        assert!((curve.current_density[2] - (2.0 / 1e6) / area).abs() < 1e-9);
    }

    #[test]
    fn test_smoothing_skipped_for_short_cycle() {
        let filter = SavitzkyGolay::new(7, 2).unwrap();
        let processor = CycleProcessor::new(constants(7.0)).with_smoothing(filter);
        let experiment = scenario_experiment();
        let plain = CycleProcessor::new(constants(7.0));

        let cycle = experiment.cycle(0).unwrap();
        assert_eq!(processor.convert(&cycle), plain.convert(&cycle));
    }
}
