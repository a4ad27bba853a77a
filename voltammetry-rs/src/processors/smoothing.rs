//! Savitzky-Golay smoothing for current traces.
//!
//! Interior samples are replaced by the value of a least-squares polynomial
//! fitted over a centered window. The first and last `window / 2` samples are
//! evaluated on the polynomial fitted to the first (last) full window rather
//! than padded.

use thiserror::Error;

use crate::config::SmoothingConfig;

/// Errors that can occur when configuring or applying the filter.
#[derive(Debug, Error, PartialEq)]
pub enum SmoothingError {
    #[error("window length must be odd, got {0}")]
    EvenWindow(usize),

    #[error("polyorder {polyorder} must be less than window length {window}")]
    OrderTooHigh { polyorder: usize, window: usize },

    #[error("window length {window} exceeds series length {len}")]
    WindowTooLong { window: usize, len: usize },
}

/// Result type for smoothing operations.
pub type Result<T> = std::result::Result<T, SmoothingError>;

/// Precomputed Savitzky-Golay weights for one (window, polyorder) pair.
#[derive(Debug, Clone)]
pub struct SavitzkyGolay {
    window: usize,
    polyorder: usize,
    /// `weights[t + half][j]`: contribution of window sample `j` to the fit
    /// evaluated at offset `t` from the window center.
    weights: Vec<Vec<f64>>,
}

impl SavitzkyGolay {
    /// Build a filter, validating the parameters.
    pub fn new(window: usize, polyorder: usize) -> Result<Self> {
        if window % 2 == 0 {
            return Err(SmoothingError::EvenWindow(window));
        }
        if polyorder >= window {
            return Err(SmoothingError::OrderTooHigh { polyorder, window });
        }

        let half = (window / 2) as f64;
        let xs: Vec<f64> = (0..window).map(|j| j as f64 - half).collect();
        let terms = polyorder + 1;

        // Normal matrix A^T A with A[j][m] = x_j^m
        let mut normal = vec![vec![0.0; terms]; terms];
        for (r, row) in normal.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = xs.iter().map(|x| x.powi((r + c) as i32)).sum();
            }
        }

        let weights = xs
            .iter()
            .map(|&t| {
                let basis: Vec<f64> = (0..terms).map(|m| t.powi(m as i32)).collect();
                let z = solve(normal.clone(), basis);
                xs.iter()
                    .map(|&x| z.iter().enumerate().map(|(m, zm)| zm * x.powi(m as i32)).sum())
                    .collect()
            })
            .collect();

        Ok(Self {
            window,
            polyorder,
            weights,
        })
    }

    /// Build a filter from the pipeline config.
    pub fn from_config(config: &SmoothingConfig) -> Result<Self> {
        Self::new(config.window_length, config.polyorder)
    }

    #[inline]
    pub fn window(&self) -> usize {
        self.window
    }

    #[inline]
    pub fn polyorder(&self) -> usize {
        self.polyorder
    }

    /// Convolution weights for the centered (interior) fit.
    pub fn center_weights(&self) -> &[f64] {
        &self.weights[self.window / 2]
    }

    /// Smooth a series.
    ///
    /// # Errors
    ///
    /// Returns [`SmoothingError::WindowTooLong`] if the series is shorter
    /// than the window.
    pub fn apply(&self, values: &[f64]) -> Result<Vec<f64>> {
        let n = values.len();
        if self.window > n {
            return Err(SmoothingError::WindowTooLong {
                window: self.window,
                len: n,
            });
        }

        let half = self.window / 2;
        let last_start = n - self.window;

        let smoothed = (0..n)
            .map(|k| {
                let start = k.saturating_sub(half).min(last_start);
                // Offset of k from the window center, shifted to a row index
                let row = k - start;
                self.weights[row]
                    .iter()
                    .zip(&values[start..start + self.window])
                    .map(|(w, y)| w * y)
                    .sum()
            })
            .collect();

        Ok(smoothed)
    }
}

/// Smooth `values` with a Savitzky-Golay filter.
pub fn savgol(values: &[f64], window: usize, polyorder: usize) -> Result<Vec<f64>> {
    SavitzkyGolay::new(window, polyorder)?.apply(values)
}

/// Solve a small dense system with Gaussian elimination and partial pivoting.
///
/// Only used on normal matrices of Vandermonde systems with more points than
/// terms, which are symmetric positive definite.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &[f64], b: &[f64], tol: f64) {
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b).enumerate() {
            assert!((x - y).abs() < tol, "index {}: {} vs {}", i, x, y);
        }
    }

    #[test]
    fn test_center_weights_match_classic_table() {
        let filter = SavitzkyGolay::new(5, 2).unwrap();
        let expected: Vec<f64> = [-3.0, 12.0, 17.0, 12.0, -3.0]
            .iter()
            .map(|w| w / 35.0)
            .collect();
        assert_close(filter.center_weights(), &expected, 1e-12);
    }

    #[test]
    fn test_from_config_keeps_parameters() {
        let filter = SavitzkyGolay::from_config(&SmoothingConfig {
            window_length: 7,
            polyorder: 3,
        })
        .unwrap();
        assert_eq!(filter.window(), 7);
        assert_eq!(filter.polyorder(), 3);
        assert_eq!(filter.center_weights().len(), 7);
    }

    #[test]
    fn test_quadratic_is_preserved_including_edges() {
        let xs: Vec<f64> = (0..12).map(|i| i as f64 * 0.1).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 0.5 * x * x - 2.0 * x + 1.0).collect();

        let smoothed = savgol(&ys, 5, 2).unwrap();
        assert_close(&smoothed, &ys, 1e-9);
    }

    #[test]
    fn test_alternating_noise_is_damped() {
        let ys: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let smoothed = savgol(&ys, 5, 2).unwrap();

        for value in &smoothed[2..18] {
            assert!(value.abs() < 0.5);
        }
    }

    #[test]
    fn test_window_equal_to_length() {
        let ys = [1.0, 2.0, 4.0, 2.0, 1.0];
        let smoothed = savgol(&ys, 5, 2).unwrap();
        assert_eq!(smoothed.len(), 5);
    }

    #[test]
    fn test_parameter_validation() {
        assert_eq!(
            SavitzkyGolay::new(4, 2).unwrap_err(),
            SmoothingError::EvenWindow(4)
        );
        assert_eq!(
            SavitzkyGolay::new(3, 3).unwrap_err(),
            SmoothingError::OrderTooHigh {
                polyorder: 3,
                window: 3
            }
        );
        assert_eq!(
            savgol(&[1.0, 2.0], 5, 2).unwrap_err(),
            SmoothingError::WindowTooLong { window: 5, len: 2 }
        );
    }
}
