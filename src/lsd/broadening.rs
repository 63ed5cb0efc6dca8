//! Broadening-parameter grid with a sparse (width, exponent) multi-index.
//!
//! Every line has a normalized reference width `gamma_ref R / nu` and a
//! temperature exponent `n`. Both are binned: the width on a log-interval
//! grid (interpolated in `ln gamma`, so `ln gamma(T, P)` stays linear in the
//! weights) and the exponent on a linear grid. Of the full product grid only
//! the pairs a line actually touches are kept, compacted to a dense index.

use log::debug;
use smallvec::SmallVec;

use crate::error::OpacityError;
use crate::grid::{ditgrid_linear_interval, ditgrid_log_interval, getix};

/// Compacted broadening indices of one line with their weights.
///
/// A line touches at most four (width, exponent) pairs; corners with an exact
/// zero weight are left out.
pub type BroadeningWeights = SmallVec<[(usize, f64); 4]>;

/// The broadening axis of a PreMODIT LSD.
#[derive(Debug, Clone)]
pub struct BroadeningGrid {
    /// Normalized reference widths, log spaced.
    ngamma_ref_grid: Vec<f64>,
    /// Temperature exponents, linearly spaced.
    n_texp_grid: Vec<f64>,
    /// Touched `(width index, exponent index)` pairs, sorted. The position of
    /// a pair is its compacted broadening index.
    multi_index: Vec<[usize; 2]>,
    /// Per-line compacted indices and weights.
    line_weights: Vec<BroadeningWeights>,
}

impl BroadeningGrid {
    /// Bin the lines' normalized reference widths and temperature exponents.
    pub fn new(
        ngamma_ref: &[f64],
        n_texp: &[f64],
        resolution: f64,
    ) -> Result<Self, OpacityError> {
        if ngamma_ref.len() != n_texp.len() {
            return Err(OpacityError::InconsistentInputs {
                name: "n_texp",
                expected: ngamma_ref.len(),
                actual: n_texp.len(),
            });
        }
        let ngamma_ref_grid = ditgrid_log_interval(ngamma_ref, resolution)?;
        let n_texp_grid = ditgrid_linear_interval(n_texp, resolution)?;

        let log_gamma_grid: Vec<f64> = ngamma_ref_grid.iter().map(|g| g.ln()).collect();

        // Corners in the full (width, exponent) grid, per line
        let corners: Vec<SmallVec<[([usize; 2], f64); 4]>> = ngamma_ref
            .iter()
            .zip(n_texp)
            .map(|(&gamma, &n)| {
                let ig = getix(gamma.ln(), &log_gamma_grid);
                let jn = getix(n, &n_texp_grid);
                let mut corners = SmallVec::new();
                for (di, wi) in ig.weights().into_iter().enumerate() {
                    for (dj, wj) in jn.weights().into_iter().enumerate() {
                        let weight = wi * wj;
                        if weight != 0. {
                            corners.push(([ig.index + di, jn.index + dj], weight));
                        }
                    }
                }
                corners
            })
            .collect();

        let mut multi_index: Vec<[usize; 2]> = corners
            .iter()
            .flat_map(|c| c.iter().map(|(pair, _)| *pair))
            .collect();
        multi_index.sort_unstable();
        multi_index.dedup();

        let line_weights = corners
            .iter()
            .map(|line| {
                line.iter()
                    .map(|(pair, weight)| {
                        // Every pair was inserted above
                        let compact = multi_index.binary_search(pair).unwrap_or_default();
                        (compact, *weight)
                    })
                    .collect()
            })
            .collect();

        debug!(
            "broadening grid: {} widths x {} exponents, {} pairs touched",
            ngamma_ref_grid.len(),
            n_texp_grid.len(),
            multi_index.len()
        );

        Ok(Self {
            ngamma_ref_grid,
            n_texp_grid,
            multi_index,
            line_weights,
        })
    }

    /// Number of compacted broadening bins.
    pub fn len(&self) -> usize {
        self.multi_index.len()
    }

    /// Whether no bin was touched, which only happens for an empty line set.
    pub fn is_empty(&self) -> bool {
        self.multi_index.is_empty()
    }

    /// Log-spaced normalized reference width grid.
    pub fn ngamma_ref_grid(&self) -> &[f64] {
        &self.ngamma_ref_grid
    }

    /// Linear temperature exponent grid.
    pub fn n_texp_grid(&self) -> &[f64] {
        &self.n_texp_grid
    }

    /// Touched `(width index, exponent index)` pairs in compacted order.
    pub fn multi_index(&self) -> &[[usize; 2]] {
        &self.multi_index
    }

    /// Compacted indices and weights of every line.
    pub fn line_weights(&self) -> &[BroadeningWeights] {
        &self.line_weights
    }

    /// Normalized Lorentz width of every broadening bin at temperature `t`
    /// (K) and pressure `p` (bar).
    pub fn unbiased_ngamma_grid(&self, t: f64, p: f64, tref_broadening: f64) -> Vec<f64> {
        self.multi_index
            .iter()
            .map(|&[i, j]| {
                self.ngamma_ref_grid[i] * (t / tref_broadening).powf(-self.n_texp_grid[j]) * p
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn weights_sum_to_one() {
        let ngamma = [0.8, 1.3, 2.9, 5.5];
        let n_texp = [0.45, 0.52, 0.71, 0.6];
        let grid = BroadeningGrid::new(&ngamma, &n_texp, 0.2).unwrap();

        for weights in grid.line_weights() {
            assert!(weights.len() <= 4);
            assert_relative_eq!(
                weights.iter().map(|(_, w)| w).sum::<f64>(),
                1.,
                max_relative = 1e-14
            );
            for &(b, _) in weights {
                assert!(b < grid.len());
            }
        }
        assert!(grid.multi_index().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn interpolation_is_linear_in_log_width() {
        let ngamma = [1.0, 1.37];
        let n_texp = [0.5, 0.5];
        let grid = BroadeningGrid::new(&ngamma, &n_texp, 0.2).unwrap();

        // Reconstruct ln(gamma) of the second line from its bins
        let weights = &grid.line_weights()[1];
        let log_gamma: f64 = weights
            .iter()
            .map(|&(b, w)| w * grid.ngamma_ref_grid()[grid.multi_index()[b][0]].ln())
            .sum();
        assert_relative_eq!(log_gamma, 1.37f64.ln(), max_relative = 1e-12);
    }

    #[test]
    fn constant_exponent_collapses_to_one_axis() {
        let ngamma = [0.9, 1.7, 3.1];
        let n_texp = [0.6, 0.6, 0.6];
        let grid = BroadeningGrid::new(&ngamma, &n_texp, 0.2).unwrap();

        assert_eq!(grid.n_texp_grid().len(), 2);
        assert!(grid.multi_index().iter().all(|&[_, j]| j == 0));
        assert!(grid.line_weights().iter().all(|w| w.len() <= 2));
    }

    #[test]
    fn ngamma_at_reference_conditions() {
        let grid = BroadeningGrid::new(&[2.0], &[0.7], 0.2).unwrap();
        let gamma = grid.unbiased_ngamma_grid(296., 1., 296.);
        // The line sits on the first grid point of both axes
        assert_eq!(grid.multi_index()[0], [0, 0]);
        assert_relative_eq!(gamma[0], 2.0);

        let hot = grid.unbiased_ngamma_grid(592., 3., 296.);
        assert_relative_eq!(hot[0], 2.0 * 2f64.powf(-0.7) * 3.);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(BroadeningGrid::new(&[1.0, 2.0], &[0.5], 0.2).is_err());
        assert!(BroadeningGrid::new(&[], &[], 0.2).is_err());
    }
}
