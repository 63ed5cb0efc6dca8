//! Wavenumber grid and the discrete grids the LSD is binned on.

mod builder;
mod index;

pub use self::builder::{
    compute_delta_elower, ditgrid_linear_interval, ditgrid_log_interval, make_elower_grid,
};
pub use self::index::{getix, getix_all, getix_boltzmann, BoltzmannMap, ElowerWeights, GridIndex};

use crate::error::OpacityError;
use log::warn;

/// Relative tolerance on the log spacing before a grid is reported as not
/// evenly log-spaced.
const ESLOG_TOLERANCE: f64 = 1e-6;

/// An immutable, strictly increasing wavenumber grid in cm⁻¹.
///
/// The grid is expected to be evenly spaced in `ln(nu)` (ESLOG), which makes
/// the Doppler width constant in units of grid samples.
#[derive(Debug, Clone, PartialEq)]
pub struct WavenumberGrid {
    nu: Vec<f64>,
    /// Spectral resolution `R = (N - 1) / ln(nu_max / nu_min)`.
    resolution: f64,
}

impl WavenumberGrid {
    /// Build an evenly log-spaced grid of `num_points` from `nu_min` to
    /// `nu_max` (both included).
    pub fn log_spaced(nu_min: f64, nu_max: f64, num_points: usize) -> Result<Self, OpacityError> {
        if !(nu_min.is_finite() && nu_min > 0.) {
            return Err(OpacityError::OutOfRange {
                name: "nu_min",
                value: nu_min,
            });
        }
        if !(nu_max.is_finite() && nu_max > nu_min) {
            return Err(OpacityError::OutOfRange {
                name: "nu_max",
                value: nu_max,
            });
        }
        if num_points < 2 {
            return Err(OpacityError::NonMonotonicGrid {
                name: "wavenumber",
                index: num_points,
            });
        }

        let (log_min, log_max) = (nu_min.ln(), nu_max.ln());
        let step = (log_max - log_min) / (num_points - 1) as f64;
        let mut nu: Vec<f64> = (0..num_points)
            .map(|i| f64::exp(log_min + step * i as f64))
            .collect();
        // Pin the end points so they're exactly what was asked for
        nu[0] = nu_min;
        nu[num_points - 1] = nu_max;

        Self::from_values(nu)
    }

    /// Wrap existing grid values, checking they're positive and strictly
    /// increasing. A grid that isn't evenly log-spaced is accepted with a
    /// warning, since the normalized Doppler width is then only approximate.
    pub fn from_values(nu: Vec<f64>) -> Result<Self, OpacityError> {
        if nu.len() < 2 {
            return Err(OpacityError::NonMonotonicGrid {
                name: "wavenumber",
                index: nu.len(),
            });
        }
        if let Some(index) = nu.iter().position(|v| !(v.is_finite() && *v > 0.)) {
            return Err(OpacityError::NonMonotonicGrid {
                name: "wavenumber",
                index,
            });
        }
        check_strictly_increasing("wavenumber", &nu)?;

        let num_points = nu.len();
        let resolution = (num_points - 1) as f64 / (nu[num_points - 1] / nu[0]).ln();

        let mean_step = 1. / resolution;
        let worst = nu
            .windows(2)
            .map(|w| ((w[1] / w[0]).ln() / mean_step - 1.).abs())
            .fold(0., f64::max);
        if worst > ESLOG_TOLERANCE {
            warn!(
                "wavenumber grid is not evenly log-spaced (worst relative step deviation {worst:.3e})"
            );
        }

        Ok(Self { nu, resolution })
    }

    /// Grid values in cm⁻¹.
    pub fn values(&self) -> &[f64] {
        &self.nu
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        self.nu.len()
    }

    /// Always false; a grid has at least two points.
    pub fn is_empty(&self) -> bool {
        self.nu.is_empty()
    }

    /// Spectral resolution `R`.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// First and last grid values.
    pub fn bounds(&self) -> (f64, f64) {
        (self.nu[0], self.nu[self.nu.len() - 1])
    }

    /// Whether `nu` lies within the grid (inclusive).
    pub fn contains(&self, nu: f64) -> bool {
        let (first, last) = self.bounds();
        (first..=last).contains(&nu)
    }
}

/// Fail with [`OpacityError::NonMonotonicGrid`] unless `values` has at least
/// two points and is strictly increasing.
pub(crate) fn check_strictly_increasing(
    name: &'static str,
    values: &[f64],
) -> Result<(), OpacityError> {
    if values.len() < 2 {
        return Err(OpacityError::NonMonotonicGrid {
            name,
            index: values.len(),
        });
    }
    match values.windows(2).position(|w| !(w[1] > w[0])) {
        Some(index) => Err(OpacityError::NonMonotonicGrid {
            name,
            index: index + 1,
        }),
        None => Ok(()),
    }
}
