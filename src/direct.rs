//! Line-by-line cross sections.
//!
//! Every line's Voigt profile is evaluated at every grid point. That's
//! `O(lines x grid)`, far too slow for real line lists, but exact up to the
//! Faddeeva approximation, which makes it the reference the LSD methods are
//! checked against.

use rayon::prelude::*;

use crate::config::PhysicalConstants;
use crate::error::OpacityError;
use crate::grid::WavenumberGrid;
use crate::lines::{normalized_doppler_sigma, LineList};
use crate::opacity::check_layer;
use crate::spectrum::voigt_profile;

/// Cross section (cm²/molecule) at temperature `t` (K) and pressure `p`
/// (bar) by direct summation over lines.
///
/// Profiles are evaluated in grid-sample units, `q = R ln(nu / nu_line)`,
/// with the same normalized Doppler and Lorentz widths the LSD methods use,
/// so the comparison isolates the binning error. The Lorentz width includes
/// natural broadening.
pub fn xsvector_direct(
    lines: &LineList,
    nu_grid: &WavenumberGrid,
    t: f64,
    p: f64,
    qt: f64,
    molmass: f64,
    constants: &PhysicalConstants,
) -> Result<Vec<f64>, OpacityError> {
    check_layer(t, p)?;
    if !(qt.is_finite() && qt > 0.) {
        return Err(OpacityError::PartitionFunction {
            temperature: t,
            reason: format!("ratio must be positive and finite, got {qt}"),
        });
    }
    if !(molmass.is_finite() && molmass > 0.) {
        return Err(OpacityError::OutOfRange {
            name: "molmass",
            value: molmass,
        });
    }

    let resolution = nu_grid.resolution();
    let nsigma_d = normalized_doppler_sigma(t, molmass, resolution, constants);
    let strength = lines.line_strength(t, qt, constants);
    let ngamma: Vec<f64> = lines
        .gamma_lorentz(t, p, constants)
        .iter()
        .zip(lines.nu_lines())
        .map(|(gamma, nu)| gamma * resolution / nu)
        .collect();

    Ok(nu_grid
        .values()
        .par_iter()
        .map(|&nu| {
            let density: f64 = lines
                .nu_lines()
                .iter()
                .zip(&strength)
                .zip(&ngamma)
                .map(|((&nu_line, &s), &gamma)| {
                    let q = resolution * (nu / nu_line).ln();
                    s * voigt_profile(q, nsigma_d, gamma)
                })
                .sum();
            density * resolution / nu
        })
        .collect())
}
