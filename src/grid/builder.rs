//! Builders for the lower-state-energy and broadening-parameter grids.

use crate::error::OpacityError;

/// Energy grid spacing (cm⁻¹) for a given Boltzmann-weight contrast.
///
/// Between adjacent grid points the relative Boltzmann weight at `tmax`
/// changes by `interval_contrast` orders of magnitude:
/// `dE = c ln(10) T_max / (hc/k)`.
pub fn compute_delta_elower(tmax: f64, interval_contrast: f64, hcperk: f64) -> f64 {
    interval_contrast * std::f64::consts::LN_10 * tmax / hcperk
}

/// Lower-state-energy grid at the spacing of [`compute_delta_elower`].
///
/// The grid starts at `min(elower)` and has at least two points beyond
/// `max(elower)`, so rounding in the bin search never lands a line past the
/// last interval.
pub fn make_elower_grid(
    tmax: f64,
    elower: &[f64],
    interval_contrast: f64,
    hcperk: f64,
) -> Result<Vec<f64>, OpacityError> {
    let (min_elower, max_elower) = finite_bounds("elower", elower)?;
    if !(tmax.is_finite() && tmax > 0.) {
        return Err(OpacityError::OutOfRange {
            name: "tmax",
            value: tmax,
        });
    }
    if !(interval_contrast.is_finite() && interval_contrast > 0.) {
        return Err(OpacityError::OutOfRange {
            name: "interval_contrast",
            value: interval_contrast,
        });
    }

    let de = compute_delta_elower(tmax, interval_contrast, hcperk);
    let mut num_grid = ((max_elower - min_elower) / de).floor() as usize + 3;
    // The division can round down across an integer
    if min_elower + de * (num_grid - 2) as f64 <= max_elower {
        num_grid += 1;
    }
    Ok((0..num_grid)
        .map(|i| min_elower + de * i as f64)
        .collect())
}

/// Log-spaced grid covering `values` where adjacent points differ by a factor
/// of exactly `10^resolution`.
///
/// All values must be positive. The grid starts at `min(values)` and its last
/// point is beyond `max(values)`.
pub fn ditgrid_log_interval(values: &[f64], resolution: f64) -> Result<Vec<f64>, OpacityError> {
    let (min_value, max_value) = finite_bounds("log interval", values)?;
    check_resolution(resolution)?;
    if min_value <= 0. {
        return Err(OpacityError::OutOfRange {
            name: "log interval grid input",
            value: min_value,
        });
    }

    let num_grid = ((max_value / min_value).log10() / resolution).floor() as usize + 2;
    Ok((0..num_grid)
        .map(|i| min_value * 10f64.powf(resolution * i as f64))
        .collect())
}

/// Linearly spaced grid with step `resolution` covering `values`.
///
/// A set of identical values still gets two distinct points, `[x, x + step]`,
/// so the interpolation interval never degenerates.
pub fn ditgrid_linear_interval(values: &[f64], resolution: f64) -> Result<Vec<f64>, OpacityError> {
    let (min_value, max_value) = finite_bounds("linear interval", values)?;
    check_resolution(resolution)?;

    let num_grid = ((max_value - min_value) / resolution).floor() as usize + 2;
    Ok((0..num_grid)
        .map(|i| min_value + resolution * i as f64)
        .collect())
}

fn check_resolution(resolution: f64) -> Result<(), OpacityError> {
    if resolution.is_finite() && resolution > 0. {
        Ok(())
    } else {
        Err(OpacityError::OutOfRange {
            name: "dit_grid_resolution",
            value: resolution,
        })
    }
}

/// Minimum and maximum of a nonempty, finite slice.
fn finite_bounds(name: &'static str, values: &[f64]) -> Result<(f64, f64), OpacityError> {
    if values.is_empty() {
        return Err(OpacityError::EmptyLineList);
    }
    if let Some(&value) = values.iter().find(|v| !v.is_finite()) {
        return Err(OpacityError::OutOfRange { name, value });
    }
    Ok(values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        }))
}
