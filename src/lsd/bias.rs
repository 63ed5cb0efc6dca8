//! Biasing and unbiasing of the line-shape density.
//!
//! The LSD stores line strengths at `tref`, binned with energy weights chosen
//! at `twt`. At query time the energy axis is contracted with the Boltzmann
//! bias `f_bias(E_j, T)` (and powers of `1/T - 1/Twt` for the expanded modes),
//! then the wavenumber axis is corrected for stimulated emission with
//! `g_bias(nu, T)` and normalized by the partition function ratio.

use ndarray::{Array1, Array2, Array3, Axis};
use num_complex::Complex64;

use crate::error::OpacityError;

/// Boltzmann population factor at `t` relative to `tref` for lower-state
/// energy `elower`.
#[inline]
pub fn f_bias(elower: f64, t: f64, tref: f64, hcperk: f64) -> f64 {
    f64::exp(log_f_bias(elower, t, tref, hcperk))
}

/// Natural log of [`f_bias`].
#[inline]
pub fn log_f_bias(elower: f64, t: f64, tref: f64, hcperk: f64) -> f64 {
    -hcperk * elower * (1. / t - 1. / tref)
}

/// Stimulated emission factor at `t` relative to `tref` for wavenumber `nu`.
///
/// Written as a ratio of `expm1` terms: subtracting two near-equal
/// exponentials loses all precision as `hc nu / kT` goes to zero. For
/// `nu == 0` the ratio's limit, `tref / t`, is returned.
#[inline]
pub fn g_bias(nu: f64, t: f64, tref: f64, hcperk: f64) -> f64 {
    let den = f64::exp_m1(-hcperk * nu / tref);
    if den == 0. {
        return tref / t;
    }
    f64::exp_m1(-hcperk * nu / t) / den
}

/// Weights that contract the energy axis of the order-`k` LSD coefficient at
/// temperature `t`: `f_bias(E_j, t) * (1/t - 1/twt)^k`.
pub fn energy_weights(
    elower_grid: &[f64],
    t: f64,
    tref: f64,
    twt: f64,
    k: usize,
    hcperk: f64,
) -> Array1<f64> {
    let dt = (1. / t - 1. / twt).powi(k as i32);
    elower_grid
        .iter()
        .map(|&e| f_bias(e, t, tref, hcperk) * dt)
        .collect()
}

/// Everything the unbiasing step needs about one query.
#[derive(Debug, Clone, Copy)]
pub struct UnbiasQuery<'a> {
    /// Temperature in K.
    pub t: f64,
    /// Reference temperature of the LSD in K.
    pub tref: f64,
    /// Weighting temperature of the LSD in K.
    pub twt: f64,
    /// Partition function ratio `Q(t)/Q(T0)` against the temperature the
    /// line list is tabulated at.
    pub qt: f64,
    /// Wavenumber grid in cm⁻¹.
    pub nu_grid: &'a [f64],
    /// Lower-state-energy grid in cm⁻¹.
    pub elower_grid: &'a [f64],
    /// Second radiation constant in cm K.
    pub hcperk: f64,
}

/// Unbias the LSD coefficients at one temperature.
///
/// Each coefficient array has shape `(nu, broadening, elower)`. The result has
/// shape `(nu, broadening)`:
///
/// `S[i, b] = g_bias(nu_i) / qt * sum_k sum_j f_bias(E_j) dt^k lbd_k[i, b, j]`
pub fn unbiased_lsd(
    coefficients: &[Array3<f64>],
    query: &UnbiasQuery<'_>,
) -> Result<Array2<f64>, OpacityError> {
    let (num_nu, num_broad, num_elower) = check_coefficient_shapes(coefficients, query)?;

    let mut slsd = Array2::zeros((num_nu, num_broad));
    for (k, lbd) in coefficients.iter().enumerate() {
        let weights = energy_weights(
            query.elower_grid,
            query.t,
            query.tref,
            query.twt,
            k,
            query.hcperk,
        );
        // Contract the energy axis as one matrix-vector product
        let flat = lbd
            .view()
            .into_shape_with_order((num_nu * num_broad, num_elower))?;
        let contracted = flat.dot(&weights).into_shape_with_order((num_nu, num_broad))?;
        slsd += &contracted;
    }

    apply_nu_bias(&mut slsd, query);
    Ok(slsd)
}

/// Unbias lowpassed Fourier LSD coefficients.
///
/// The energy contraction is linear, so it's done on the Fourier coefficients
/// directly. The result, of shape `(frequency, broadening)`, still needs the
/// inverse transform and [`apply_nu_bias`].
pub fn unbiased_lsd_fourier(
    coefficients: &[Array3<Complex64>],
    query: &UnbiasQuery<'_>,
) -> Result<Array2<Complex64>, OpacityError> {
    let Some(first) = coefficients.first() else {
        return Err(OpacityError::InvalidConfig(
            "no LSD coefficients to unbias".into(),
        ));
    };
    let (num_freq, num_broad, num_elower) = first.dim();
    if num_elower != query.elower_grid.len() {
        return Err(OpacityError::InconsistentInputs {
            name: "elower_grid",
            expected: num_elower,
            actual: query.elower_grid.len(),
        });
    }

    let mut fourier = Array2::zeros((num_freq, num_broad));
    for (k, lbd) in coefficients.iter().enumerate() {
        let weights = energy_weights(
            query.elower_grid,
            query.t,
            query.tref,
            query.twt,
            k,
            query.hcperk,
        );
        for (mut row, lbd_row) in fourier.outer_iter_mut().zip(lbd.outer_iter()) {
            for (out, spectrum) in row.iter_mut().zip(lbd_row.outer_iter()) {
                *out += spectrum
                    .iter()
                    .zip(&weights)
                    .map(|(&value, &w)| value * w)
                    .sum::<Complex64>();
            }
        }
    }
    Ok(fourier)
}

/// Apply `g_bias(nu_i, t) / qt` along the wavenumber axis of an unbiased LSD.
pub fn apply_nu_bias(slsd: &mut Array2<f64>, query: &UnbiasQuery<'_>) {
    for (mut row, &nu) in slsd.axis_iter_mut(Axis(0)).zip(query.nu_grid) {
        let scale = g_bias(nu, query.t, query.tref, query.hcperk) / query.qt;
        row *= scale;
    }
}

fn check_coefficient_shapes(
    coefficients: &[Array3<f64>],
    query: &UnbiasQuery<'_>,
) -> Result<(usize, usize, usize), OpacityError> {
    let Some(first) = coefficients.first() else {
        return Err(OpacityError::InvalidConfig(
            "no LSD coefficients to unbias".into(),
        ));
    };
    let dim = first.dim();
    if let Some(other) = coefficients.iter().find(|c| c.dim() != dim) {
        return Err(OpacityError::InconsistentInputs {
            name: "lsd coefficient",
            expected: dim.0 * dim.1 * dim.2,
            actual: other.len(),
        });
    }
    if dim.0 != query.nu_grid.len() {
        return Err(OpacityError::InconsistentInputs {
            name: "nu_grid",
            expected: dim.0,
            actual: query.nu_grid.len(),
        });
    }
    if dim.2 != query.elower_grid.len() {
        return Err(OpacityError::InconsistentInputs {
            name: "elower_grid",
            expected: dim.2,
            actual: query.elower_grid.len(),
        });
    }
    Ok(dim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const HCPERK: f64 = 1.4387773538277202;

    #[test]
    fn f_bias_is_one_at_reference() {
        assert_eq!(f_bias(3000., 296., 296., HCPERK), 1.);
        let hot = f_bias(3000., 1500., 296., HCPERK);
        assert_relative_eq!(
            hot,
            (-HCPERK * 3000. * (1. / 1500. - 1. / 296.)).exp(),
            max_relative = 1e-14
        );
        assert!(hot > 1.);
    }

    #[test]
    fn g_bias_is_stable_at_small_wavenumber() {
        // Reference from the series expansion of expm1(-a)/expm1(-b):
        // (a/b) (1 - a/2 + a²/6) / (1 - b/2 + b²/6)
        let (t, tref) = (1500., 296.);
        for nu in [1e-12, 1e-9, 1e-6, 1e-4] {
            let a = HCPERK * nu / t;
            let b = HCPERK * nu / tref;
            let reference = (a / b) * (1. - a / 2. + a * a / 6.) / (1. - b / 2. + b * b / 6.);
            let g = g_bias(nu, t, tref, HCPERK);
            assert!(g.is_finite());
            assert_relative_eq!(g, reference, max_relative = 1e-10);
        }
        assert_relative_eq!(g_bias(0., t, tref, HCPERK), tref / t);
    }

    #[test]
    fn g_bias_matches_naive_form_at_large_wavenumber() {
        let (nu, t, tref) = (6050., 1200., 296.);
        let naive = (1. - (-HCPERK * nu / t).exp()) / (1. - (-HCPERK * nu / tref).exp());
        assert_relative_eq!(g_bias(nu, t, tref, HCPERK), naive, max_relative = 1e-14);
    }

    #[test]
    fn unbias_single_cell() {
        let nu_grid = [6000., 6001.];
        let elower_grid = [0., 1000.];
        let mut lbd = Array3::zeros((2, 1, 2));
        lbd[[1, 0, 1]] = 2.0;

        let query = UnbiasQuery {
            t: 1000.,
            tref: 296.,
            twt: 1000.,
            qt: 4.,
            nu_grid: &nu_grid,
            elower_grid: &elower_grid,
            hcperk: HCPERK,
        };
        let slsd = unbiased_lsd(&[lbd], &query).unwrap();
        let expected = 2.0 * f_bias(1000., 1000., 296., HCPERK) * g_bias(6001., 1000., 296., HCPERK)
            / 4.;
        assert_relative_eq!(slsd[[1, 0]], expected, max_relative = 1e-14);
        assert_eq!(slsd[[0, 0]], 0.);
    }

    #[test]
    fn higher_orders_vanish_at_twt() {
        let nu_grid = [6000.];
        let elower_grid = [0., 1000.];
        let lbd0 = Array3::from_elem((1, 1, 2), 1.0);
        let lbd1 = Array3::from_elem((1, 1, 2), 5.0);
        let query = UnbiasQuery {
            t: 800.,
            tref: 296.,
            twt: 800.,
            qt: 1.,
            nu_grid: &nu_grid,
            elower_grid: &elower_grid,
            hcperk: HCPERK,
        };
        let zeroth = unbiased_lsd(&[lbd0.clone()], &query).unwrap();
        let first = unbiased_lsd(&[lbd0, lbd1], &query).unwrap();
        assert_relative_eq!(zeroth[[0, 0]], first[[0, 0]], max_relative = 1e-14);
    }

    #[test]
    fn mismatched_grids_are_rejected() {
        let lbd = Array3::zeros((3, 1, 2));
        let query = UnbiasQuery {
            t: 800.,
            tref: 296.,
            twt: 800.,
            qt: 1.,
            nu_grid: &[1., 2.],
            elower_grid: &[0., 1.],
            hcperk: HCPERK,
        };
        assert!(unbiased_lsd(&[lbd], &query).is_err());
    }
}
