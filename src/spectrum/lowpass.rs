//! Lowpass compression of LSD columns along the wavenumber axis.
//!
//! The LSD is transformed column by column, the Fourier spectrum truncated to
//! `floor(num_freq / compress_rate)` bins, and the power in the discarded bins
//! (sum of `|X|²`) folded into the magnitude of the highest retained bin, whose
//! phase is dropped. This keeps the column's total power but not its shape at
//! high frequency; it's an approximation meant for LSDs much smoother than the
//! grid.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array2, Array3, ArrayView2, Axis};
use num_complex::Complex64;
use rayon::prelude::*;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::error::OpacityError;

/// Number of Fourier bins kept out of `num_freq` at `compress_rate`.
pub fn lowpass_len(num_freq: usize, compress_rate: f64) -> usize {
    ((num_freq as f64 / compress_rate).floor() as usize).clamp(1, num_freq.max(1))
}

/// Truncate one Fourier column to `num_kept` bins, folding the discarded
/// power into the last kept bin.
fn fold_column(full: &[Complex64], num_kept: usize) -> Vec<Complex64> {
    let mut kept = full[..num_kept].to_vec();
    if num_kept < full.len() {
        let discarded: f64 = full[num_kept..].iter().map(|c| c.norm_sqr()).sum();
        if let Some(last) = kept.last_mut() {
            *last = Complex64::new((last.norm_sqr() + discarded).sqrt(), 0.);
        }
    }
    kept
}

/// Lowpass a batch of Fourier columns of shape `(num_freq, num_columns)`.
pub fn lowpass(spectra: ArrayView2<'_, Complex64>, compress_rate: f64) -> Array2<Complex64> {
    let num_kept = lowpass_len(spectra.nrows(), compress_rate);
    let mut out = Array2::zeros((num_kept, spectra.ncols()));
    for (mut out_col, col) in out.columns_mut().into_iter().zip(spectra.columns()) {
        let full: Vec<Complex64> = col.to_vec();
        for (o, v) in out_col.iter_mut().zip(fold_column(&full, num_kept)) {
            *o = v;
        }
    }
    out
}

/// Real FFT plans of the wavenumber-grid length for lowpassed LSDs.
#[derive(Clone)]
pub struct LowpassTransform {
    num_nu: usize,
    num_kept: usize,
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
}

impl fmt::Debug for LowpassTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LowpassTransform")
            .field("num_nu", &self.num_nu)
            .field("num_kept", &self.num_kept)
            .finish_non_exhaustive()
    }
}

impl LowpassTransform {
    /// Plan transforms for a grid of `num_nu` points compressed by
    /// `compress_rate`.
    pub fn new(num_nu: usize, compress_rate: f64) -> Result<Self, OpacityError> {
        if num_nu < 2 {
            return Err(OpacityError::NonMonotonicGrid {
                name: "wavenumber",
                index: num_nu,
            });
        }
        if !(compress_rate.is_finite() && compress_rate >= 1.) {
            return Err(OpacityError::OutOfRange {
                name: "lowpass_compress_rate",
                value: compress_rate,
            });
        }
        let mut planner = RealFftPlanner::<f64>::new();
        Ok(Self {
            num_nu,
            num_kept: lowpass_len(num_nu / 2 + 1, compress_rate),
            forward: planner.plan_fft_forward(num_nu),
            inverse: planner.plan_fft_inverse(num_nu),
        })
    }

    /// Number of Fourier bins kept per column.
    pub fn num_kept(&self) -> usize {
        self.num_kept
    }

    /// Transform every `(broadening, elower)` column of an LSD coefficient of
    /// shape `(num_nu, num_broad, num_elower)` and lowpass it. The result has
    /// shape `(num_kept, num_broad, num_elower)`.
    pub fn fourier_lsd(&self, lbd: &Array3<f64>) -> Result<Array3<Complex64>, OpacityError> {
        let (num_nu, num_broad, num_elower) = lbd.dim();
        if num_nu != self.num_nu {
            return Err(OpacityError::InconsistentInputs {
                name: "lsd rows",
                expected: self.num_nu,
                actual: num_nu,
            });
        }

        let columns = (0..num_broad * num_elower)
            .into_par_iter()
            .map(|flat| -> Result<_, OpacityError> {
                let (b, e) = (flat / num_elower, flat % num_elower);
                let mut input: Vec<f64> = lbd.slice(ndarray::s![.., b, e]).to_vec();
                let mut output = self.forward.make_output_vec();
                self.forward.process(&mut input, &mut output)?;
                Ok(fold_column(&output, self.num_kept))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut fourier = Array3::zeros((self.num_kept, num_broad, num_elower));
        for (flat, column) in columns.into_iter().enumerate() {
            let (b, e) = (flat / num_elower, flat % num_elower);
            for (f, value) in column.into_iter().enumerate() {
                fourier[[f, b, e]] = value;
            }
        }
        Ok(fourier)
    }

    /// Inverse-transform lowpassed columns of shape `(num_kept, num_columns)`
    /// back to the grid, `(num_nu, num_columns)`.
    pub fn inverse_columns(
        &self,
        fourier: ArrayView2<'_, Complex64>,
    ) -> Result<Array2<f64>, OpacityError> {
        if fourier.nrows() != self.num_kept {
            return Err(OpacityError::InconsistentInputs {
                name: "lowpassed rows",
                expected: self.num_kept,
                actual: fourier.nrows(),
            });
        }

        let num_freq = self.num_nu / 2 + 1;
        let scale = 1. / self.num_nu as f64;
        let columns = fourier
            .axis_iter(Axis(1))
            .into_par_iter()
            .map(|col| -> Result<_, OpacityError> {
                let mut spectrum = self.inverse.make_input_vec();
                for (s, v) in spectrum.iter_mut().zip(col.iter()) {
                    *s = *v;
                }
                spectrum[0].im = 0.;
                if self.num_nu % 2 == 0 {
                    spectrum[num_freq - 1].im = 0.;
                }
                let mut output = self.inverse.make_output_vec();
                self.inverse.process(&mut spectrum, &mut output)?;
                Ok(output)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Array2::zeros((self.num_nu, fourier.ncols()));
        for (mut out_col, column) in out.axis_iter_mut(Axis(1)).zip(columns) {
            for (o, v) in out_col.iter_mut().zip(column) {
                *o = v * scale;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn column(values: &[(f64, f64)]) -> Array2<Complex64> {
        Array2::from_shape_vec(
            (values.len(), 1),
            values.iter().map(|&(re, im)| Complex64::new(re, im)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn folds_discarded_power_into_last_kept_bin() {
        let spectra = column(&[(5., 0.), (1., 1.), (0., 2.), (1., 0.)]);
        let out = lowpass(spectra.view(), 2.);
        assert_eq!(out.dim(), (2, 1));
        // DC is untouched, phase of the last kept bin is dropped
        assert_eq!(out[[0, 0]], Complex64::new(5., 0.));
        assert_relative_eq!(out[[1, 0]].re, (2f64 + 4. + 1.).sqrt());
        assert_eq!(out[[1, 0]].im, 0.);

        let total_in: f64 = spectra.iter().map(|c| c.norm_sqr()).sum();
        let total_out: f64 = out.iter().map(|c| c.norm_sqr()).sum();
        assert_relative_eq!(total_in, total_out, max_relative = 1e-14);
    }

    #[test]
    fn unit_rate_keeps_everything() {
        let spectra = column(&[(5., 0.), (1., 1.), (0., 2.)]);
        assert_eq!(lowpass(spectra.view(), 1.), spectra);
        assert_eq!(lowpass_len(3, 100.), 1);
    }

    #[test]
    fn round_trip_without_compression() {
        let transform = LowpassTransform::new(16, 1.).unwrap();
        assert_eq!(transform.num_kept(), 9);

        let mut lbd = Array3::zeros((16, 2, 3));
        lbd[[3, 0, 1]] = 2.;
        lbd[[10, 1, 2]] = -0.5;
        lbd[[15, 1, 0]] = 1.25;
        let fourier = transform.fourier_lsd(&lbd).unwrap();
        assert_eq!(fourier.dim(), (9, 2, 3));

        for b in 0..2 {
            for e in 0..3 {
                let col = fourier.slice(ndarray::s![.., b..b + 1, e]);
                let back = transform.inverse_columns(col).unwrap();
                for i in 0..16 {
                    assert_abs_diff_eq!(back[[i, 0]], lbd[[i, b, e]], epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn compression_keeps_column_sum() {
        let transform = LowpassTransform::new(32, 4.).unwrap();
        assert_eq!(transform.num_kept(), 4);

        let mut lbd = Array3::zeros((32, 1, 1));
        for i in 0..32 {
            lbd[[i, 0, 0]] = (-((i as f64 - 15.) / 6.).powi(2)).exp();
        }
        let fourier = transform.fourier_lsd(&lbd).unwrap();
        let back = transform
            .inverse_columns(fourier.slice(ndarray::s![.., .., 0]))
            .unwrap();
        assert_relative_eq!(back.sum(), lbd.sum(), max_relative = 1e-12);
    }
}
