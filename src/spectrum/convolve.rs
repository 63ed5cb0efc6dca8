//! FFT convolution of the unbiased LSD with per-bin broadening kernels.
//!
//! The convolution is linear (not circular): signal and kernel are zero
//! padded to `N + L - 1` samples, multiplied in the Fourier domain, and the
//! result trimmed by `(L - 1) / 2` samples at the front and to `N` samples at
//! the back.

use std::fmt;
use std::sync::Arc;

use ndarray::ArrayView2;
use num_complex::Complex64;
use rayon::prelude::*;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use super::voigt::voigt_kernel;
use crate::error::OpacityError;

/// Forward and inverse real FFT plans for convolving an `N`-sample signal
/// with kernels of length `2 * half_width + 1`.
///
/// Plans are built once and shared between threads.
#[derive(Clone)]
pub struct FftConvolver {
    num_nu: usize,
    half_width: usize,
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
}

impl fmt::Debug for FftConvolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftConvolver")
            .field("num_nu", &self.num_nu)
            .field("half_width", &self.half_width)
            .field("fft_len", &self.fft_len())
            .finish_non_exhaustive()
    }
}

impl FftConvolver {
    /// Plan transforms for signals of `num_nu` samples.
    pub fn new(num_nu: usize, half_width: usize) -> Result<Self, OpacityError> {
        if num_nu == 0 {
            return Err(OpacityError::InvalidConfig(
                "cannot convolve an empty signal".into(),
            ));
        }
        let fft_len = num_nu + 2 * half_width;
        let mut planner = RealFftPlanner::<f64>::new();
        Ok(Self {
            num_nu,
            half_width,
            forward: planner.plan_fft_forward(fft_len),
            inverse: planner.plan_fft_inverse(fft_len),
        })
    }

    /// Number of signal samples.
    pub fn num_nu(&self) -> usize {
        self.num_nu
    }

    /// Kernel half width `h`.
    pub fn half_width(&self) -> usize {
        self.half_width
    }

    /// Odd kernel length `L = 2h + 1`.
    pub fn kernel_len(&self) -> usize {
        2 * self.half_width + 1
    }

    /// Padded transform length `N + L - 1`.
    pub fn fft_len(&self) -> usize {
        self.num_nu + 2 * self.half_width
    }

    /// Zero-pad `values` to the transform length and transform.
    pub fn transform(&self, values: &[f64]) -> Result<Vec<Complex64>, OpacityError> {
        if values.len() > self.fft_len() {
            return Err(OpacityError::InconsistentInputs {
                name: "convolution input",
                expected: self.fft_len(),
                actual: values.len(),
            });
        }
        let mut input = self.forward.make_input_vec();
        input[..values.len()].copy_from_slice(values);
        let mut output = self.forward.make_output_vec();
        self.forward.process(&mut input, &mut output)?;
        Ok(output)
    }

    /// Inverse-transform a product spectrum, normalize, and trim it to the
    /// signal samples.
    pub fn inverse_trimmed(&self, mut spectrum: Vec<Complex64>) -> Result<Vec<f64>, OpacityError> {
        let fft_len = self.fft_len();
        if spectrum.len() != fft_len / 2 + 1 {
            return Err(OpacityError::InconsistentInputs {
                name: "convolution spectrum",
                expected: fft_len / 2 + 1,
                actual: spectrum.len(),
            });
        }
        // Imaginary parts of the real-valued bins are rounding noise
        spectrum[0].im = 0.;
        if fft_len % 2 == 0 {
            if let Some(last) = spectrum.last_mut() {
                last.im = 0.;
            }
        }

        let mut output = self.inverse.make_output_vec();
        self.inverse.process(&mut spectrum, &mut output)?;
        let scale = 1. / fft_len as f64;
        Ok(output[self.half_width..self.half_width + self.num_nu]
            .iter()
            .map(|v| v * scale)
            .collect())
    }

    /// Convolve every column `b` of `columns` (shape `(num_nu, num_bins)`)
    /// with `kernel(b)` and sum the results.
    ///
    /// Columns that are entirely zero are skipped. Each `kernel(b)` must have
    /// the length [`kernel_len`](Self::kernel_len).
    pub fn convolve_columns<K>(
        &self,
        columns: ArrayView2<'_, f64>,
        kernel: K,
    ) -> Result<Vec<f64>, OpacityError>
    where
        K: Fn(usize) -> Vec<f64> + Sync,
    {
        if columns.nrows() != self.num_nu {
            return Err(OpacityError::InconsistentInputs {
                name: "lsd rows",
                expected: self.num_nu,
                actual: columns.nrows(),
            });
        }

        let spectra = (0..columns.ncols())
            .into_par_iter()
            .filter(|&b| columns.column(b).iter().any(|&v| v != 0.))
            .map(|b| -> Result<_, OpacityError> {
                let kernel = kernel(b);
                if kernel.len() != self.kernel_len() {
                    return Err(OpacityError::InconsistentInputs {
                        name: "kernel",
                        expected: self.kernel_len(),
                        actual: kernel.len(),
                    });
                }
                let column: Vec<f64> = columns.column(b).to_vec();
                let mut spectrum = self.transform(&column)?;
                let kernel = self.transform(&kernel)?;
                for (s, k) in spectrum.iter_mut().zip(&kernel) {
                    *s *= k;
                }
                Ok(spectrum)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut total = vec![Complex64::new(0., 0.); self.fft_len() / 2 + 1];
        for spectrum in &spectra {
            for (t, s) in total.iter_mut().zip(spectrum) {
                *t += s;
            }
        }
        self.inverse_trimmed(total)
    }
}

/// Linear convolution of `signal` with an odd-length `kernel`, trimmed to
/// the length of `signal` ("same" mode).
pub fn convolve_same(signal: &[f64], kernel: &[f64]) -> Result<Vec<f64>, OpacityError> {
    if kernel.len() % 2 == 0 {
        return Err(OpacityError::InvalidConfig(format!(
            "kernel length must be odd, got {}",
            kernel.len()
        )));
    }
    let convolver = FftConvolver::new(signal.len(), (kernel.len() - 1) / 2)?;
    let mut spectrum = convolver.transform(signal)?;
    let kernel = convolver.transform(kernel)?;
    for (s, k) in spectrum.iter_mut().zip(&kernel) {
        *s *= k;
    }
    convolver.inverse_trimmed(spectrum)
}

/// Cross section (cm²/molecule) from an unbiased LSD of shape
/// `(num_nu, num_broadening)`.
///
/// Column `b` is broadened with a Voigt kernel of normalized Doppler width
/// `nsigma_d` and normalized Lorentz width `ngamma[b]`. The kernels live in
/// grid-sample units, so the result is scaled by `R / nu` to turn it into a
/// density per cm⁻¹.
pub fn xsection_from_lsd(
    convolver: &FftConvolver,
    slsd: ArrayView2<'_, f64>,
    nsigma_d: f64,
    ngamma: &[f64],
    nu_grid: &[f64],
    resolution: f64,
) -> Result<Vec<f64>, OpacityError> {
    if ngamma.len() != slsd.ncols() {
        return Err(OpacityError::InconsistentInputs {
            name: "ngamma",
            expected: slsd.ncols(),
            actual: ngamma.len(),
        });
    }
    if nu_grid.len() != slsd.nrows() {
        return Err(OpacityError::InconsistentInputs {
            name: "nu_grid",
            expected: slsd.nrows(),
            actual: nu_grid.len(),
        });
    }

    let half_width = convolver.half_width();
    let mut xs = convolver.convolve_columns(slsd, |b| {
        voigt_kernel(half_width, nsigma_d, ngamma[b])
    })?;
    for (x, nu) in xs.iter_mut().zip(nu_grid) {
        *x *= resolution / nu;
    }
    Ok(xs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::Array2;

    #[test]
    fn same_mode_trims_half_kernel() {
        let signal: Vec<f64> = (0..11).map(|i| (i * i) as f64).collect();

        // Delta kernel reproduces the signal
        let out = convolve_same(&signal, &[0., 0., 1., 0., 0.]).unwrap();
        assert_eq!(out.len(), signal.len());
        for (o, s) in out.iter().zip(&signal) {
            assert_abs_diff_eq!(o, s, epsilon = 1e-10);
        }

        // Offset kernel shifts it by one sample
        let out = convolve_same(&signal, &[0., 0., 1.]).unwrap();
        assert_abs_diff_eq!(out[0], 0., epsilon = 1e-10);
        for i in 1..signal.len() {
            assert_abs_diff_eq!(out[i], signal[i - 1], epsilon = 1e-10);
        }

        assert!(convolve_same(&signal, &[0.5, 0.5]).is_err());
    }

    #[test]
    fn matches_direct_convolution() {
        let signal = [1., -2., 0.5, 3., 0., 0., 4.];
        let kernel = [0.1, 0.2, 0.4, 0.2, 0.1];
        let h = 2;
        let out = convolve_same(&signal, &kernel).unwrap();
        for i in 0..signal.len() {
            let mut expected = 0.;
            for (m, k) in kernel.iter().enumerate() {
                let j = i as isize + h - m as isize;
                if (0..signal.len() as isize).contains(&j) {
                    expected += signal[j as usize] * k;
                }
            }
            assert_abs_diff_eq!(out[i], expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn columns_sum_over_bins() {
        let convolver = FftConvolver::new(8, 3).unwrap();
        assert_eq!(convolver.kernel_len(), 7);
        assert_eq!(convolver.fft_len(), 14);

        let mut columns = Array2::zeros((8, 3));
        columns[[2, 0]] = 1.;
        columns[[5, 2]] = 2.;
        let out = convolver
            .convolve_columns(columns.view(), |b| {
                let mut k = vec![0.; 7];
                k[3] = (b + 1) as f64;
                k
            })
            .unwrap();
        assert_abs_diff_eq!(out[2], 1., epsilon = 1e-12);
        assert_abs_diff_eq!(out[5], 6., epsilon = 1e-12);
        assert_abs_diff_eq!(out.iter().sum::<f64>(), 7., epsilon = 1e-12);
    }

    #[test]
    fn single_line_cross_section_integrates_to_strength() {
        // Log grid: nu_i = nu_0 exp(i / R)
        let num_nu = 400;
        let resolution = 2.0e5;
        let nu_grid: Vec<f64> = (0..num_nu)
            .map(|i| 4000. * (i as f64 / resolution).exp())
            .collect();
        let convolver = FftConvolver::new(num_nu, num_nu - 1).unwrap();

        let mut slsd = Array2::zeros((num_nu, 1));
        slsd[[200, 0]] = 1e-20;
        let xs =
            xsection_from_lsd(&convolver, slsd.view(), 2.0, &[0.5], &nu_grid, resolution).unwrap();

        let area: f64 = xs
            .windows(2)
            .zip(nu_grid.windows(2))
            .map(|(x, nu)| 0.5 * (x[0] + x[1]) * (nu[1] - nu[0]))
            .sum();
        assert_relative_eq!(area, 1e-20, max_relative = 1e-2);
    }
}
