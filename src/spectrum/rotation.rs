//! Rigid-rotation broadening with quadratic limb darkening.
//!
//! The kernel is the numerator of the rotation profile in the velocity
//! variable `x = v / (v sin i)`:
//!
//! `H(x) = pi/2 u1 (1 - x²) - 2/3 sqrt(1 - x²) (-3 + 3 u1 + u2 + 2 u2 x²)`
//!
//! for `|x| < 1` and zero outside the stellar disk.

use super::convolve::convolve_same;
use crate::error::OpacityError;

/// Speed of light in km/s.
const C_KMS: f64 = 2.99792458e5;

/// Rotation kernel at `x` for limb-darkening coefficients `u1`, `u2`.
pub fn rotation_kernel(x: f64, u1: f64, u2: f64) -> f64 {
    let x2 = x * x;
    if x2 > 1. {
        return 0.;
    }
    let root = (1. - x2).sqrt();
    std::f64::consts::FRAC_PI_2 * u1 * (1. - x2)
        - 2. / 3. * root * (-3. + 3. * u1 + u2 + 2. * u2 * x2)
}

/// Partial derivatives of [`rotation_kernel`] with respect to `x`, `u1` and
/// `u2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationKernelJvp {
    /// dH/dx
    pub dx: f64,
    /// dH/du1
    pub du1: f64,
    /// dH/du2
    pub du2: f64,
}

impl RotationKernelJvp {
    /// Directional derivative along the tangent `(tx, tu1, tu2)`.
    pub fn apply(&self, tx: f64, tu1: f64, tu2: f64) -> f64 {
        self.dx * tx + self.du1 * tu1 + self.du2 * tu2
    }
}

/// Closed-form partial derivatives of [`rotation_kernel`].
///
/// All three are zero outside the disk. `dH/dx` diverges like
/// `1/sqrt(1 - x²)` at the limb, so it's also taken as zero on the boundary
/// `|x| = 1` itself, where the kernel has no derivative.
pub fn rotation_kernel_jvp(x: f64, u1: f64, u2: f64) -> RotationKernelJvp {
    let x2 = x * x;
    if x2 >= 1. {
        return RotationKernelJvp {
            dx: 0.,
            du1: 0.,
            du2: 0.,
        };
    }
    let root = (1. - x2).sqrt();
    let a = -3. + 3. * u1 + u2 + 2. * u2 * x2;
    RotationKernelJvp {
        dx: -std::f64::consts::PI * u1 * x + 2. / 3. * x * a / root - 8. / 3. * u2 * x * root,
        du1: -2. * root + std::f64::consts::FRAC_PI_2 * (1. - x2),
        du2: -2. / 3. * root * (1. + 2. * x2),
    }
}

/// Velocity grid of the rotation kernel in units of `vsini`.
///
/// On a log-spaced grid of resolution `resolution` one sample is
/// `c / resolution` km/s. The grid has `2h + 1` points, `h = floor(vsini /
/// dv) + 1`, so it always reaches past the limb on both sides.
pub fn dvgrid_rigid_rotation(resolution: f64, vsini: f64) -> Result<Vec<f64>, OpacityError> {
    if !(resolution.is_finite() && resolution > 0.) {
        return Err(OpacityError::OutOfRange {
            name: "resolution",
            value: resolution,
        });
    }
    if !(vsini.is_finite() && vsini > 0.) {
        return Err(OpacityError::OutOfRange {
            name: "vsini",
            value: vsini,
        });
    }
    let dv = C_KMS / resolution;
    let half_width = (vsini / dv).floor() as usize + 1;
    let h = half_width as f64;
    Ok((0..2 * half_width + 1)
        .map(|m| (m as f64 - h) * dv / vsini)
        .collect())
}

/// Apply rigid-rotation broadening to a spectrum `f0` on a log-spaced grid.
///
/// `vsini` is in km/s. The normalized kernel is applied in "same" mode, so
/// the output has the length of `f0`. `vsini == 0` returns the spectrum
/// unchanged.
pub fn convolve_rigid_rotation(
    resolution: f64,
    f0: &[f64],
    vsini: f64,
    u1: f64,
    u2: f64,
) -> Result<Vec<f64>, OpacityError> {
    if vsini == 0. {
        return Ok(f0.to_vec());
    }
    let x = dvgrid_rigid_rotation(resolution, vsini)?;
    let mut kernel: Vec<f64> = x.iter().map(|&x| rotation_kernel(x, u1, u2)).collect();
    let norm: f64 = kernel.iter().sum();
    if !(norm.is_finite() && norm > 0.) {
        return Err(OpacityError::InvalidConfig(format!(
            "rotation kernel has no positive weight (u1 = {u1}, u2 = {u2})"
        )));
    }
    kernel.iter_mut().for_each(|k| *k /= norm);
    convolve_same(f0, &kernel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn kernel_without_limb_darkening_is_semicircle() {
        for x in [0., 0.3, -0.8] {
            assert_relative_eq!(
                rotation_kernel(x, 0., 0.),
                2. * (1. - x * x).sqrt(),
                max_relative = 1e-14
            );
        }
        assert_eq!(rotation_kernel(1.2, 0.4, 0.2), 0.);
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let (u1, u2) = (0.45, 0.21);
        let eps = 1e-6;
        for x in [-0.9, -0.4, 0., 0.35, 0.75] {
            let jvp = rotation_kernel_jvp(x, u1, u2);
            let dx = (rotation_kernel(x + eps, u1, u2) - rotation_kernel(x - eps, u1, u2))
                / (2. * eps);
            let du1 = (rotation_kernel(x, u1 + eps, u2) - rotation_kernel(x, u1 - eps, u2))
                / (2. * eps);
            let du2 = (rotation_kernel(x, u1, u2 + eps) - rotation_kernel(x, u1, u2 - eps))
                / (2. * eps);
            assert_abs_diff_eq!(jvp.dx, dx, epsilon = 1e-6);
            assert_abs_diff_eq!(jvp.du1, du1, epsilon = 1e-7);
            assert_abs_diff_eq!(jvp.du2, du2, epsilon = 1e-7);
        }
    }

    #[test]
    fn derivatives_are_finite_at_and_beyond_the_limb() {
        for x in [-1., 1., 1.5, -3.] {
            let jvp = rotation_kernel_jvp(x, 0.4, 0.2);
            assert_eq!(jvp.apply(1., 1., 1.), 0.);
        }
        let inside = rotation_kernel_jvp(0.999999, 0.4, 0.2);
        assert!(inside.dx.is_finite());
    }

    #[test]
    fn velocity_grid_reaches_past_the_limb() {
        let x = dvgrid_rigid_rotation(1e5, 10.).unwrap();
        // dv = 2.998 km/s, h = 4
        assert_eq!(x.len(), 9);
        assert!(x[0] < -1. && x[8] > 1.);
        assert_eq!(x[4], 0.);
        assert!(dvgrid_rigid_rotation(1e5, -1.).is_err());
    }

    #[test]
    fn rotation_conserves_flux() {
        let f0: Vec<f64> = (0..200)
            .map(|i| 1. - 0.8 * (-((i as f64 - 100.) / 3.).powi(2)).exp())
            .collect();
        let f = convolve_rigid_rotation(1e5, &f0, 30., 0.5, 0.1).unwrap();
        assert_eq!(f.len(), f0.len());

        // The line gets shallower and wider but keeps its equivalent width
        let depth0: f64 = f0.iter().map(|v| 1. - v).sum();
        let depth: f64 = f.iter().skip(20).take(160).map(|v| 1. - v).sum();
        assert_relative_eq!(depth, depth0, max_relative = 1e-6);
        assert!(f[100] > f0[100]);

        assert_eq!(convolve_rigid_rotation(1e5, &f0, 0., 0.5, 0.1).unwrap(), f0);
        assert!(convolve_rigid_rotation(1e5, &f0, -5., 0.5, 0.1).is_err());
    }
}
