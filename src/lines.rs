//! Line-list data and per-line physics.
//!
//! The line list is owned by an external database reader; this crate only
//! reads it. Likewise the partition function is an opaque collaborator reached
//! through [`PartitionFunction`].

use log::warn;

use crate::config::PhysicalConstants;
use crate::error::OpacityError;
use crate::grid::WavenumberGrid;
use crate::lsd::g_bias;

/// Ratio of the partition function at `T` to its value at the temperature
/// the line list is tabulated at, `Q(T)/Q(T0)`.
pub trait PartitionFunction: Sync {
    /// Evaluate the ratio at `temperature` in K.
    fn qr(&self, temperature: f64) -> Result<f64, OpacityError>;
}

impl<F> PartitionFunction for F
where
    F: Fn(f64) -> Result<f64, OpacityError> + Sync,
{
    fn qr(&self, temperature: f64) -> Result<f64, OpacityError> {
        self(temperature)
    }
}

/// A set of spectral lines, stored as parallel vectors.
#[derive(Debug, Clone)]
pub struct LineList {
    /// Line center wavenumber in cm⁻¹.
    nu_lines: Vec<f64>,
    /// Natural log of the line strength at the reference temperature, in
    /// ln(cm/molecule).
    logsij0: Vec<f64>,
    /// Lower-state energy in cm⁻¹.
    elower: Vec<f64>,
    /// Pressure-broadening HWHM at 1 bar and the broadening reference
    /// temperature, in cm⁻¹.
    gamma_ref: Vec<f64>,
    /// Temperature exponent of the pressure broadening.
    n_texp: Vec<f64>,
    /// Natural-broadening HWHM in cm⁻¹.
    gamma_natural: Vec<f64>,
    /// Isotope number of each line.
    isotope: Vec<u16>,
}

impl LineList {
    /// Create a line list from its columns. All slices must have the same,
    /// nonzero length, and all values must be finite. Every line is tagged as
    /// isotope 1.
    pub fn new(
        nu_lines: Vec<f64>,
        logsij0: Vec<f64>,
        elower: Vec<f64>,
        gamma_ref: Vec<f64>,
        n_texp: Vec<f64>,
        gamma_natural: Vec<f64>,
    ) -> Result<Self, OpacityError> {
        let num_lines = nu_lines.len();
        if num_lines == 0 {
            return Err(OpacityError::EmptyLineList);
        }

        let columns: [(&'static str, &[f64]); 6] = [
            ("nu_lines", &nu_lines),
            ("logsij0", &logsij0),
            ("elower", &elower),
            ("gamma_ref", &gamma_ref),
            ("n_texp", &n_texp),
            ("gamma_natural", &gamma_natural),
        ];
        for (name, column) in columns {
            if column.len() != num_lines {
                return Err(OpacityError::InconsistentInputs {
                    name,
                    expected: num_lines,
                    actual: column.len(),
                });
            }
            if let Some(&value) = column.iter().find(|v| !v.is_finite()) {
                return Err(OpacityError::OutOfRange { name, value });
            }
        }
        if let Some(&value) = nu_lines.iter().find(|&&nu| nu <= 0.) {
            return Err(OpacityError::OutOfRange {
                name: "nu_lines",
                value,
            });
        }
        if let Some(&value) = gamma_ref.iter().find(|&&g| g <= 0.) {
            return Err(OpacityError::OutOfRange {
                name: "gamma_ref",
                value,
            });
        }
        if let Some(&value) = gamma_natural.iter().find(|&&g| g < 0.) {
            return Err(OpacityError::OutOfRange {
                name: "gamma_natural",
                value,
            });
        }

        Ok(Self {
            nu_lines,
            logsij0,
            elower,
            gamma_ref,
            n_texp,
            gamma_natural,
            isotope: vec![1; num_lines],
        })
    }

    /// Replace the isotope tags.
    pub fn with_isotopes(mut self, isotope: Vec<u16>) -> Result<Self, OpacityError> {
        if isotope.len() != self.len() {
            return Err(OpacityError::InconsistentInputs {
                name: "isotope",
                expected: self.len(),
                actual: isotope.len(),
            });
        }
        self.isotope = isotope;
        Ok(self)
    }

    /// Number of lines.
    pub fn len(&self) -> usize {
        self.nu_lines.len()
    }

    /// Always false, since construction rejects empty lists.
    pub fn is_empty(&self) -> bool {
        self.nu_lines.is_empty()
    }

    /// Line centers in cm⁻¹.
    pub fn nu_lines(&self) -> &[f64] {
        &self.nu_lines
    }

    /// Log line strengths at the reference temperature.
    pub fn logsij0(&self) -> &[f64] {
        &self.logsij0
    }

    /// Lower-state energies in cm⁻¹.
    pub fn elower(&self) -> &[f64] {
        &self.elower
    }

    /// Reference pressure-broadening widths in cm⁻¹.
    pub fn gamma_ref(&self) -> &[f64] {
        &self.gamma_ref
    }

    /// Temperature exponents of the pressure broadening.
    pub fn n_texp(&self) -> &[f64] {
        &self.n_texp
    }

    /// Natural broadening widths in cm⁻¹.
    pub fn gamma_natural(&self) -> &[f64] {
        &self.gamma_natural
    }

    /// Isotope numbers.
    pub fn isotope(&self) -> &[u16] {
        &self.isotope
    }

    /// Distinct isotope numbers, sorted.
    pub fn distinct_isotopes(&self) -> Vec<u16> {
        let mut isotopes = self.isotope.clone();
        isotopes.sort_unstable();
        isotopes.dedup();
        isotopes
    }

    /// The lines whose centers fall on `grid` (bounds included).
    ///
    /// Lines outside are dropped with a warning. It's an error when none is
    /// left.
    pub fn within(&self, grid: &WavenumberGrid) -> Result<Self, OpacityError> {
        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| grid.contains(self.nu_lines[i]))
            .collect();
        let num_outside = self.len() - keep.len();
        if num_outside > 0 {
            let (first, last) = grid.bounds();
            warn!(
                "{num_outside} of {} lines fall outside the wavenumber grid [{first}, {last}] and are ignored",
                self.len()
            );
        }
        if keep.is_empty() {
            return Err(OpacityError::EmptyLineList);
        }
        if num_outside == 0 {
            return Ok(self.clone());
        }

        let pick = |column: &[f64]| -> Vec<f64> { keep.iter().map(|&i| column[i]).collect() };
        Ok(Self {
            nu_lines: pick(&self.nu_lines),
            logsij0: pick(&self.logsij0),
            elower: pick(&self.elower),
            gamma_ref: pick(&self.gamma_ref),
            n_texp: pick(&self.n_texp),
            gamma_natural: pick(&self.gamma_natural),
            isotope: keep.iter().map(|&i| self.isotope[i]).collect(),
        })
    }

    /// Line strengths at the reference temperature, in cm/molecule.
    pub fn line_strength_ref(&self) -> Vec<f64> {
        self.logsij0.iter().map(|s| s.exp()).collect()
    }

    /// Line strengths at temperature `t` (K), given the partition function
    /// ratio `qt = Q(t)/Q(T0)`.
    pub fn line_strength(&self, t: f64, qt: f64, constants: &PhysicalConstants) -> Vec<f64> {
        self.logsij0
            .iter()
            .zip(&self.nu_lines)
            .zip(&self.elower)
            .map(|((&logsij0, &nu), &elower)| {
                line_strength(t, logsij0, nu, elower, qt, constants.tref_original, constants.hcperk)
            })
            .collect()
    }

    /// Lorentz HWHM (cm⁻¹) of every line at temperature `t` (K) and pressure
    /// `p` (bar): pressure broadening plus natural broadening.
    pub fn gamma_lorentz(&self, t: f64, p: f64, constants: &PhysicalConstants) -> Vec<f64> {
        self.gamma_ref
            .iter()
            .zip(&self.n_texp)
            .zip(&self.gamma_natural)
            .map(|((&gamma_ref, &n_texp), &gamma_natural)| {
                gamma_pressure(t, p, gamma_ref, n_texp, constants.tref_broadening) + gamma_natural
            })
            .collect()
    }

    /// Reference pressure widths normalized by the local grid spacing
    /// `nu / resolution`, i.e. in units of grid samples.
    pub fn normalized_gamma_ref(&self, resolution: f64) -> Vec<f64> {
        self.gamma_ref
            .iter()
            .zip(&self.nu_lines)
            .map(|(gamma, nu)| gamma * resolution / nu)
            .collect()
    }
}

/// Line strength at temperature `t` from its value `exp(logsij0)` at `tref`.
///
/// `qt` is the partition function ratio `Q(t)/Q(tref)`. The stimulated
/// emission factor uses the `expm1` form.
pub fn line_strength(
    t: f64,
    logsij0: f64,
    nu: f64,
    elower: f64,
    qt: f64,
    tref: f64,
    hcperk: f64,
) -> f64 {
    let boltzmann = -hcperk * elower * (1. / t - 1. / tref);
    (logsij0 + boltzmann).exp() * g_bias(nu, t, tref, hcperk) / qt
}

/// Pressure broadening HWHM at temperature `t` (K) and pressure `p` (bar).
pub fn gamma_pressure(t: f64, p: f64, gamma_ref: f64, n_texp: f64, tref_broadening: f64) -> f64 {
    gamma_ref * (t / tref_broadening).powf(-n_texp) * p
}

/// Doppler standard deviation normalized by the grid spacing.
///
/// On a log-spaced grid of resolution `resolution` the Doppler width in grid
/// samples is the same for every line: `R sqrt(k T / (M m_u)) / c`, where
/// `molmass` is the molecular mass in atomic mass units.
pub fn normalized_doppler_sigma(
    t: f64,
    molmass: f64,
    resolution: f64,
    constants: &PhysicalConstants,
) -> f64 {
    resolution * f64::sqrt(constants.kb * t / (molmass * constants.m_u)) / constants.c
}
