//! PreMODIT cross sections
//!
//! [`Premodit`] bins a line list once into LSD coefficient arrays of shape
//! `(nu, broadening, elower)`, then evaluates cross sections at any (T, P)
//! by unbiasing the LSD and convolving it with one Voigt kernel per
//! broadening bin.


use log::{debug, info, warn};
use ndarray::{Array2, Array3};
use num_complex::Complex64;
use rayon::prelude::*;

use crate::config::{PremoditConfig, ReferenceTemperatures};
use crate::error::OpacityError;
use crate::grid::{getix_all, make_elower_grid, BoltzmannMap, ElowerWeights, WavenumberGrid};
use crate::lines::{line_strength, normalized_doppler_sigma, LineList, PartitionFunction};
use crate::lsd::{
    apply_nu_bias, lbd_coefficients, unbiased_lsd, unbiased_lsd_fourier, BroadeningGrid,
    LsdLines, UnbiasQuery,
};
use crate::spectrum::{xsection_from_lsd, FftConvolver, LowpassTransform};

/// How the LSD coefficients are kept between queries.
#[derive(Debug, Clone)]
enum LsdStore {
    /// Dense real coefficients.
    Direct(Vec<Array3<f64>>),
    /// Lowpassed Fourier coefficients along the wavenumber axis.
    Lowpassed {
        transform: LowpassTransform,
        coefficients: Vec<Array3<Complex64>>,
    },
}

/// A precomputed PreMODIT opacity calculator for one line list and
/// wavenumber grid.
///
/// Building is the expensive part. Once built the object is immutable, and
/// queries from many threads can share it.
#[derive(Debug, Clone)]
pub struct Premodit {
    nu_grid: WavenumberGrid,
    /// Molecular mass in atomic mass units.
    molmass: f64,
    config: PremoditConfig,
    reference: ReferenceTemperatures,
    elower_grid: Vec<f64>,
    broadening: BroadeningGrid,
    lsd: LsdStore,
    convolver: FftConvolver,
    num_lines: usize,
}

impl Premodit {
    /// Build the LSD for `lines` on `nu_grid`.
    ///
    /// `molmass` is the molecular mass in atomic mass units. Lines outside
    /// the grid are dropped with a warning. Natural broadening is not binned;
    /// only the pressure width enters the broadening grid.
    pub fn new(
        lines: &LineList,
        nu_grid: WavenumberGrid,
        molmass: f64,
        config: PremoditConfig,
    ) -> Result<Self, OpacityError> {
        config.validate()?;
        if !(molmass.is_finite() && molmass > 0.) {
            return Err(OpacityError::OutOfRange {
                name: "molmass",
                value: molmass,
            });
        }
        let reference = config.reference_temperatures();
        if reference.tref == reference.twt {
            return Err(OpacityError::InvalidConfig(format!(
                "tref and twt must differ, both are {} K",
                reference.tref
            )));
        }

        let isotopes = lines.distinct_isotopes();
        if isotopes.len() > 1 {
            warn!(
                "line list mixes isotopes {isotopes:?}, but a single partition function ratio is applied to all of them"
            );
        }
        let lines = lines.within(&nu_grid)?;
        let constants = config.constants;
        let resolution = nu_grid.resolution();

        // Energy grid, wide enough for the hottest temperature the LSD serves
        let tmax = config
            .trange
            .high
            .max(reference.twt)
            .max(reference.tref);
        let elower_grid = make_elower_grid(
            tmax,
            lines.elower(),
            config.elower_contrast,
            constants.hcperk,
        )?;
        debug!(
            "elower grid: {} points from {} to {} cm-1",
            elower_grid.len(),
            elower_grid[0],
            elower_grid[elower_grid.len() - 1]
        );

        // Strengths at tref, without the partition function
        let strength: Vec<f64> = lines
            .logsij0()
            .iter()
            .zip(lines.nu_lines())
            .zip(lines.elower())
            .map(|((&logsij0, &nu), &elower)| {
                line_strength(
                    reference.tref,
                    logsij0,
                    nu,
                    elower,
                    1.,
                    constants.tref_original,
                    constants.hcperk,
                )
            })
            .collect();

        let map = BoltzmannMap {
            hcperk: constants.hcperk,
            ttyp: reference.twt,
            tref: reference.tref,
        };
        let elower_weights: Vec<ElowerWeights> = lines
            .elower()
            .iter()
            .map(|&e| ElowerWeights::new(e, &elower_grid, &map))
            .collect();
        let nu_index = getix_all(lines.nu_lines(), nu_grid.values());
        let broadening = BroadeningGrid::new(
            &lines.normalized_gamma_ref(resolution),
            lines.n_texp(),
            config.dit_grid_resolution,
        )?;

        let shape = (nu_grid.len(), broadening.len(), elower_grid.len());
        let coefficients = lbd_coefficients(
            &LsdLines {
                strength: &strength,
                nu_index: &nu_index,
                elower: &elower_weights,
                broadening: broadening.line_weights(),
            },
            shape,
            config.diffmode,
        )?;

        let lsd = match config.lowpass_compress_rate {
            None => LsdStore::Direct(coefficients),
            Some(rate) => {
                let transform = LowpassTransform::new(nu_grid.len(), rate)?;
                let coefficients = coefficients
                    .iter()
                    .map(|lbd| transform.fourier_lsd(lbd))
                    .collect::<Result<Vec<_>, _>>()?;
                debug!(
                    "lowpassed LSD keeps {} of {} Fourier bins",
                    transform.num_kept(),
                    nu_grid.len() / 2 + 1
                );
                LsdStore::Lowpassed {
                    transform,
                    coefficients,
                }
            }
        };

        let half_width = config.kernel_half_width.unwrap_or(nu_grid.len() - 1);
        let convolver = FftConvolver::new(nu_grid.len(), half_width)?;

        info!(
            "PreMODIT LSD built for {} lines: {} nu x {} broadening x {} elower, {:?}, tref = {} K, twt = {} K",
            lines.len(),
            shape.0,
            shape.1,
            shape.2,
            config.diffmode,
            reference.tref,
            reference.twt
        );

        Ok(Self {
            nu_grid,
            molmass,
            config,
            reference,
            elower_grid,
            broadening,
            lsd,
            convolver,
            num_lines: lines.len(),
        })
    }

    /// Cross section (cm²/molecule) on the wavenumber grid at temperature `t`
    /// (K) and pressure `p` (bar), given the partition function ratio `qt`.
    ///
    /// Temperatures outside the configured range are evaluated, with a
    /// warning, since the LSD loses accuracy there.
    pub fn xsvector(&self, t: f64, p: f64, qt: f64) -> Result<Vec<f64>, OpacityError> {
        check_layer(t, p)?;
        let slsd = self.unbiased_lsd(t, qt)?;

        let constants = &self.config.constants;
        let resolution = self.nu_grid.resolution();
        let nsigma_d = normalized_doppler_sigma(t, self.molmass, resolution, constants);
        let ngamma = self
            .broadening
            .unbiased_ngamma_grid(t, p, constants.tref_broadening);

        xsection_from_lsd(
            &self.convolver,
            slsd.view(),
            nsigma_d,
            &ngamma,
            self.nu_grid.values(),
            resolution,
        )
    }

    /// The LSD unbiased to temperature `t`, of shape `(nu, broadening)`:
    /// line strengths at `t` binned on the wavenumber and broadening grids.
    pub fn unbiased_lsd(&self, t: f64, qt: f64) -> Result<Array2<f64>, OpacityError> {
        check_layer(t, 0.)?;
        if !(qt.is_finite() && qt > 0.) {
            return Err(OpacityError::PartitionFunction {
                temperature: t,
                reason: format!("ratio must be positive and finite, got {qt}"),
            });
        }
        if !self.config.trange.contains(t) {
            let range = self.config.trange;
            warn!(
                "T = {t} K is outside the LSD temperature range [{}, {}] K; accuracy degrades",
                range.low, range.high
            );
        }

        let query = UnbiasQuery {
            t,
            tref: self.reference.tref,
            twt: self.reference.twt,
            qt,
            nu_grid: self.nu_grid.values(),
            elower_grid: &self.elower_grid,
            hcperk: self.config.constants.hcperk,
        };
        match &self.lsd {
            LsdStore::Direct(coefficients) => unbiased_lsd(coefficients, &query),
            LsdStore::Lowpassed {
                transform,
                coefficients,
            } => {
                let fourier = unbiased_lsd_fourier(coefficients, &query)?;
                let mut slsd = transform.inverse_columns(fourier.view())?;
                apply_nu_bias(&mut slsd, &query);
                Ok(slsd)
            }
        }
    }

    /// [`xsvector`](Self::xsvector) with the partition function ratio taken
    /// from `qr`.
    pub fn xsvector_with<Q>(&self, t: f64, p: f64, qr: &Q) -> Result<Vec<f64>, OpacityError>
    where
        Q: PartitionFunction + ?Sized,
    {
        check_layer(t, p)?;
        self.xsvector(t, p, qr.qr(t)?)
    }

    /// Cross sections for many layers, shape `(layers, nu)`.
    ///
    /// Layers are evaluated in parallel against the same LSD.
    pub fn xsmatrix<Q>(
        &self,
        temperatures: &[f64],
        pressures: &[f64],
        qr: &Q,
    ) -> Result<Array2<f64>, OpacityError>
    where
        Q: PartitionFunction + ?Sized,
    {
        check_layers(temperatures, pressures)?;
        let rows = temperatures
            .par_iter()
            .zip(pressures)
            .map(|(&t, &p)| self.xsvector_with(t, p, qr))
            .collect::<Result<Vec<_>, _>>()?;
        self.stack_rows(rows)
    }

    /// Cross sections for many layers with precomputed partition function
    /// ratios, shape `(layers, nu)`.
    pub fn xsmatrix_with_qt(
        &self,
        temperatures: &[f64],
        pressures: &[f64],
        qts: &[f64],
    ) -> Result<Array2<f64>, OpacityError> {
        check_layers(temperatures, pressures)?;
        if qts.len() != temperatures.len() {
            return Err(OpacityError::InconsistentInputs {
                name: "qt",
                expected: temperatures.len(),
                actual: qts.len(),
            });
        }
        let rows = temperatures
            .par_iter()
            .zip(pressures)
            .zip(qts)
            .map(|((&t, &p), &qt)| self.xsvector(t, p, qt))
            .collect::<Result<Vec<_>, _>>()?;
        self.stack_rows(rows)
    }

    fn stack_rows(&self, rows: Vec<Vec<f64>>) -> Result<Array2<f64>, OpacityError> {
        let shape = (rows.len(), self.nu_grid.len());
        Ok(Array2::from_shape_vec(shape, rows.concat())?)
    }

    /// The wavenumber grid.
    pub fn nu_grid(&self) -> &WavenumberGrid {
        &self.nu_grid
    }

    /// Lower-state-energy grid in cm⁻¹.
    pub fn elower_grid(&self) -> &[f64] {
        &self.elower_grid
    }

    /// Spacing of the energy grid in cm⁻¹.
    pub fn delta_elower(&self) -> f64 {
        self.elower_grid[1] - self.elower_grid[0]
    }

    /// The broadening axis.
    pub fn broadening(&self) -> &BroadeningGrid {
        &self.broadening
    }

    /// The `(tref, twt)` pair the LSD was built at.
    pub fn reference_temperatures(&self) -> ReferenceTemperatures {
        self.reference
    }

    /// Build settings.
    pub fn config(&self) -> &PremoditConfig {
        &self.config
    }

    /// Molecular mass in atomic mass units.
    pub fn molmass(&self) -> f64 {
        self.molmass
    }

    /// Number of lines binned into the LSD.
    pub fn num_lines(&self) -> usize {
        self.num_lines
    }

    /// Dense LSD coefficient arrays `lbd_k`, or `None` when the LSD is kept
    /// lowpassed.
    pub fn lbd_coefficients(&self) -> Option<&[Array3<f64>]> {
        match &self.lsd {
            LsdStore::Direct(coefficients) => Some(coefficients.as_slice()),
            LsdStore::Lowpassed { .. } => None,
        }
    }
}

/// Temperature must be positive and pressure non-negative, both finite.
pub(crate) fn check_layer(t: f64, p: f64) -> Result<(), OpacityError> {
    if !(t.is_finite() && t > 0.) {
        return Err(OpacityError::OutOfRange {
            name: "temperature",
            value: t,
        });
    }
    if !(p.is_finite() && p >= 0.) {
        return Err(OpacityError::OutOfRange {
            name: "pressure",
            value: p,
        });
    }
    Ok(())
}

fn check_layers(temperatures: &[f64], pressures: &[f64]) -> Result<(), OpacityError> {
    if temperatures.len() != pressures.len() {
        return Err(OpacityError::InconsistentInputs {
            name: "pressures",
            expected: temperatures.len(),
            actual: pressures.len(),
        });
    }
    Ok(())
}
