//! MODIT: the LSD rebuilt for every query.
//!
//! Line strengths and widths are computed at the query temperature and
//! pressure and scattered into a 2-D (wavenumber, width) LSD on a width grid
//! made for that query. No bias is needed, so MODIT is exact in temperature,
//! at the cost of touching every line per query.

use log::debug;

use crate::config::PhysicalConstants;
use crate::error::OpacityError;
use crate::grid::{ditgrid_log_interval, getix, getix_all, GridIndex, WavenumberGrid};
use crate::lines::{normalized_doppler_sigma, LineList};
use crate::lsd::inc2d;
use crate::opacity::check_layer;
use crate::spectrum::{xsection_from_lsd, FftConvolver};

/// Default width grid resolution, as a log10 step.
const DEFAULT_DIT_GRID_RESOLUTION: f64 = 0.2;

/// A per-query LSD opacity calculator.
#[derive(Debug, Clone)]
pub struct Modit {
    lines: LineList,
    nu_grid: WavenumberGrid,
    /// Molecular mass in atomic mass units.
    molmass: f64,
    constants: PhysicalConstants,
    dit_grid_resolution: f64,
    nu_index: Vec<GridIndex>,
    convolver: FftConvolver,
}

impl Modit {
    /// Prepare MODIT for `lines` on `nu_grid`. Lines outside the grid are
    /// dropped with a warning.
    pub fn new(
        lines: &LineList,
        nu_grid: WavenumberGrid,
        molmass: f64,
        constants: PhysicalConstants,
    ) -> Result<Self, OpacityError> {
        if !(molmass.is_finite() && molmass > 0.) {
            return Err(OpacityError::OutOfRange {
                name: "molmass",
                value: molmass,
            });
        }
        let lines = lines.within(&nu_grid)?;
        let nu_index = getix_all(lines.nu_lines(), nu_grid.values());
        let convolver = FftConvolver::new(nu_grid.len(), nu_grid.len() - 1)?;
        Ok(Self {
            lines,
            nu_grid,
            molmass,
            constants,
            dit_grid_resolution: DEFAULT_DIT_GRID_RESOLUTION,
            nu_index,
            convolver,
        })
    }

    /// Use a different width grid resolution.
    pub fn with_dit_grid_resolution(mut self, resolution: f64) -> Result<Self, OpacityError> {
        if !(resolution.is_finite() && resolution > 0.) {
            return Err(OpacityError::OutOfRange {
                name: "dit_grid_resolution",
                value: resolution,
            });
        }
        self.dit_grid_resolution = resolution;
        Ok(self)
    }

    /// Cross section (cm²/molecule) at temperature `t` (K) and pressure `p`
    /// (bar), given the partition function ratio `qt`.
    pub fn xsvector(&self, t: f64, p: f64, qt: f64) -> Result<Vec<f64>, OpacityError> {
        check_layer(t, p)?;
        if !(qt.is_finite() && qt > 0.) {
            return Err(OpacityError::PartitionFunction {
                temperature: t,
                reason: format!("ratio must be positive and finite, got {qt}"),
            });
        }
        if p == 0. {
            // Zero widths can't go on a log grid; the spectrum is pure Doppler
            return self.xsvector_doppler(t, qt);
        }

        let resolution = self.nu_grid.resolution();
        let strength = self.lines.line_strength(t, qt, &self.constants);
        let ngamma: Vec<f64> = self
            .lines
            .gamma_lorentz(t, p, &self.constants)
            .iter()
            .zip(self.lines.nu_lines())
            .map(|(gamma, nu)| gamma * resolution / nu)
            .collect();

        let ngamma_grid = ditgrid_log_interval(&ngamma, self.dit_grid_resolution)?;
        let log_grid: Vec<f64> = ngamma_grid.iter().map(|g| g.ln()).collect();
        let gamma_index: Vec<GridIndex> = ngamma.iter().map(|g| getix(g.ln(), &log_grid)).collect();
        debug!("MODIT width grid at T = {t} K, P = {p} bar: {} bins", ngamma_grid.len());

        let lsd = inc2d(
            &strength,
            &self.nu_index,
            &gamma_index,
            (self.nu_grid.len(), ngamma_grid.len()),
        )?;
        let nsigma_d = normalized_doppler_sigma(t, self.molmass, resolution, &self.constants);
        xsection_from_lsd(
            &self.convolver,
            lsd.view(),
            nsigma_d,
            &ngamma_grid,
            self.nu_grid.values(),
            resolution,
        )
    }

    /// The zero-pressure case with only natural broadening, which may be
    /// zero, so every line shares one width bin.
    fn xsvector_doppler(&self, t: f64, qt: f64) -> Result<Vec<f64>, OpacityError> {
        let resolution = self.nu_grid.resolution();
        let strength = self.lines.line_strength(t, qt, &self.constants);
        // Mean natural width in grid samples
        let ngamma = self
            .lines
            .gamma_natural()
            .iter()
            .zip(self.lines.nu_lines())
            .map(|(gamma, nu)| gamma * resolution / nu)
            .sum::<f64>()
            / self.lines.len() as f64;

        let single = vec![GridIndex { index: 0, cont: 0. }; self.lines.len()];
        let lsd = inc2d(&strength, &self.nu_index, &single, (self.nu_grid.len(), 2))?;
        let nsigma_d = normalized_doppler_sigma(t, self.molmass, resolution, &self.constants);
        xsection_from_lsd(
            &self.convolver,
            lsd.view(),
            nsigma_d,
            &[ngamma, ngamma],
            self.nu_grid.values(),
            resolution,
        )
    }

    /// The wavenumber grid.
    pub fn nu_grid(&self) -> &WavenumberGrid {
        &self.nu_grid
    }
}
