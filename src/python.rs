//! Python bindings
//!
//! NOTE: this module is the interface between Rust and Python. The real work
//! happens in the other modules, and they do not use `pyo3`, it's only used
//! here.

use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use log::{debug, info};
use ndarray::{Array2, ArrayView1, Axis};
use numpy::prelude::*;
use numpy::{PyArray1, PyArray2, PyReadonlyArray1, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rayon::prelude::*;

use crate::config::{DiffMode, PremoditConfig, ReferenceTemperatures, TemperatureRange};
use crate::error::OpacityError;
use crate::grid::WavenumberGrid;
use crate::lines::LineList;
use crate::opacity::Premodit;
use crate::spectrum::convolve_rigid_rotation;

impl From<OpacityError> for PyErr {
    fn from(e: OpacityError) -> Self {
        PyValueError::new_err(e.to_string())
    }
}

/// PreMODIT opacity calculator for one line list on one wavenumber grid.
///
/// The LSD is built once in the constructor; `xsvector` and `xsmatrix` then
/// evaluate cross sections in cm²/molecule.
#[pyclass(name = "OpaPremodit", frozen)]
struct OpaPremodit {
    inner: Premodit,
}

#[pymethods]
impl OpaPremodit {
    /// Build the LSD.
    ///
    /// `nu_grid` must be log spaced, in cm⁻¹. The line columns share one
    /// length. `diffmode` is 0, 1 or 2. `trange` is the `(low, high)`
    /// temperature range in K the LSD will be queried at.
    #[new]
    #[pyo3(signature = (nu_grid, nu_lines, logsij0, elower, gamma_ref, n_texp, molmass, gamma_natural=None, diffmode=0, trange=(500., 1500.), dit_grid_resolution=0.2, elower_contrast=0.1, manual_reference=None, lowpass_compress_rate=None))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        py: Python<'_>,
        nu_grid: PyReadonlyArray1<'_, f64>,
        nu_lines: PyReadonlyArray1<'_, f64>,
        logsij0: PyReadonlyArray1<'_, f64>,
        elower: PyReadonlyArray1<'_, f64>,
        gamma_ref: PyReadonlyArray1<'_, f64>,
        n_texp: PyReadonlyArray1<'_, f64>,
        molmass: f64,
        gamma_natural: Option<PyReadonlyArray1<'_, f64>>,
        diffmode: u8,
        trange: (f64, f64),
        dit_grid_resolution: f64,
        elower_contrast: f64,
        manual_reference: Option<(f64, f64)>,
        lowpass_compress_rate: Option<f64>,
    ) -> PyResult<Self> {
        let gamma_natural = match gamma_natural {
            Some(g) => g.as_slice()?.to_vec(),
            None => vec![0.; nu_lines.len()],
        };
        let lines = LineList::new(
            nu_lines.as_slice()?.to_vec(),
            logsij0.as_slice()?.to_vec(),
            elower.as_slice()?.to_vec(),
            gamma_ref.as_slice()?.to_vec(),
            n_texp.as_slice()?.to_vec(),
            gamma_natural,
        )?;
        let grid = WavenumberGrid::from_values(nu_grid.as_slice()?.to_vec())?;
        let config = PremoditConfig {
            diffmode: DiffMode::try_from(diffmode)?,
            trange: TemperatureRange::new(trange.0, trange.1)?,
            dit_grid_resolution,
            elower_contrast,
            manual_reference: manual_reference.map(|(tref, twt)| ReferenceTemperatures { tref, twt }),
            lowpass_compress_rate,
            ..Default::default()
        };
        debug!("building PreMODIT LSD for {} lines", lines.len());

        let inner = py.allow_threads(|| Premodit::new(&lines, grid, molmass, config))?;
        Ok(Self { inner })
    }

    /// Cross section at temperature `t` (K) and pressure `p` (bar), given
    /// the partition function ratio `qt`.
    fn xsvector<'py>(
        &self,
        py: Python<'py>,
        t: f64,
        p: f64,
        qt: f64,
    ) -> PyResult<Bound<'py, PyArray1<f64>>> {
        let xs = py.allow_threads(|| self.inner.xsvector(t, p, qt))?;
        Ok(xs.to_pyarray(py))
    }

    /// Cross sections for every layer, shape (`num_layers`, `num_nu`).
    ///
    /// `temperature`, `pressure` and `qt` all have shape (`num_layers`, ).
    ///
    /// The number of worker threads is controlled by `num_threads`. It must
    /// be a positive integer, or `None` to automatically choose the number of
    /// threads.
    #[pyo3(signature = (temperature, pressure, qt, num_threads=None))]
    fn xsmatrix<'py>(
        &self,
        py: Python<'py>,
        temperature: PyReadonlyArray1<'_, f64>,
        pressure: PyReadonlyArray1<'_, f64>,
        qt: PyReadonlyArray1<'_, f64>,
        num_threads: Option<usize>,
    ) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let temperature = temperature.as_slice()?;
        let pressure = pressure.as_slice()?;
        let qt = qt.as_slice()?;
        let num_layers = temperature.len();
        for (name, len) in [("pressure", pressure.len()), ("qt", qt.len())] {
            if len != num_layers {
                return Err(OpacityError::InconsistentInputs {
                    name,
                    expected: num_layers,
                    actual: len,
                }
                .into());
            }
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.unwrap_or(0))
            .build()
            .map_err(|e| PyValueError::new_err(e.to_string()))?;

        // How many layers have finished, and whether to stop early
        let num_completed = AtomicUsize::new(0);
        let cancelled = AtomicBool::new(false);
        let mut results = Vec::new();

        info!("Computing cross sections for {num_layers} layers");

        pool.in_place_scope(|s| -> Result<(), PyErr> {
            s.spawn(|_| {
                (0..num_layers)
                    .into_par_iter()
                    .map(|layer| -> Result<Vec<f64>, Cancellable> {
                        if cancelled.load(Ordering::Relaxed) {
                            return Err(Cancellable::Cancelled);
                        }
                        Ok(self
                            .inner
                            .xsvector(temperature[layer], pressure[layer], qt[layer])?)
                    })
                    .inspect(|_| {
                        num_completed.fetch_add(1, Ordering::Relaxed);
                    })
                    .collect_into_vec(&mut results);
            });

            // The layers run in the pool; this thread watches for Ctrl-C
            while !cancelled.load(Ordering::Relaxed) {
                if let Err(e) = py.check_signals() {
                    cancelled.store(true, Ordering::Relaxed);
                    return Err(e);
                }
                let num_completed = num_completed.load(Ordering::Relaxed);
                debug!("Completed {num_completed}/{num_layers} layers");
                if num_completed == num_layers {
                    break;
                }
                py.allow_threads(|| std::thread::sleep(Duration::from_millis(200)));
            }
            Ok(())
        })?;

        let mut output = Array2::zeros((num_layers, self.inner.nu_grid().len()));
        for (layer, xs) in results.into_iter().enumerate() {
            let xs = xs?;
            output
                .index_axis_mut(Axis(0), layer)
                .assign(&ArrayView1::from(xs.as_slice()));
        }
        Ok(output.to_pyarray(py))
    }

    #[getter]
    fn nu_grid<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.nu_grid().values().to_pyarray(py)
    }

    #[getter]
    fn elower_grid<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.elower_grid().to_pyarray(py)
    }

    #[getter]
    fn tref(&self) -> f64 {
        self.inner.reference_temperatures().tref
    }

    #[getter]
    fn twt(&self) -> f64 {
        self.inner.reference_temperatures().twt
    }

    #[getter]
    fn num_lines(&self) -> usize {
        self.inner.num_lines()
    }
}

/// A layer either fails on its inputs or is abandoned after a signal.
enum Cancellable {
    Failed(OpacityError),
    Cancelled,
}

impl From<OpacityError> for Cancellable {
    fn from(e: OpacityError) -> Self {
        Cancellable::Failed(e)
    }
}

impl From<Cancellable> for PyErr {
    fn from(e: Cancellable) -> Self {
        match e {
            Cancellable::Failed(e) => e.into(),
            Cancellable::Cancelled => PyValueError::new_err("computation cancelled"),
        }
    }
}

/// Rigid-rotation broadening of a spectrum on a log-spaced grid of
/// resolution `resolution`. `vsini` is in km/s; `u1` and `u2` are the
/// quadratic limb-darkening coefficients.
#[pyfunction]
fn rigid_rotation<'py>(
    py: Python<'py>,
    resolution: f64,
    f0: PyReadonlyArray1<'_, f64>,
    vsini: f64,
    u1: f64,
    u2: f64,
) -> PyResult<Bound<'py, PyArray1<f64>>> {
    let f = convolve_rigid_rotation(resolution, f0.as_slice()?, vsini, u1, u2)?;
    Ok(f.to_pyarray(py))
}

/// A Python module implemented in Rust.
#[pymodule]
fn premodit(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pyo3_log::init();

    m.add_class::<OpaPremodit>()?;
    m.add_function(wrap_pyfunction!(rigid_rotation, m)?)?;
    Ok(())
}
