//! Line-shape density (LSD)
//!
//! Lines are scattered onto a coarse grid in (wavenumber, broadening,
//! lower-state energy) with two-point linear weights along every axis. The
//! result is built once per line list and grid and unbiased per temperature.

mod accumulate;
mod bias;
mod broadening;

pub use self::accumulate::{inc2d, initial_biased_lsd, lbd_coefficients, LsdLines};
pub use self::bias::{
    apply_nu_bias, energy_weights, f_bias, g_bias, log_f_bias, unbiased_lsd,
    unbiased_lsd_fourier, UnbiasQuery,
};
pub use self::broadening::{BroadeningGrid, BroadeningWeights};
