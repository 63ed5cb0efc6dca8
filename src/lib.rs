//! Line-shape-density opacities
//!
//! Molecular cross sections from large line lists, computed with the
//! PreMODIT algorithm: lines are binned once into a line shape density (LSD)
//! over wavenumber, broadening and lower-state energy, and each (T, P) query
//! only unbiases the LSD and convolves it with a handful of Voigt kernels.
//!
//! [`Premodit`] is the main entry point. [`Modit`] rebuilds the LSD per query
//! and [`xsvector_direct`] sums every line, both useful as references.
//!
//! NOTE: the `python` feature adds the Python bindings. The real work happens
//! in the other modules, and they do not use `pyo3`.

pub mod config;
pub mod direct;
pub mod error;
pub mod grid;
pub mod lines;
pub mod lsd;
pub mod modit;
pub mod opacity;
pub mod spectrum;

#[cfg(feature = "python")]
mod python;

pub use config::{DiffMode, PhysicalConstants, PremoditConfig, ReferenceTemperatures, TemperatureRange};
pub use direct::xsvector_direct;
pub use error::OpacityError;
pub use grid::WavenumberGrid;
pub use lines::{LineList, PartitionFunction};
pub use modit::Modit;
pub use opacity::Premodit;
