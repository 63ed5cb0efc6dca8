//! Crate error type.

/// Possible opacity errors.
#[derive(Debug, thiserror::Error)]
pub enum OpacityError {
    /// The line list has no lines in it
    #[error("line list is empty")]
    EmptyLineList,
    /// Parallel input arrays don't have matching lengths
    #[error("inputs have inconsistent lengths: {name} has {actual}, expected {expected}")]
    InconsistentInputs {
        /// Name of the offending input
        name: &'static str,
        /// Length that was expected
        expected: usize,
        /// Length that was found
        actual: usize,
    },
    /// A grid is not strictly increasing (or has too few points)
    #[error("{name} grid must be strictly increasing with at least 2 points (problem at index {index})")]
    NonMonotonicGrid {
        /// Name of the grid
        name: &'static str,
        /// First index where the grid breaks monotonicity
        index: usize,
    },
    /// A scalar input is out of its physical domain
    #[error("{name} is out of range: {value}")]
    OutOfRange {
        /// Name of the offending value
        name: &'static str,
        /// The value itself
        value: f64,
    },
    /// The configuration can't be used to build the LSD
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The partition function collaborator failed
    #[error("partition function failed at T = {temperature} K: {reason}")]
    PartitionFunction {
        /// Temperature of the query in K
        temperature: f64,
        /// Message from the provider
        reason: String,
    },
    /// The FFT backend rejected its inputs
    #[error("FFT failed: {0}")]
    Fft(#[from] realfft::FftError),
    /// An ndarray reshape failed
    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl OpacityError {
    /// Whether this error is an invalid-input failure (as opposed to a
    /// collaborator or backend failure).
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            OpacityError::EmptyLineList
                | OpacityError::InconsistentInputs { .. }
                | OpacityError::NonMonotonicGrid { .. }
                | OpacityError::OutOfRange { .. }
                | OpacityError::InvalidConfig(_)
        )
    }
}
