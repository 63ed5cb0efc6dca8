//! Turning an unbiased LSD into a spectrum: line profiles, FFT convolution,
//! lowpass compression and rotational broadening.

mod convolve;
mod lowpass;
mod rotation;
mod voigt;

pub use self::convolve::{convolve_same, xsection_from_lsd, FftConvolver};
pub use self::lowpass::{lowpass, lowpass_len, LowpassTransform};
pub use self::rotation::{
    convolve_rigid_rotation, dvgrid_rigid_rotation, rotation_kernel, rotation_kernel_jvp,
    RotationKernelJvp,
};
pub use self::voigt::{faddeeva, hjert, voigt_kernel, voigt_profile};
