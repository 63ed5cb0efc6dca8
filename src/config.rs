//! Physical constants and PreMODIT build settings.
//!
//! Nothing here is global: a [`PhysicalConstants`] value travels inside
//! [`PremoditConfig`] to every builder, so tests can run with alternate
//! reference temperatures.

use crate::error::OpacityError;

/// Physical constants (cgs) and reference temperatures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalConstants {
    /// Second radiation constant hc/k in cm K.
    pub hcperk: f64,
    /// Boltzmann constant in erg/K.
    pub kb: f64,
    /// Atomic mass unit in g.
    pub m_u: f64,
    /// Speed of light in cm/s.
    pub c: f64,
    /// Temperature in K at which line-list strengths are tabulated.
    pub tref_original: f64,
    /// Temperature in K at which pressure-broadening widths are tabulated.
    pub tref_broadening: f64,
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        #![allow(clippy::excessive_precision)]
        Self {
            hcperk: 1.4387773538277202,
            kb: 1.380649e-16,
            m_u: 1.66053906660e-24,
            c: 2.99792458e10,
            tref_original: 296.0,
            tref_broadening: 296.0,
        }
    }
}

/// Order of the temperature expansion used when unbiasing the LSD.
///
/// Higher orders extend the temperature range over which one precomputed LSD
/// stays accurate, at the cost of storing and contracting more coefficient
/// arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiffMode {
    /// Interpolation weights fixed at `Twt`.
    #[default]
    Zeroth,
    /// Weights expanded to first order in `1/T - 1/Twt`.
    First,
    /// Weights expanded to second order in `1/T - 1/Twt`.
    Second,
}

impl DiffMode {
    /// Highest power of `1/T - 1/Twt` kept.
    pub fn order(self) -> usize {
        match self {
            DiffMode::Zeroth => 0,
            DiffMode::First => 1,
            DiffMode::Second => 2,
        }
    }

    /// Number of LSD coefficient arrays this mode needs.
    pub fn num_coefficients(self) -> usize {
        self.order() + 1
    }
}

impl TryFrom<u8> for DiffMode {
    type Error = OpacityError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DiffMode::Zeroth),
            1 => Ok(DiffMode::First),
            2 => Ok(DiffMode::Second),
            _ => Err(OpacityError::InvalidConfig(format!(
                "diffmode must be 0, 1 or 2, got {value}"
            ))),
        }
    }
}

/// Temperature range (K) over which a built LSD will be queried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureRange {
    /// Lowest temperature in K.
    pub low: f64,
    /// Highest temperature in K.
    pub high: f64,
}

impl TemperatureRange {
    /// Create a new range, checking that `0 < low < high`.
    pub fn new(low: f64, high: f64) -> Result<Self, OpacityError> {
        let range = Self { low, high };
        range.validate()?;
        Ok(range)
    }

    fn validate(&self) -> Result<(), OpacityError> {
        if !(self.low.is_finite() && self.low > 0.) {
            return Err(OpacityError::OutOfRange {
                name: "temperature range low end",
                value: self.low,
            });
        }
        if !(self.high.is_finite() && self.high > self.low) {
            return Err(OpacityError::OutOfRange {
                name: "temperature range high end",
                value: self.high,
            });
        }
        Ok(())
    }

    /// Whether `t` lies within the range (inclusive).
    pub fn contains(&self, t: f64) -> bool {
        (self.low..=self.high).contains(&t)
    }
}

/// The bias point `tref` and weighting point `twt` of an LSD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceTemperatures {
    /// Temperature in K the LSD strengths are referred to.
    pub tref: f64,
    /// Temperature in K where the energy interpolation weights are exact.
    pub twt: f64,
}

/// Settings for building a [`Premodit`](crate::Premodit) LSD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PremoditConfig {
    /// Unbiasing order.
    pub diffmode: DiffMode,
    /// Range of temperatures the LSD will be queried at.
    pub trange: TemperatureRange,
    /// Width grid resolution: adjacent width grid values differ by a factor of
    /// `10^dit_grid_resolution`, adjacent exponent values by this amount.
    pub dit_grid_resolution: f64,
    /// Allowed change of the Boltzmann weight between adjacent energy grid
    /// points at the top of `trange`, in orders of magnitude.
    pub elower_contrast: f64,
    /// Override the reference temperatures derived from `trange`.
    pub manual_reference: Option<ReferenceTemperatures>,
    /// Keep the LSD in lowpassed Fourier form, truncated by this factor.
    pub lowpass_compress_rate: Option<f64>,
    /// Half width (in grid samples) of the Voigt kernel. `None` covers the
    /// whole grid, so no line wing is ever truncated.
    pub kernel_half_width: Option<usize>,
    /// Physical constants.
    pub constants: PhysicalConstants,
}

impl Default for PremoditConfig {
    fn default() -> Self {
        Self {
            diffmode: DiffMode::default(),
            trange: TemperatureRange {
                low: 500.,
                high: 1500.,
            },
            dit_grid_resolution: 0.2,
            elower_contrast: 0.1,
            manual_reference: None,
            lowpass_compress_rate: None,
            kernel_half_width: None,
            constants: PhysicalConstants::default(),
        }
    }
}

impl PremoditConfig {
    /// Check every setting, failing on the first bad one.
    pub fn validate(&self) -> Result<(), OpacityError> {
        self.trange.validate()?;

        if !(self.dit_grid_resolution.is_finite() && self.dit_grid_resolution > 0.) {
            return Err(OpacityError::OutOfRange {
                name: "dit_grid_resolution",
                value: self.dit_grid_resolution,
            });
        }
        if !(self.elower_contrast.is_finite() && self.elower_contrast > 0.) {
            return Err(OpacityError::OutOfRange {
                name: "elower_contrast",
                value: self.elower_contrast,
            });
        }
        if let Some(rate) = self.lowpass_compress_rate {
            if !(rate.is_finite() && rate >= 1.) {
                return Err(OpacityError::OutOfRange {
                    name: "lowpass_compress_rate",
                    value: rate,
                });
            }
        }
        if let Some(ReferenceTemperatures { tref, twt }) = self.manual_reference {
            for (name, value) in [("tref", tref), ("twt", twt)] {
                if !(value.is_finite() && value > 0.) {
                    return Err(OpacityError::OutOfRange { name, value });
                }
            }
            // The Boltzmann interpolation degenerates when both points coincide
            if tref == twt {
                return Err(OpacityError::InvalidConfig(format!(
                    "tref and twt must differ, both are {tref} K"
                )));
            }
        }
        Ok(())
    }

    /// The `(tref, twt)` pair used to build the LSD.
    ///
    /// Unless set manually, `tref` is the low end of `trange`. `twt` is the
    /// high end for [`DiffMode::Zeroth`], and the harmonic midpoint of the
    /// range (the midpoint in `1/T`) for the expanded modes. The zeroth-order
    /// LSD is exact at both `tref` and `twt`.
    pub fn reference_temperatures(&self) -> ReferenceTemperatures {
        if let Some(manual) = self.manual_reference {
            return manual;
        }
        let TemperatureRange { low, high } = self.trange;
        let twt = match self.diffmode {
            DiffMode::Zeroth => high,
            DiffMode::First | DiffMode::Second => 2. / (1. / low + 1. / high),
        };
        ReferenceTemperatures { tref: low, twt }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_config_is_valid() {
        PremoditConfig::default().validate().unwrap();
    }

    #[test]
    fn reference_temperatures_follow_diffmode() {
        let mut config = PremoditConfig {
            trange: TemperatureRange::new(400., 1600.).unwrap(),
            ..Default::default()
        };
        let refs = config.reference_temperatures();
        assert_eq!(refs.tref, 400.);
        assert_eq!(refs.twt, 1600.);

        config.diffmode = DiffMode::Second;
        let refs = config.reference_temperatures();
        assert_relative_eq!(refs.twt, 640.);
        assert!(config.trange.contains(refs.twt));
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(TemperatureRange::new(1500., 500.).is_err());
        assert!(TemperatureRange::new(0., 500.).is_err());

        let config = PremoditConfig {
            manual_reference: Some(ReferenceTemperatures {
                tref: 1000.,
                twt: 1000.,
            }),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(OpacityError::InvalidConfig(_))
        ));

        let config = PremoditConfig {
            elower_contrast: 0.,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().is_invalid_input());

        assert!(DiffMode::try_from(3).is_err());
        assert_eq!(DiffMode::try_from(2).unwrap().num_coefficients(), 3);
    }
}
