//! Two-point linear interpolation basis over a discrete grid.
//!
//! A value `x` maps to a base index `i` and a contribution `cont` such that
//! `x = (1 - cont) * grid[i] + cont * grid[i + 1]`. Values outside the grid
//! clamp `i` to the first or last interval and extrapolate (`cont < 0` or
//! `cont > 1`), so the two weights still sum to one.

/// Base index and fractional contribution of a value on a grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridIndex {
    /// Index of the lower grid point of the interval.
    pub index: usize,
    /// Contribution of `index + 1`; `1 - cont` goes to `index`.
    pub cont: f64,
}

impl GridIndex {
    /// Weights of `index` and `index + 1`.
    #[inline]
    pub fn weights(&self) -> [f64; 2] {
        [1. - self.cont, self.cont]
    }
}

/// Locate `x` on `grid` (strictly increasing, at least two points).
///
/// A grid with fewer than two points maps everything to index 0 with no
/// contribution to a neighbor.
pub fn getix(x: f64, grid: &[f64]) -> GridIndex {
    if grid.len() < 2 {
        return GridIndex {
            index: 0,
            cont: 0.,
        };
    }
    let index = interval_index(x, grid);
    let cont = (x - grid[index]) / (grid[index + 1] - grid[index]);
    GridIndex { index, cont }
}

/// [`getix`] over many values.
pub fn getix_all(x: &[f64], grid: &[f64]) -> Vec<GridIndex> {
    x.iter().map(|&x| getix(x, grid)).collect()
}

/// Index of the interval containing `x`, clamped to `[0, len - 2]`.
#[inline]
fn interval_index(x: f64, grid: &[f64]) -> usize {
    grid.partition_point(|&g| g <= x)
        .saturating_sub(1)
        .min(grid.len() - 2)
}

/// Boltzmann-factor remapping of lower-state energies.
///
/// Energies are interpolated in the space of `exp(-(hc/k) E (1/ttyp - 1/tref))`,
/// the population factor relative to `tref` at the typical temperature `ttyp`.
/// An energy interpolated this way reproduces the line's population exactly at
/// `ttyp` (and trivially at `tref`, where every factor is 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoltzmannMap {
    /// Second radiation constant hc/k in cm K.
    pub hcperk: f64,
    /// Typical (weighting) temperature in K.
    pub ttyp: f64,
    /// Reference temperature in K.
    pub tref: f64,
}

impl BoltzmannMap {
    /// Exponent rate `a` with `b(E) = exp(a E)`.
    #[inline]
    fn rate(&self) -> f64 {
        -self.hcperk * (1. / self.ttyp - 1. / self.tref)
    }

    /// The remapped value of energy `e`.
    pub fn apply(&self, e: f64) -> f64 {
        f64::exp(self.rate() * e)
    }
}

/// Locate energy `x` on the energy `grid`, with the contribution computed in
/// Boltzmann-factor space.
///
/// The remapping is monotone, so the base index is the same as in energy
/// space. Differences are taken relative to the lower grid point with `expm1`,
/// which keeps precision when the remapped values are all close to one.
pub fn getix_boltzmann(x: f64, grid: &[f64], map: &BoltzmannMap) -> GridIndex {
    if grid.len() < 2 {
        return getix(x, grid);
    }
    let index = interval_index(x, grid);
    let rate = map.rate();
    let den = f64::exp_m1(rate * (grid[index + 1] - grid[index]));
    if den == 0. {
        // ttyp == tref: the remapping is flat, fall back to energy space
        return getix(x, grid);
    }
    let cont = f64::exp_m1(rate * (x - grid[index])) / den;
    GridIndex { index, cont }
}

/// Energy interpolation weights expanded in `t = 1/T` around `1/ttyp`.
///
/// The exact contribution that makes `(1 - c) b(E_i) + c b(E_{i+1}) = b(E)` at
/// temperature `T` is a smooth function `c(t)`. `coefficients[k]` is the k-th
/// Taylor coefficient of `c(t)` at `t = 1/ttyp`, so
/// `c(t) ~ sum_k coefficients[k] (t - 1/ttyp)^k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElowerWeights {
    /// Index of the lower energy grid point.
    pub index: usize,
    /// Taylor coefficients `[c, dc/dt, (d²c/dt²)/2]`.
    pub coefficients: [f64; 3],
}

impl ElowerWeights {
    /// Expand the Boltzmann-space contribution of energy `x` on `grid`.
    pub fn new(x: f64, grid: &[f64], map: &BoltzmannMap) -> Self {
        if grid.len() < 2 {
            return Self {
                index: 0,
                coefficients: [0.; 3],
            };
        }
        let index = interval_index(x, grid);
        let k = map.hcperk;
        let u = 1. / map.ttyp - 1. / map.tref;

        // Population ratios relative to the lower grid point. With
        // r(dE) = exp(-k dE (t - 1/tref)), the contribution is
        // c = (r(dx) - 1) / (r(dg) - 1).
        let dx = x - grid[index];
        let dg = grid[index + 1] - grid[index];
        let num = f64::exp_m1(-k * dx * u);
        let den = f64::exp_m1(-k * dg * u);
        if den == 0. {
            let cont = dx / dg;
            return Self {
                index,
                coefficients: [cont, 0., 0.],
            };
        }
        let (rx, rg) = (num + 1., den + 1.);

        // t-derivatives of numerator and denominator
        let num_1 = -k * dx * rx;
        let den_1 = -k * dg * rg;
        let num_2 = k * k * dx * dx * rx;
        let den_2 = k * k * dg * dg * rg;

        // From num = c den, differentiated once and twice
        let c0 = num / den;
        let c1 = (num_1 - c0 * den_1) / den;
        let c2 = (num_2 - 2. * c1 * den_1 - c0 * den_2) / den;

        Self {
            index,
            coefficients: [c0, c1, 0.5 * c2],
        }
    }

    /// Weights of `index` and `index + 1` in the order-`k` LSD coefficient.
    ///
    /// The zeroth order splits the line as `(1 - c, c)`; higher orders move
    /// strength between the two points as `(-c_k, c_k)`, which carries no net
    /// mass.
    #[inline]
    pub fn corner_weights(&self, k: usize) -> [f64; 2] {
        let ck = self.coefficients[k];
        if k == 0 {
            [1. - ck, ck]
        } else {
            [-ck, ck]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const GRID: [f64; 5] = [0., 1., 2., 4., 8.];

    #[test]
    fn interior_value() {
        let ix = getix(3., &GRID);
        assert_eq!(ix.index, 2);
        assert_relative_eq!(ix.cont, 0.5);
        assert_relative_eq!(ix.weights()[0] * GRID[2] + ix.weights()[1] * GRID[3], 3.);
    }

    #[test]
    fn exact_at_grid_points() {
        for (i, &g) in GRID.iter().enumerate().take(GRID.len() - 1) {
            let ix = getix(g, &GRID);
            assert_eq!(ix.index, i);
            assert_eq!(ix.cont, 0.);
        }
        // The last point belongs to the last interval
        let ix = getix(8., &GRID);
        assert_eq!(ix.index, 3);
        assert_eq!(ix.cont, 1.);
    }

    #[test]
    fn out_of_range_extrapolates() {
        let below = getix(-1., &GRID);
        assert_eq!(below.index, 0);
        assert_relative_eq!(below.cont, -1.);

        let above = getix(12., &GRID);
        assert_eq!(above.index, 3);
        assert_relative_eq!(above.cont, 2.);
        assert_relative_eq!(above.weights().iter().sum::<f64>(), 1.);
    }

    #[test]
    fn boltzmann_contribution_reproduces_population() {
        let map = BoltzmannMap {
            hcperk: 1.4387773538277202,
            ttyp: 1500.,
            tref: 296.,
        };
        let grid = [0., 500., 1000., 1500.];
        let e = 1234.;
        let ix = getix_boltzmann(e, &grid, &map);
        assert_eq!(ix.index, 2);

        let [w0, w1] = ix.weights();
        let interpolated = w0 * map.apply(grid[2]) + w1 * map.apply(grid[3]);
        assert_relative_eq!(interpolated, map.apply(e), max_relative = 1e-12);

        // And the index agrees with plain energy interpolation
        assert_eq!(getix(e, &grid).index, ix.index);
        assert_eq!(getix_boltzmann(1000., &grid, &map).cont, 0.);
    }

    #[test]
    fn flat_remapping_falls_back_to_energy_space() {
        let map = BoltzmannMap {
            hcperk: 1.4387773538277202,
            ttyp: 296.,
            tref: 296.,
        };
        let ix = getix_boltzmann(250., &[0., 1000.], &map);
        assert_relative_eq!(ix.cont, 0.25);
    }

    #[test]
    fn taylor_coefficients_match_finite_differences() {
        let hcperk = 1.4387773538277202;
        let grid = [0., 400., 800., 1200.];
        let (tref, twt) = (500., 1000.);
        let e = 950.;

        let exact_cont = |t: f64| {
            let map = BoltzmannMap {
                hcperk,
                ttyp: 1. / t,
                tref,
            };
            getix_boltzmann(e, &grid, &map).cont
        };

        let weights = ElowerWeights::new(
            e,
            &grid,
            &BoltzmannMap {
                hcperk,
                ttyp: twt,
                tref,
            },
        );
        let t0 = 1. / twt;
        let h = 1e-5 * t0;
        let d1 = (exact_cont(t0 + h) - exact_cont(t0 - h)) / (2. * h);
        let d2 = (exact_cont(t0 + h) - 2. * exact_cont(t0) + exact_cont(t0 - h)) / (h * h);

        assert_eq!(weights.index, 2);
        assert_relative_eq!(weights.coefficients[0], exact_cont(t0), max_relative = 1e-12);
        assert_relative_eq!(weights.coefficients[1], d1, max_relative = 1e-5);
        assert_relative_eq!(weights.coefficients[2], 0.5 * d2, max_relative = 1e-2);
    }

    #[test]
    fn higher_order_weights_carry_no_mass() {
        let weights = ElowerWeights {
            index: 1,
            coefficients: [0.3, 0.02, -0.004],
        };
        assert_relative_eq!(weights.corner_weights(0).iter().sum::<f64>(), 1.);
        assert_eq!(weights.corner_weights(1).iter().sum::<f64>(), 0.);
        assert_eq!(weights.corner_weights(2).iter().sum::<f64>(), 0.);
    }
}
