//! Scattering line strengths onto the LSD grids.
//!
//! Each line lands on two wavenumber rows. Lines are sorted by their row, the
//! wavenumber axis is split into blocks of rows, and every block is filled by
//! one rayon worker that applies all contributions falling inside it. No two
//! workers ever write the same row.

use ndarray::{Array, Array2, Array3, ArrayViewMut, Axis, Dimension, RemoveAxis};
use rayon::prelude::*;

use super::broadening::BroadeningWeights;
use crate::config::DiffMode;
use crate::error::OpacityError;
use crate::grid::{getix_all, getix_boltzmann, BoltzmannMap, ElowerWeights, GridIndex};

/// Wavenumber rows per parallel block.
const BLOCK_ROWS: usize = 256;

/// Scatter `values` into a `shape` array with four-corner weights.
///
/// `x_index` locates each value on the first axis, `y_index` on the second.
pub fn inc2d(
    values: &[f64],
    x_index: &[GridIndex],
    y_index: &[GridIndex],
    shape: (usize, usize),
) -> Result<Array2<f64>, OpacityError> {
    check_len("x_index", values.len(), x_index.len())?;
    check_len("y_index", values.len(), y_index.len())?;
    check_index_bound("x_index", x_index.iter().map(|ix| ix.index), shape.0)?;
    check_index_bound("y_index", y_index.iter().map(|ix| ix.index), shape.1)?;

    let mut lsd = Array2::zeros(shape);
    accumulate_by_rows(&mut lsd, x_index, |mut row, line, wx| {
        let iy = y_index[line];
        for (dy, wy) in iy.weights().into_iter().enumerate() {
            if wy != 0. {
                row[iy.index + dy] += values[line] * wx * wy;
            }
        }
    });
    Ok(lsd)
}

/// The 2-D (wavenumber, lower-state energy) LSD of reference line strengths.
///
/// Energies are interpolated in Boltzmann space at `map.ttyp`. Summing this
/// array over energy with `f_bias` weights gives the unbroadened spectrum of
/// line strengths, and its Fourier transform along the wavenumber axis shows
/// how much a lowpassed LSD would lose.
pub fn initial_biased_lsd(
    strength_ref: &[f64],
    nu_lines: &[f64],
    elower: &[f64],
    nu_grid: &[f64],
    elower_grid: &[f64],
    map: &BoltzmannMap,
) -> Result<Array2<f64>, OpacityError> {
    check_len("nu_lines", strength_ref.len(), nu_lines.len())?;
    check_len("elower", strength_ref.len(), elower.len())?;

    let nu_index = getix_all(nu_lines, nu_grid);
    let elower_index: Vec<GridIndex> = elower
        .iter()
        .map(|&e| getix_boltzmann(e, elower_grid, map))
        .collect();
    inc2d(
        strength_ref,
        &nu_index,
        &elower_index,
        (nu_grid.len(), elower_grid.len()),
    )
}

/// Per-line inputs of the 3-D PreMODIT accumulation, as parallel slices.
#[derive(Debug, Clone, Copy)]
pub struct LsdLines<'a> {
    /// Reference line strengths.
    pub strength: &'a [f64],
    /// Position of each line on the wavenumber grid.
    pub nu_index: &'a [GridIndex],
    /// Energy weights of each line, expanded around the weighting
    /// temperature.
    pub elower: &'a [ElowerWeights],
    /// Compacted broadening bins of each line.
    pub broadening: &'a [BroadeningWeights],
}

/// Accumulate the LSD coefficient arrays `lbd_k` for `k` up to the order of
/// `diffmode`, each of shape `(nu, broadening, elower)`.
///
/// A line contributes to eight corners (one width axis) or sixteen (width and
/// exponent). For `k = 0` its weights sum to one, so the array's total mass
/// is the total line strength.
pub fn lbd_coefficients(
    lines: &LsdLines<'_>,
    shape: (usize, usize, usize),
    diffmode: DiffMode,
) -> Result<Vec<Array3<f64>>, OpacityError> {
    let num_lines = lines.strength.len();
    check_len("nu_index", num_lines, lines.nu_index.len())?;
    check_len("elower", num_lines, lines.elower.len())?;
    check_len("broadening", num_lines, lines.broadening.len())?;

    let (num_nu, num_broad, num_elower) = shape;
    check_index_bound("nu_index", lines.nu_index.iter().map(|ix| ix.index), num_nu)?;
    check_index_bound("elower", lines.elower.iter().map(|w| w.index), num_elower)?;
    if let Some(b) = lines
        .broadening
        .iter()
        .flat_map(|w| w.iter().map(|&(b, _)| b))
        .find(|&b| b >= num_broad)
    {
        return Err(OpacityError::InconsistentInputs {
            name: "broadening",
            expected: num_broad,
            actual: b + 1,
        });
    }

    let coefficients = (0..diffmode.num_coefficients())
        .map(|k| {
            let mut lbd = Array3::zeros(shape);
            accumulate_by_rows(&mut lbd, lines.nu_index, |mut row, line, wx| {
                let energy = &lines.elower[line];
                let [we0, we1] = energy.corner_weights(k);
                let strength = lines.strength[line] * wx;
                for &(b, wb) in &lines.broadening[line] {
                    for (de, we) in [(0, we0), (1, we1)] {
                        if we != 0. {
                            row[[b, energy.index + de]] += strength * wb * we;
                        }
                    }
                }
            });
            lbd
        })
        .collect();
    Ok(coefficients)
}

/// Apply every line's two wavenumber rows to `lsd`, with one rayon worker per
/// block of rows.
///
/// `apply(row, line, weight)` adds line `line`, scaled by its wavenumber
/// weight, into one row of the array.
fn accumulate_by_rows<D, F>(lsd: &mut Array<f64, D>, nu_index: &[GridIndex], apply: F)
where
    D: Dimension + RemoveAxis,
    F: Fn(ArrayViewMut<'_, f64, D::Smaller>, usize, f64) + Sync,
{
    let mut order: Vec<(usize, usize)> = nu_index
        .iter()
        .enumerate()
        .map(|(line, ix)| (ix.index, line))
        .collect();
    order.sort_unstable();

    lsd.axis_chunks_iter_mut(Axis(0), BLOCK_ROWS)
        .into_par_iter()
        .enumerate()
        .for_each(|(block, mut rows)| {
            let first_row = block * BLOCK_ROWS;
            let end_row = first_row + rows.len_of(Axis(0));
            // A line at index i writes rows i and i + 1
            let start = order.partition_point(|&(ix, _)| ix + 1 < first_row);
            let end = order.partition_point(|&(ix, _)| ix < end_row);

            for &(ix, line) in &order[start..end] {
                for (dx, wx) in nu_index[line].weights().into_iter().enumerate() {
                    let row = ix + dx;
                    if wx == 0. || row < first_row || row >= end_row {
                        continue;
                    }
                    apply(rows.index_axis_mut(Axis(0), row - first_row), line, wx);
                }
            }
        });
}

fn check_len(name: &'static str, expected: usize, actual: usize) -> Result<(), OpacityError> {
    if expected == actual {
        Ok(())
    } else {
        Err(OpacityError::InconsistentInputs {
            name,
            expected,
            actual,
        })
    }
}

/// Every base index must leave room for its upper neighbor.
fn check_index_bound(
    name: &'static str,
    mut indices: impl Iterator<Item = usize>,
    len: usize,
) -> Result<(), OpacityError> {
    match indices.find(|&i| i + 1 >= len) {
        Some(i) => Err(OpacityError::InconsistentInputs {
            name,
            expected: len,
            actual: i + 2,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::getix;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use smallvec::smallvec;

    #[test]
    fn single_line_conserves_mass_2d() {
        let nu_grid: Vec<f64> = (0..10).map(|i| 6000. + i as f64).collect();
        let elower_grid = [0., 500., 1000.];
        let x = getix_all(&[6003.25], &nu_grid);
        let y = getix_all(&[720.], &elower_grid);

        let lsd = inc2d(&[2.5], &x, &y, (10, 3)).unwrap();
        assert_relative_eq!(lsd.sum(), 2.5, max_relative = 1e-14);
        assert_eq!(lsd.iter().filter(|&&v| v != 0.).count(), 4);
        assert_relative_eq!(lsd[[3, 1]], 2.5 * 0.75 * (1. - 0.44), max_relative = 1e-12);
    }

    #[test]
    fn corners_across_block_boundaries() {
        // Lines on both sides of, and straddling, a block edge
        let num_nu = BLOCK_ROWS * 2 + 7;
        let nu_grid: Vec<f64> = (0..num_nu).map(|i| i as f64).collect();
        let positions = [
            0.3,
            (BLOCK_ROWS - 1) as f64 + 0.5,
            BLOCK_ROWS as f64 + 0.1,
            (2 * BLOCK_ROWS) as f64 - 0.25,
            (num_nu - 1) as f64 - 0.5,
        ];
        let values = [1., 2., 3., 4., 5.];
        let x = getix_all(&positions, &nu_grid);
        let y = vec![getix(0.5, &[0., 1.]); positions.len()];

        let lsd = inc2d(&values, &x, &y, (num_nu, 2)).unwrap();
        assert_relative_eq!(lsd.sum(), 15., max_relative = 1e-14);

        let edge = BLOCK_ROWS - 1;
        assert_relative_eq!(lsd.row(edge).sum(), 1.0, max_relative = 1e-12);
        assert_relative_eq!(lsd.row(edge + 1).sum(), 1.0 + 0.9 * 3., max_relative = 1e-12);
    }

    #[test]
    fn out_of_bounds_indices_are_rejected() {
        let x = [GridIndex {
            index: 4,
            cont: 0.5,
        }];
        let y = [GridIndex {
            index: 0,
            cont: 0.5,
        }];
        assert!(inc2d(&[1.], &x, &y, (5, 2)).is_err());
        assert!(inc2d(&[1., 2.], &x, &y, (6, 2)).is_err());
    }

    #[test]
    fn initial_lsd_sums_to_total_strength() {
        let nu_grid: Vec<f64> = (0..40).map(|i| 6020. + 1.5 * i as f64).collect();
        let elower_grid: Vec<f64> = (0..8).map(|i| 500. * i as f64).collect();
        let map = BoltzmannMap {
            hcperk: 1.4387773538277202,
            ttyp: 1500.,
            tref: 296.,
        };
        let strength = [1e-20, 3e-21, 7e-22];
        let lsd = initial_biased_lsd(
            &strength,
            &[6030.2, 6050.9, 6070.0],
            &[120., 1800., 3333.],
            &nu_grid,
            &elower_grid,
            &map,
        )
        .unwrap();
        assert_eq!(lsd.dim(), (40, 8));
        assert_relative_eq!(lsd.sum(), strength.iter().sum::<f64>(), max_relative = 1e-12);
    }

    /// One line with owned per-line data.
    struct OneLine {
        strength: [f64; 1],
        nu_index: [GridIndex; 1],
        elower: [ElowerWeights; 1],
        broadening: [BroadeningWeights; 1],
    }

    impl OneLine {
        fn new(broadening: BroadeningWeights) -> Self {
            Self {
                strength: [4.0],
                nu_index: [GridIndex {
                    index: 2,
                    cont: 0.3,
                }],
                elower: [ElowerWeights {
                    index: 1,
                    coefficients: [0.6, 0.05, -0.01],
                }],
                broadening: [broadening],
            }
        }

        fn lines(&self) -> LsdLines<'_> {
            LsdLines {
                strength: &self.strength,
                nu_index: &self.nu_index,
                elower: &self.elower,
                broadening: &self.broadening,
            }
        }
    }

    const SHAPE: (usize, usize, usize) = (6, 4, 4);

    #[test]
    fn single_line_conserves_mass_3d() {
        // One width axis: eight corners
        let line = OneLine::new(smallvec![(0, 0.25), (1, 0.75)]);
        let lbd = lbd_coefficients(&line.lines(), SHAPE, DiffMode::Zeroth).unwrap();
        assert_eq!(lbd.len(), 1);
        assert_relative_eq!(lbd[0].sum(), 4.0, max_relative = 1e-14);
        assert_eq!(lbd[0].iter().filter(|&&v| v != 0.).count(), 8);

        // Width and exponent axes: sixteen corners
        let line = OneLine::new(smallvec![(0, 0.1), (1, 0.2), (2, 0.3), (3, 0.4)]);
        let lbd = lbd_coefficients(&line.lines(), SHAPE, DiffMode::Zeroth).unwrap();
        assert_relative_eq!(lbd[0].sum(), 4.0, max_relative = 1e-14);
        assert_eq!(lbd[0].iter().filter(|&&v| v != 0.).count(), 16);
    }

    #[test]
    fn higher_coefficients_carry_no_mass() {
        let line = OneLine::new(smallvec![(1, 1.0)]);
        let lbd = lbd_coefficients(&line.lines(), SHAPE, DiffMode::Second).unwrap();
        assert_eq!(lbd.len(), 3);
        assert_abs_diff_eq!(lbd[1].sum(), 0., epsilon = 1e-14);
        assert_abs_diff_eq!(lbd[2].sum(), 0., epsilon = 1e-14);
        assert_relative_eq!(lbd[1][[2, 1, 2]], 4.0 * 0.7 * 0.05, max_relative = 1e-12);
        assert_relative_eq!(lbd[2][[3, 1, 1]], 4.0 * 0.3 * 0.01, max_relative = 1e-12);
    }

    #[test]
    fn broadening_bin_out_of_range_is_rejected() {
        let line = OneLine::new(smallvec![(4, 1.0)]);
        assert!(lbd_coefficients(&line.lines(), SHAPE, DiffMode::Zeroth).is_err());
    }
}
