//! Probabilistic rank, zero and unit-matrix decisions.
//!
//! Exact rank of a matrix over a field of rational functions is replaced by
//! the rank at randomly drawn rational points. Every symbol is substituted by
//! an independent random rational of magnitude between 1/2 and 2, and the
//! entries are evaluated exactly. Zero and unit tests compare the exact
//! values. For the rank the exact values are equilibrated (every row, then
//! every column, divided by its largest entry) and only then converted to
//! `f64` for an SVD with a relative tolerance.
//!
//! This is a heuristic. The answer equals the generic answer with probability
//! one, but an unlucky draw (a point on a measure-zero variety) can still
//! under-estimate a rank or let a nonzero entry look like zero. Each decision
//! therefore looks at `attempts` independent draws: ranks take the maximum,
//! zero and unit tests must hold at every draw.

use crate::matrix::SymbolicMatrix;
use crate::symbol::Symbol;
use nalgebra::linalg::SVD;
use nalgebra::DMatrix;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Draws tried before giving up on a matrix whose entries keep hitting poles.
const MAX_POLE_RETRIES: usize = 16;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Independent random points per decision.
    pub attempts: usize,
    /// Singular values below `rank_tolerance * σ_max` of the equilibrated
    /// matrix count as zero.
    pub rank_tolerance: f64,
    /// Grid resolution: sample values are `±k / sample_range` with
    /// `k` in `[sample_range / 2, 2 * sample_range]`.
    pub sample_range: i64,
    /// Fixed seed for reproducible runs; entropy-seeded when `None`.
    pub seed: Option<u64>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            attempts: 5,
            rank_tolerance: 1e-9,
            sample_range: 1000,
            seed: None,
        }
    }
}

/// Random-substitution oracle shared by every component of a run.
///
/// The generator sits behind a `RefCell` so that decisions can be made
/// through a shared reference. This makes the prober `!Sync`, which matches
/// the single-threaded run model.
#[derive(Debug)]
pub struct Prober {
    settings: ProbeSettings,
    rng: RefCell<StdRng>,
}

impl Prober {
    pub fn new(settings: ProbeSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            settings,
            rng: RefCell::new(rng),
        }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    fn attempts(&self) -> usize {
        self.settings.attempts.max(1)
    }

    /// One random rational per symbol of `matrix`, `1/2 <= |v| <= 2`.
    pub fn sample_point(&self, matrix: &SymbolicMatrix) -> BTreeMap<Symbol, BigRational> {
        let scale = self.settings.sample_range.max(2);
        let mut rng = self.rng.borrow_mut();
        matrix
            .symbols()
            .into_iter()
            .map(|symbol| {
                let mut numer: i64 = rng.gen_range(scale / 2..=2 * scale);
                if rng.gen_bool(0.5) {
                    numer = -numer;
                }
                (
                    symbol,
                    BigRational::new(BigInt::from(numer), BigInt::from(scale)),
                )
            })
            .collect()
    }

    /// Exact values of `matrix` at a fresh random point, redrawing on poles.
    pub fn sample(&self, matrix: &SymbolicMatrix) -> Option<DMatrix<BigRational>> {
        for _ in 0..MAX_POLE_RETRIES {
            let point = self.sample_point(matrix);
            if let Some(values) = matrix.evaluate_exact(&point) {
                return Some(values);
            }
            debug!("random point hit a pole, redrawing");
        }
        warn!(
            rows = matrix.nrows(),
            cols = matrix.ncols(),
            "could not find a regular random point"
        );
        None
    }

    /// Generic rank: the largest numeric rank over the configured draws.
    pub fn rank(&self, matrix: &SymbolicMatrix) -> usize {
        let full = matrix.nrows().min(matrix.ncols());
        if full == 0 {
            return 0;
        }
        let mut best = 0;
        for attempt in 0..self.attempts() {
            let Some(values) = self.sample(matrix) else {
                continue;
            };
            let rank = numeric_rank(equilibrate(values), self.settings.rank_tolerance);
            if attempt > 0 && rank != best {
                warn!(attempt, rank, previous = best, "rank differs between random points");
            }
            best = best.max(rank);
            if best == full {
                break;
            }
        }
        best
    }

    pub fn is_zero(&self, matrix: &SymbolicMatrix) -> bool {
        if matrix.is_empty() {
            return true;
        }
        (0..self.attempts()).all(|_| {
            self.sample(matrix)
                .map_or(false, |values| values.iter().all(Zero::is_zero))
        })
    }

    /// `false` for non-square matrices.
    pub fn is_unit(&self, matrix: &SymbolicMatrix) -> bool {
        if !matrix.is_square() {
            return false;
        }
        if matrix.is_empty() {
            return true;
        }
        (0..self.attempts()).all(|_| {
            self.sample(matrix).map_or(false, |values| {
                values.row_iter().enumerate().all(|(i, row)| {
                    row.iter().enumerate().all(|(j, v)| {
                        if i == j {
                            v.is_one()
                        } else {
                            v.is_zero()
                        }
                    })
                })
            })
        })
    }
}

/// Scales every row, then every column, so that its largest entry is ±1.
///
/// Nonzero scalings leave the rank unchanged; the result lies in `[-1, 1]`
/// and converts to `f64` without overflow.
pub fn equilibrate(mut values: DMatrix<BigRational>) -> DMatrix<f64> {
    for mut row in values.row_iter_mut() {
        let max = row.iter().map(Signed::abs).max().unwrap_or_else(BigRational::zero);
        if !max.is_zero() {
            row.iter_mut().for_each(|v| *v = &*v / &max);
        }
    }
    for mut col in values.column_iter_mut() {
        let max = col.iter().map(Signed::abs).max().unwrap_or_else(BigRational::zero);
        if !max.is_zero() {
            col.iter_mut().for_each(|v| *v = &*v / &max);
        }
    }
    values.map(|v| v.to_f64().unwrap_or(0.0))
}

/// Number of singular values above `tolerance * σ_max`.
pub fn numeric_rank(values: DMatrix<f64>, tolerance: f64) -> usize {
    if values.is_empty() {
        return 0;
    }
    let svd = SVD::new(values, false, false);
    let sigma_max = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    if sigma_max == 0.0 {
        return 0;
    }
    svd.singular_values
        .iter()
        .filter(|&&s| s > tolerance * sigma_max)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rational::RationalFunction;

    fn sym(name: &str) -> RationalFunction {
        RationalFunction::from_symbol(Symbol::new(name))
    }

    fn prober() -> Prober {
        Prober::new(ProbeSettings {
            seed: Some(7),
            ..ProbeSettings::default()
        })
    }

    #[test]
    fn numeric_rank_of_diagonal() {
        let m = DMatrix::from_row_slice(3, 3, &[1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(numeric_rank(m, 1e-9), 2);
        assert_eq!(numeric_rank(DMatrix::zeros(2, 2), 1e-9), 0);
    }

    #[test]
    fn symbolic_rank_detects_dependent_rows() {
        let x = sym("x");
        let y = sym("y");
        let m = SymbolicMatrix::from_rows(vec![
            vec![x.clone(), y.clone()],
            vec![&x * &y, &y * &y],
        ])
        .expect("rows");
        assert_eq!(prober().rank(&m), 1);
    }

    #[test]
    fn symbolic_rank_of_generic_matrix_is_full() {
        let m = SymbolicMatrix::from_rows(vec![
            vec![sym("x"), sym("y"), RationalFunction::one()],
            vec![sym("y"), sym("x"), RationalFunction::zero()],
        ])
        .expect("rows");
        assert_eq!(prober().rank(&m), 2);
    }

    #[test]
    fn zero_and_unit_tests() {
        let x = sym("x");
        let cancel = SymbolicMatrix::column_vector(vec![&x - &x]);
        let p = prober();
        assert!(p.is_zero(&cancel));
        assert!(!p.is_zero(&SymbolicMatrix::column_vector(vec![x.clone()])));

        let inv = x.recip().expect("x != 0");
        let unit = SymbolicMatrix::from_rows(vec![
            vec![&x * &inv, RationalFunction::zero()],
            vec![RationalFunction::zero(), RationalFunction::one()],
        ])
        .expect("rows");
        assert!(p.is_unit(&unit));
        assert!(!p.is_unit(&SymbolicMatrix::zeros(2, 3)));
        assert!(!p.is_unit(&SymbolicMatrix::column_vector(vec![x])));
    }

    fn monomial(factors: &[(&str, i64)]) -> RationalFunction {
        factors
            .iter()
            .fold(RationalFunction::one(), |acc, (name, power)| {
                &acc * &sym(name).pow(*power).expect("nonzero base")
            })
            .simplify()
    }

    fn seeded(seed: u64) -> Prober {
        Prober::new(ProbeSettings {
            seed: Some(seed),
            ..ProbeSettings::default()
        })
    }

    #[test]
    fn small_high_degree_entries_are_not_zero() {
        let tiny = SymbolicMatrix::column_vector(vec![monomial(&[("x1", -2), ("x2", -2), ("x3", -2)])]);
        for seed in 0..100 {
            assert!(!seeded(seed).is_zero(&tiny), "seed {seed}");
        }
    }

    #[test]
    fn badly_scaled_diagonal_keeps_full_rank() {
        let m = SymbolicMatrix::from_rows(vec![
            vec![monomial(&[("x1", 3), ("x2", 3)]), RationalFunction::zero()],
            vec![RationalFunction::zero(), RationalFunction::one()],
        ])
        .expect("rows");
        for seed in 0..100 {
            assert_eq!(seeded(seed).rank(&m), 2, "seed {seed}");
        }
    }

    #[test]
    fn degree_six_dependent_rows_stay_dependent() {
        // Second row is x3^6 times the first.
        let a = monomial(&[("x1", 3), ("x2", 3)]);
        let b = monomial(&[("x1", 3)]);
        let scale = monomial(&[("x3", 6)]);
        let m = SymbolicMatrix::from_rows(vec![
            vec![a.clone(), b.clone()],
            vec![(&a * &scale).simplify(), (&b * &scale).simplify()],
        ])
        .expect("rows");
        for seed in 0..50 {
            assert_eq!(seeded(seed).rank(&m), 1, "seed {seed}");
        }
    }

    #[test]
    fn equilibration_bounds_entries() {
        let values = DMatrix::from_row_slice(
            2,
            2,
            &[
                BigRational::from_integer(BigInt::from(1_000_000)),
                BigRational::zero(),
                BigRational::zero(),
                BigRational::new(BigInt::from(1), BigInt::from(1_000_000)),
            ],
        );
        let scaled = equilibrate(values);
        assert_eq!(scaled, DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]));
        assert_eq!(numeric_rank(scaled, 1e-9), 2);
    }

    #[test]
    fn seeded_probers_draw_the_same_points() {
        let m = SymbolicMatrix::column_vector(vec![sym("a"), sym("b")]);
        let first = prober().sample_point(&m);
        let second = prober().sample_point(&m);
        assert_eq!(first, second);
    }
}
