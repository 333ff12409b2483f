//! Constructive linear algebra over the field of rational functions.
//!
//! Kernels, pseudo-inverses and inverses are built by exact Gauss-Jordan
//! elimination; each elimination step is simplified so expressions stay in
//! canonical form. Rank-related *decisions* (is this full rank, is this
//! product zero) go through the [`Prober`] instead, and every constructed
//! matrix is re-checked with it before it is handed out.

use crate::context::DifferentiationContext;
use crate::error::{FlatnessError, Result};
use crate::matrix::SymbolicMatrix;
use crate::polynomial::{gcd, Polynomial};
use crate::probe::{ProbeSettings, Prober};
use crate::rational::RationalFunction;
use tracing::debug;

#[derive(Debug)]
pub struct MatrixAlgebra {
    prober: Prober,
}

impl MatrixAlgebra {
    pub fn new(settings: ProbeSettings) -> Self {
        Self {
            prober: Prober::new(settings),
        }
    }

    pub fn prober(&self) -> &Prober {
        &self.prober
    }

    pub fn symbolic_rank(&self, m: &SymbolicMatrix) -> usize {
        self.prober.rank(m)
    }

    pub fn has_full_row_rank(&self, m: &SymbolicMatrix) -> bool {
        self.symbolic_rank(m) == m.nrows()
    }

    pub fn has_full_column_rank(&self, m: &SymbolicMatrix) -> bool {
        self.symbolic_rank(m) == m.ncols()
    }

    pub fn is_regular_matrix(&self, m: &SymbolicMatrix) -> bool {
        m.is_square() && self.has_full_row_rank(m)
    }

    pub fn is_zero_matrix(&self, m: &SymbolicMatrix) -> bool {
        self.prober.is_zero(m)
    }

    pub fn is_unit_matrix(&self, m: &SymbolicMatrix) -> bool {
        self.prober.is_unit(m)
    }

    pub fn simplify(&self, m: &SymbolicMatrix) -> SymbolicMatrix {
        m.simplify()
    }

    pub fn time_derivative(
        &self,
        m: &SymbolicMatrix,
        context: &DifferentiationContext,
    ) -> SymbolicMatrix {
        m.time_derivative(context).simplify()
    }

    /// Basis `C` of the right kernel: `M·C = 0`, `p - rank` columns.
    pub fn right_orthogonal_complement(&self, m: &SymbolicMatrix) -> Result<SymbolicMatrix> {
        let p = m.ncols();
        let (reduced, pivots) = rref(m.simplify().rows(), p);
        let free: Vec<usize> = (0..p).filter(|c| !pivots.contains(c)).collect();

        let mut columns = Vec::with_capacity(free.len());
        for &f in &free {
            let mut v = vec![RationalFunction::zero(); p];
            v[f] = RationalFunction::one();
            for (k, &pc) in pivots.iter().enumerate() {
                v[pc] = (-&reduced[k][f]).simplify();
            }
            columns.push(clear_denominators(v));
        }
        let complement = SymbolicMatrix::from_fn(p, free.len(), |i, j| columns[j][i].clone());

        let rank = self.symbolic_rank(m);
        if free.len() + rank != p {
            return Err(FlatnessError::verification(
                format!(
                    "right orthogonal complement has {} columns, numeric rank {rank} of a {}x{p} matrix expects {}",
                    free.len(),
                    m.nrows(),
                    p.saturating_sub(rank)
                ),
                m,
            ));
        }

        let product = m.mul(&complement)?.simplify();
        if !self.is_zero_matrix(&product) {
            return Err(FlatnessError::verification(
                "M·roc(M) is not the zero matrix",
                &product,
            ));
        }
        debug!(rows = p, cols = free.len(), "right orthogonal complement");
        Ok(complement)
    }

    /// Basis `C` of the left kernel: `C·M = 0`, `n - rank` rows.
    pub fn left_orthogonal_complement(&self, m: &SymbolicMatrix) -> Result<SymbolicMatrix> {
        Ok(self.right_orthogonal_complement(&m.transpose())?.transpose())
    }

    /// `R` with `M·R = I`; needs full row rank.
    pub fn right_pseudo_inverse(&self, m: &SymbolicMatrix) -> Result<SymbolicMatrix> {
        let r = self.pivot_block_inverse(m, "right pseudo-inverse")?;
        let check = m.mul(&r)?.simplify();
        if !self.is_unit_matrix(&check) {
            return Err(FlatnessError::verification("M·rpinv(M) is not the unit matrix", &check));
        }
        Ok(r)
    }

    /// `L` with `L·M = I`; needs full column rank.
    pub fn left_pseudo_inverse(&self, m: &SymbolicMatrix) -> Result<SymbolicMatrix> {
        let l = self
            .pivot_block_inverse(&m.transpose(), "left pseudo-inverse")?
            .transpose();
        let check = l.mul(m)?.simplify();
        if !self.is_unit_matrix(&check) {
            return Err(FlatnessError::verification("lpinv(M)·M is not the unit matrix", &check));
        }
        Ok(l)
    }

    pub fn inverse(&self, m: &SymbolicMatrix) -> Result<SymbolicMatrix> {
        if !m.is_square() {
            return Err(FlatnessError::DimensionMismatch {
                operation: "inverse (expects a square matrix)",
                left: m.shape(),
                right: (m.nrows(), m.nrows()),
            });
        }
        let n = m.nrows();
        let augmented = m.simplify().concat_cols(&SymbolicMatrix::identity(n))?;
        let (reduced, pivots) = rref(augmented.rows(), n);
        if pivots.len() < n {
            return Err(singular("inverse", n, pivots.len(), m));
        }
        Ok(SymbolicMatrix::from_fn(n, n, |i, j| reduced[i][n + j].clone()))
    }

    /// Left inverse of `z` that also annihilates `tilde_roc` and `rpinv`.
    ///
    /// `[rpinv | tilde_roc | z]` must be square and regular; the last
    /// `z.ncols()` rows of its inverse are the result.
    pub fn restricted_left_pseudo_inverse(
        &self,
        rpinv: &SymbolicMatrix,
        tilde_roc: &SymbolicMatrix,
        z: &SymbolicMatrix,
    ) -> Result<SymbolicMatrix> {
        let frame = rpinv.concat_cols(tilde_roc)?.concat_cols(z)?;
        if !frame.is_square() {
            return Err(FlatnessError::DimensionMismatch {
                operation: "restricted left pseudo-inverse (frame must be square)",
                left: frame.shape(),
                right: (frame.nrows(), frame.nrows()),
            });
        }
        let inv = self.inverse(&frame)?;
        let first = frame.ncols() - z.ncols();
        let rows: Vec<usize> = (first..frame.ncols()).collect();
        let zl = inv.select_rows(&rows);

        let annihilated = zl.mul(tilde_roc)?.simplify();
        if !self.is_zero_matrix(&annihilated) {
            return Err(FlatnessError::verification(
                "Z⁻ˡ·P̃1_roc is not the zero matrix",
                &annihilated,
            ));
        }
        let unit = zl.mul(z)?.simplify();
        if !self.is_unit_matrix(&unit) {
            return Err(FlatnessError::verification("Z⁻ˡ·Z is not the unit matrix", &unit));
        }
        Ok(zl)
    }

    /// A particular solution `X` of `A·X = B`, `None` if the system is inconsistent.
    pub fn solve_linear_system(
        &self,
        a: &SymbolicMatrix,
        b: &SymbolicMatrix,
    ) -> Result<Option<SymbolicMatrix>> {
        let k = a.ncols();
        let augmented = a.simplify().concat_cols(&b.simplify())?;
        let (reduced, pivots) = rref(augmented.rows(), k);

        let inconsistent = reduced[pivots.len()..]
            .iter()
            .any(|row| row[k..].iter().any(|e| !e.is_zero()));
        if inconsistent {
            return Ok(None);
        }

        let mut x = vec![vec![RationalFunction::zero(); b.ncols()]; k];
        for (row, &pc) in pivots.iter().enumerate() {
            x[pc] = reduced[row][k..].to_vec();
        }
        let x = SymbolicMatrix::from_fn(k, b.ncols(), |i, j| x[i][j].clone());
        let residual = a.mul(&x)?.sub(b)?.simplify();
        if !residual.is_structurally_zero() {
            return Err(FlatnessError::verification("A·X - B is not zero", &residual));
        }
        Ok(Some(x))
    }

    /// Places the inverse of the pivot-column block of `m` at the pivot rows.
    fn pivot_block_inverse(
        &self,
        m: &SymbolicMatrix,
        operation: &'static str,
    ) -> Result<SymbolicMatrix> {
        let (n, p) = m.shape();
        let (_, pivots) = rref(m.simplify().rows(), p);
        if pivots.len() < n {
            return Err(singular(operation, n, pivots.len(), m));
        }
        let block_inv = self.inverse(&m.select_columns(&pivots))?;
        let mut rows = vec![vec![RationalFunction::zero(); n]; p];
        for (k, &pc) in pivots.iter().enumerate() {
            rows[pc] = block_inv.row(k).to_vec();
        }
        Ok(SymbolicMatrix::from_fn(p, n, |i, j| rows[i][j].clone()))
    }
}

fn singular(operation: &'static str, required: usize, found: usize, m: &SymbolicMatrix) -> FlatnessError {
    FlatnessError::SingularSystem {
        operation,
        required,
        found,
        rows: m.nrows(),
        cols: m.ncols(),
        matrix: Box::new(m.clone()),
    }
}

/// Reduced row echelon form, pivoting only within the first `pivot_limit`
/// columns. Among the candidate rows the pivot with the smallest expression
/// is chosen. Returns the reduced rows and the pivot columns in order.
fn rref(
    mut rows: Vec<Vec<RationalFunction>>,
    pivot_limit: usize,
) -> (Vec<Vec<RationalFunction>>, Vec<usize>) {
    let nrows = rows.len();
    let mut pivots = Vec::new();
    let mut r = 0;
    for c in 0..pivot_limit {
        if r == nrows {
            break;
        }
        let Some(best) = (r..nrows)
            .filter(|&i| !rows[i][c].is_zero())
            .min_by_key(|&i| rows[i][c].complexity())
        else {
            continue;
        };
        rows.swap(r, best);

        let Some(inv) = rows[r][c].recip() else {
            continue;
        };
        let pivot_row: Vec<RationalFunction> =
            rows[r].iter().map(|e| (e * &inv).simplify()).collect();

        for (i, row) in rows.iter_mut().enumerate() {
            if i == r || row[c].is_zero() {
                continue;
            }
            let factor = row[c].clone();
            for (entry, p) in row.iter_mut().zip(&pivot_row) {
                if p.is_zero() {
                    continue;
                }
                *entry = (&*entry - &(&factor * p)).simplify();
            }
        }
        rows[r] = pivot_row;
        pivots.push(c);
        r += 1;
    }
    (rows, pivots)
}

fn lcm(a: &Polynomial, b: &Polynomial) -> Polynomial {
    let product = a * b;
    product.exact_div(&gcd(a, b)).unwrap_or(product).monic()
}

/// Scales a kernel vector so that all entries become polynomials.
fn clear_denominators(v: Vec<RationalFunction>) -> Vec<RationalFunction> {
    let common = v
        .iter()
        .filter(|e| !e.is_zero())
        .fold(Polynomial::one(), |acc, e| lcm(&acc, e.denominator()));
    if common.is_constant() {
        return v;
    }
    let factor = RationalFunction::from_polynomial(common);
    v.iter().map(|e| (e * &factor).simplify()).collect()
}
