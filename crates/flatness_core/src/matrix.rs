//! Dense matrices of rational-function entries.
//!
//! Every operation returns a fresh matrix; nothing shares storage with its
//! inputs. Arithmetic does not simplify on its own, the algebra layer calls
//! [`SymbolicMatrix::simplify`] after each constructive step.

use crate::context::DifferentiationContext;
use crate::error::{FlatnessError, Result};
use crate::rational::RationalFunction;
use crate::symbol::Symbol;
use nalgebra::DMatrix;
use num_rational::BigRational;
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolicMatrix {
    nrows: usize,
    ncols: usize,
    /// Row-major storage.
    data: Vec<RationalFunction>,
}

impl SymbolicMatrix {
    pub fn new(nrows: usize, ncols: usize, data: Vec<RationalFunction>) -> Result<Self> {
        if data.len() != nrows * ncols {
            return Err(FlatnessError::DimensionMismatch {
                operation: "matrix construction",
                left: (nrows, ncols),
                right: (data.len(), 1),
            });
        }
        Ok(Self { nrows, ncols, data })
    }

    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            data: vec![RationalFunction::zero(); nrows * ncols],
        }
    }

    pub fn identity(n: usize) -> Self {
        Self::from_fn(n, n, |i, j| {
            if i == j {
                RationalFunction::one()
            } else {
                RationalFunction::zero()
            }
        })
    }

    pub fn from_fn(
        nrows: usize,
        ncols: usize,
        mut f: impl FnMut(usize, usize) -> RationalFunction,
    ) -> Self {
        let mut data = Vec::with_capacity(nrows * ncols);
        for i in 0..nrows {
            for j in 0..ncols {
                data.push(f(i, j));
            }
        }
        Self { nrows, ncols, data }
    }

    /// Builds a matrix from rows; all rows must have the same length.
    pub fn from_rows(rows: Vec<Vec<RationalFunction>>) -> Result<Self> {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(nrows * ncols);
        for row in rows {
            if row.len() != ncols {
                return Err(FlatnessError::DimensionMismatch {
                    operation: "row construction",
                    left: (1, ncols),
                    right: (1, row.len()),
                });
            }
            data.extend(row);
        }
        Ok(Self { nrows, ncols, data })
    }

    pub fn column_vector(entries: Vec<RationalFunction>) -> Self {
        Self {
            nrows: entries.len(),
            ncols: 1,
            data: entries,
        }
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn is_square(&self) -> bool {
        self.nrows == self.ncols
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, i: usize, j: usize) -> &RationalFunction {
        &self.data[i * self.ncols + j]
    }

    pub fn entries(&self) -> &[RationalFunction] {
        &self.data
    }

    pub fn row(&self, i: usize) -> &[RationalFunction] {
        &self.data[i * self.ncols..(i + 1) * self.ncols]
    }

    pub fn rows(&self) -> Vec<Vec<RationalFunction>> {
        (0..self.nrows).map(|i| self.row(i).to_vec()).collect()
    }

    pub fn map(&self, f: impl FnMut(&RationalFunction) -> RationalFunction) -> Self {
        Self {
            nrows: self.nrows,
            ncols: self.ncols,
            data: self.data.iter().map(f).collect(),
        }
    }

    pub fn transpose(&self) -> Self {
        Self::from_fn(self.ncols, self.nrows, |i, j| self.get(j, i).clone())
    }

    pub fn add(&self, rhs: &SymbolicMatrix) -> Result<Self> {
        self.check_same_shape("addition", rhs)?;
        Ok(Self {
            nrows: self.nrows,
            ncols: self.ncols,
            data: self.data.iter().zip(&rhs.data).map(|(a, b)| a + b).collect(),
        })
    }

    pub fn sub(&self, rhs: &SymbolicMatrix) -> Result<Self> {
        self.check_same_shape("subtraction", rhs)?;
        Ok(Self {
            nrows: self.nrows,
            ncols: self.ncols,
            data: self.data.iter().zip(&rhs.data).map(|(a, b)| a - b).collect(),
        })
    }

    pub fn neg(&self) -> Self {
        self.map(|e| -e)
    }

    pub fn scale(&self, factor: &RationalFunction) -> Self {
        self.map(|e| e * factor)
    }

    pub fn mul(&self, rhs: &SymbolicMatrix) -> Result<Self> {
        if self.ncols != rhs.nrows {
            return Err(FlatnessError::DimensionMismatch {
                operation: "multiplication",
                left: self.shape(),
                right: rhs.shape(),
            });
        }
        Ok(Self::from_fn(self.nrows, rhs.ncols, |i, j| {
            let mut acc = RationalFunction::zero();
            for k in 0..self.ncols {
                let a = self.get(i, k);
                let b = rhs.get(k, j);
                if a.is_zero() || b.is_zero() {
                    continue;
                }
                acc = &acc + &(a * b);
            }
            acc
        }))
    }

    /// `[self | rhs]`, columns of `rhs` appended on the right.
    pub fn concat_cols(&self, rhs: &SymbolicMatrix) -> Result<Self> {
        if self.ncols == 0 && self.nrows == 0 {
            return Ok(rhs.clone());
        }
        if rhs.ncols == 0 && rhs.nrows == 0 {
            return Ok(self.clone());
        }
        if self.nrows != rhs.nrows {
            return Err(FlatnessError::DimensionMismatch {
                operation: "column concatenation",
                left: self.shape(),
                right: rhs.shape(),
            });
        }
        Ok(Self::from_fn(self.nrows, self.ncols + rhs.ncols, |i, j| {
            if j < self.ncols {
                self.get(i, j).clone()
            } else {
                rhs.get(i, j - self.ncols).clone()
            }
        }))
    }

    /// Rows of `rhs` appended below.
    pub fn concat_rows(&self, rhs: &SymbolicMatrix) -> Result<Self> {
        Ok(self.transpose().concat_cols(&rhs.transpose())?.transpose())
    }

    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self::from_fn(rows.len(), self.ncols, |i, j| self.get(rows[i], j).clone())
    }

    pub fn select_columns(&self, cols: &[usize]) -> Self {
        Self::from_fn(self.nrows, cols.len(), |i, j| self.get(i, cols[j]).clone())
    }

    /// Canonical form of every entry.
    pub fn simplify(&self) -> Self {
        self.map(RationalFunction::simplify)
    }

    /// Exact test, only meaningful for its "true" answer on unsimplified input.
    pub fn is_structurally_zero(&self) -> bool {
        self.data.iter().all(RationalFunction::is_zero)
    }

    pub fn partial_derivative(&self, symbol: &Symbol) -> Self {
        self.map(|e| e.derivative(symbol))
    }

    /// For a column vector `f`, the matrix `[∂f/∂s_1 | ... | ∂f/∂s_k]`.
    pub fn jacobian(&self, symbols: &[Symbol]) -> Result<Self> {
        if self.ncols != 1 {
            return Err(FlatnessError::DimensionMismatch {
                operation: "jacobian (expects a column vector)",
                left: self.shape(),
                right: (self.nrows, 1),
            });
        }
        Ok(Self::from_fn(self.nrows, symbols.len(), |i, j| {
            self.get(i, 0).derivative(&symbols[j])
        }))
    }

    pub fn time_derivative(&self, context: &DifferentiationContext) -> Self {
        self.map(|e| context.time_derivative(e))
    }

    pub fn symbols(&self) -> BTreeSet<Symbol> {
        self.data.iter().flat_map(RationalFunction::symbols).collect()
    }

    pub fn partial_eval(&self, assignment: &BTreeMap<Symbol, BigRational>) -> Option<Self> {
        let data = self
            .data
            .iter()
            .map(|e| e.partial_eval(assignment))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            nrows: self.nrows,
            ncols: self.ncols,
            data,
        })
    }

    /// Exact values at a point; `None` on a pole.
    pub fn evaluate_exact(
        &self,
        assignment: &BTreeMap<Symbol, BigRational>,
    ) -> Option<DMatrix<BigRational>> {
        let values = self
            .data
            .iter()
            .map(|entry| entry.eval(assignment))
            .collect::<Option<Vec<_>>>()?;
        Some(DMatrix::from_row_slice(self.nrows, self.ncols, &values))
    }

    fn check_same_shape(&self, operation: &'static str, rhs: &SymbolicMatrix) -> Result<()> {
        if self.shape() != rhs.shape() {
            return Err(FlatnessError::DimensionMismatch {
                operation,
                left: self.shape(),
                right: rhs.shape(),
            });
        }
        Ok(())
    }
}

/// Renders as a nested list literal, `[[a, b], [c, d]]`, which the expression
/// parser reads back.
impl fmt::Display for SymbolicMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for i in 0..self.nrows {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[")?;
            for (j, entry) in self.row(i).iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{entry}")?;
            }
            write!(f, "]")?;
        }
        write!(f, "]")
    }
}

/// Serialized as a list of rows of entry strings.
impl Serialize for SymbolicMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.nrows))?;
        for i in 0..self.nrows {
            let row: Vec<String> = self.row(i).iter().map(ToString::to_string).collect();
            seq.serialize_element(&row)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> RationalFunction {
        RationalFunction::from_symbol(Symbol::new(name))
    }

    fn int(v: i64) -> RationalFunction {
        RationalFunction::integer(v)
    }

    #[test]
    fn multiplication_checks_shapes() {
        let a = SymbolicMatrix::zeros(2, 3);
        let b = SymbolicMatrix::zeros(2, 3);
        let err = a.mul(&b).expect_err("inner dimensions differ");
        assert!(matches!(err, FlatnessError::DimensionMismatch { .. }));
    }

    #[test]
    fn multiplication_with_identity_is_neutral() {
        let m = SymbolicMatrix::from_rows(vec![
            vec![sym("x"), int(2)],
            vec![int(0), sym("y")],
        ])
        .expect("rows");
        let product = m.mul(&SymbolicMatrix::identity(2)).expect("shapes").simplify();
        assert_eq!(product, m.simplify());
    }

    #[test]
    fn concat_and_select_round_trip() {
        let left = SymbolicMatrix::column_vector(vec![sym("a"), sym("b")]);
        let right = SymbolicMatrix::column_vector(vec![sym("c"), sym("d")]);
        let joined = left.concat_cols(&right).expect("same rows");
        assert_eq!(joined.shape(), (2, 2));
        assert_eq!(joined.select_columns(&[1]), right);
        assert_eq!(joined.select_rows(&[0]).row(0), &[sym("a"), sym("c")]);
    }

    #[test]
    fn concat_accepts_empty_left_operand() {
        let empty = SymbolicMatrix::zeros(0, 0);
        let col = SymbolicMatrix::column_vector(vec![sym("a")]);
        assert_eq!(empty.concat_cols(&col).expect("empty start"), col);
    }

    #[test]
    fn jacobian_stacks_partial_derivatives_columnwise() {
        let x = Symbol::new("x");
        let y = Symbol::new("y");
        let f = SymbolicMatrix::column_vector(vec![&sym("x") * &sym("y"), sym("x")]);
        let jac = f.jacobian(&[x, y]).expect("column vector").simplify();
        let expected = SymbolicMatrix::from_rows(vec![
            vec![sym("y"), sym("x")],
            vec![int(1), int(0)],
        ])
        .expect("rows");
        assert_eq!(jac, expected);
    }

    #[test]
    fn display_is_a_nested_list() {
        let m = SymbolicMatrix::from_rows(vec![vec![sym("x"), int(-1)], vec![int(0), sym("y")]])
            .expect("rows");
        assert_eq!(m.to_string(), "[[x, -1], [0, y]]");
    }

    #[test]
    fn evaluate_exact_keeps_rational_values() {
        let m = SymbolicMatrix::column_vector(vec![&sym("x") * &int(3)]);
        let mut point = BTreeMap::new();
        point.insert(Symbol::new("x"), BigRational::new(1.into(), 2.into()));
        let values = m.evaluate_exact(&point).expect("no poles");
        assert_eq!(values[(0, 0)], BigRational::new(3.into(), 2.into()));
    }
}
