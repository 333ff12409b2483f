//! Unimodularity of polynomial matrices in the time-derivative operator.
//!
//! Entries are polynomials in `s = d/dt` with rational-function coefficients,
//! kept in the normal form `Σ C_k s^k` where every `s` stands to the right of
//! its coefficient. Multiplication moves `s` to the right with the Leibniz
//! rule `s·f = f·s + ḟ`, so the ring is non-commutative.
//!
//! A square matrix is unimodular when it has an inverse of the same form.
//! [`UnimodularityChecker`] searches for one with a polynomial ansatz of fixed
//! degree whose coefficients are unknown constants, which turns `ansatz·J = I`
//! into a linear system over the rational functions.

use crate::algebra::MatrixAlgebra;
use crate::context::DifferentiationContext;
use crate::error::{FlatnessError, Result};
use crate::matrix::SymbolicMatrix;
use crate::probe::ProbeSettings;
use crate::rational::RationalFunction;
use crate::symbol::Symbol;
use num_rational::BigRational;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// `Σ_k C_k s^k`, all coefficients of the same shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorMatrix {
    coefficients: Vec<SymbolicMatrix>,
}

impl OperatorMatrix {
    pub fn new(coefficients: Vec<SymbolicMatrix>) -> Result<Self> {
        let Some(first) = coefficients.first() else {
            return Err(FlatnessError::DimensionMismatch {
                operation: "operator matrix (needs at least one coefficient)",
                left: (0, 0),
                right: (0, 0),
            });
        };
        let shape = first.shape();
        if let Some(bad) = coefficients.iter().find(|c| c.shape() != shape) {
            return Err(FlatnessError::DimensionMismatch {
                operation: "operator matrix coefficients",
                left: shape,
                right: bad.shape(),
            });
        }
        Ok(Self { coefficients }.trimmed())
    }

    pub fn from_matrix(m: SymbolicMatrix) -> Self {
        Self {
            coefficients: vec![m],
        }
    }

    pub fn identity(n: usize) -> Self {
        Self::from_matrix(SymbolicMatrix::identity(n))
    }

    pub fn coefficients(&self) -> &[SymbolicMatrix] {
        &self.coefficients
    }

    /// Coefficient of `s^k`; zero beyond the degree.
    pub fn coefficient(&self, k: usize) -> SymbolicMatrix {
        self.coefficients
            .get(k)
            .cloned()
            .unwrap_or_else(|| SymbolicMatrix::zeros(self.nrows(), self.ncols()))
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    pub fn nrows(&self) -> usize {
        self.coefficients[0].nrows()
    }

    pub fn ncols(&self) -> usize {
        self.coefficients[0].ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.coefficients[0].shape()
    }

    pub fn simplify(&self) -> Self {
        Self {
            coefficients: self.coefficients.iter().map(SymbolicMatrix::simplify).collect(),
        }
        .trimmed()
    }

    fn trimmed(mut self) -> Self {
        while self.coefficients.len() > 1
            && self
                .coefficients
                .last()
                .map_or(false, SymbolicMatrix::is_structurally_zero)
        {
            self.coefficients.pop();
        }
        self
    }

    /// `self · rhs` with every `s` of `self` moved past the coefficients of
    /// `rhs`: `s^i·B = Σ_l C(i, l) B^{(l)} s^{i-l}`.
    pub fn mul(&self, rhs: &OperatorMatrix, context: &DifferentiationContext) -> Result<Self> {
        if self.ncols() != rhs.nrows() {
            return Err(FlatnessError::DimensionMismatch {
                operation: "operator multiplication",
                left: self.shape(),
                right: rhs.shape(),
            });
        }
        let degree = self.degree() + rhs.degree();
        let mut out = vec![SymbolicMatrix::zeros(self.nrows(), rhs.ncols()); degree + 1];

        for (j, b) in rhs.coefficients.iter().enumerate() {
            let mut derivative = b.clone();
            for l in 0..=self.degree() {
                for i in l..=self.degree() {
                    let a = &self.coefficients[i];
                    if a.is_structurally_zero() || derivative.is_structurally_zero() {
                        continue;
                    }
                    let term = a
                        .mul(&derivative)?
                        .scale(&RationalFunction::integer(binomial(i, l)));
                    out[i - l + j] = out[i - l + j].add(&term)?;
                }
                if l < self.degree() {
                    derivative = derivative.time_derivative(context).simplify();
                }
            }
        }
        Ok(Self { coefficients: out }.simplify())
    }

    /// Action on a column of time functions: `Σ_k C_k · signal^{(k)}`.
    pub fn apply(
        &self,
        signal: &SymbolicMatrix,
        context: &DifferentiationContext,
    ) -> Result<SymbolicMatrix> {
        let mut result = SymbolicMatrix::zeros(self.nrows(), signal.ncols());
        let mut derivative = signal.clone();
        for (k, c) in self.coefficients.iter().enumerate() {
            if k > 0 {
                derivative = derivative.time_derivative(context).simplify();
            }
            result = result.add(&c.mul(&derivative)?)?;
        }
        Ok(result.simplify())
    }

    /// Unit matrix in `s^0`, zero elsewhere, under random substitution.
    pub fn is_identity(&self, algebra: &MatrixAlgebra) -> bool {
        algebra.is_unit_matrix(&self.coefficients[0])
            && self.coefficients[1..]
                .iter()
                .all(|c| algebra.is_zero_matrix(c))
    }
}

impl fmt::Display for OperatorMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut written = 0;
        for (k, c) in self.coefficients.iter().enumerate() {
            if c.is_structurally_zero() {
                continue;
            }
            if written > 0 {
                write!(f, " + ")?;
            }
            written += 1;
            match k {
                0 => write!(f, "{c}")?,
                1 => write!(f, "{c}*s")?,
                _ => write!(f, "{c}*s^{k}")?,
            }
        }
        if written == 0 {
            write!(f, "{}", self.coefficients[0])?;
        }
        Ok(())
    }
}

fn binomial(n: usize, k: usize) -> i64 {
    let mut acc: i64 = 1;
    for step in 0..k {
        acc = acc * (n - step) as i64 / (step + 1) as i64;
    }
    acc
}

/// Jacobian of a Lie–Bäcklund map `z(y, ẏ, …, y^{(order)})`:
/// `Σ_i ∂z/∂y^{(i)} s^i`, one column per component of `y`.
pub fn lie_baecklund_jacobian(
    z: &SymbolicMatrix,
    context: &DifferentiationContext,
    order: u32,
) -> Result<OperatorMatrix> {
    let coefficients = (0..=order)
        .map(|i| -> Result<SymbolicMatrix> {
            Ok(z.jacobian(&context.state_derivatives(i))?.simplify())
        })
        .collect::<Result<Vec<_>>>()?;
    OperatorMatrix::new(coefficients)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UnimodularSettings {
    /// Degree in `s` of the inverse ansatz.
    pub ansatz_degree: usize,
    pub probe: ProbeSettings,
}

impl Default for UnimodularSettings {
    fn default() -> Self {
        Self {
            ansatz_degree: 2,
            probe: ProbeSettings::default(),
        }
    }
}

/// A verified inverse together with the matrix it inverts.
#[derive(Debug, Clone, Serialize)]
pub struct UnimodularCertificate {
    pub inverse: OperatorMatrix,
    pub jacobian: OperatorMatrix,
}

pub struct UnimodularityChecker {
    context: DifferentiationContext,
    algebra: MatrixAlgebra,
    settings: UnimodularSettings,
}

impl UnimodularityChecker {
    pub fn new(context: DifferentiationContext, settings: UnimodularSettings) -> Self {
        Self {
            context,
            algebra: MatrixAlgebra::new(settings.probe),
            settings,
        }
    }

    /// The inverse of `jacobian` if one of at most the ansatz degree exists
    /// and passes all three checks, `None` otherwise.
    pub fn check(&self, jacobian: &OperatorMatrix) -> Result<Option<UnimodularCertificate>> {
        let (n, cols) = jacobian.shape();
        if n != cols {
            return Err(FlatnessError::DimensionMismatch {
                operation: "unimodularity check (expects a square matrix)",
                left: jacobian.shape(),
                right: (n, n),
            });
        }
        let degree = self.settings.ansatz_degree;

        let params: Vec<Symbol> = (0..=degree)
            .flat_map(|k| {
                (0..n).flat_map(move |r| {
                    (0..n).map(move |c| Symbol::new(&format!("_a{k}_{r}_{c}")))
                })
            })
            .collect();
        let ansatz = OperatorMatrix {
            coefficients: (0..=degree)
                .map(|k| {
                    SymbolicMatrix::from_fn(n, n, |r, c| {
                        RationalFunction::from_symbol(params[(k * n + r) * n + c].clone())
                    })
                })
                .collect(),
        };

        // Coefficients of s^k in ansatz·J - I, one equation per entry.
        let product = ansatz.mul(jacobian, &self.context)?;
        let mut equations = Vec::new();
        for k in 0..=product.degree() {
            let mut c = product.coefficient(k);
            if k == 0 {
                c = c.sub(&SymbolicMatrix::identity(n))?;
            }
            equations.extend(c.entries().iter().cloned());
        }
        let equations = SymbolicMatrix::column_vector(equations).simplify();

        let zero: BTreeMap<Symbol, BigRational> =
            params.iter().map(|p| (p.clone(), BigRational::zero())).collect();
        let Some(offset) = equations.partial_eval(&zero).map(|m| m.simplify()) else {
            debug!("equations have a pole at the zero parameter vector");
            return Ok(None);
        };
        let system = equations.jacobian(&params)?.simplify();

        let (homogeneous, inhomogeneous): (Vec<usize>, Vec<usize>) =
            (0..offset.nrows()).partition(|&i| offset.get(i, 0).is_zero());
        debug!(
            unknowns = params.len(),
            homogeneous = homogeneous.len(),
            inhomogeneous = inhomogeneous.len(),
            "unimodularity equations"
        );

        // Parameter vectors solving the homogeneous part form the span of `family`.
        let family = self
            .algebra
            .right_orthogonal_complement(&system.select_rows(&homogeneous))?;
        let reduced = system.select_rows(&inhomogeneous).mul(&family)?.simplify();
        let rhs = offset.select_rows(&inhomogeneous).neg();
        let Some(weights) = self.algebra.solve_linear_system(&reduced, &rhs)? else {
            info!("no inverse within the ansatz degree");
            return Ok(None);
        };
        let solution = family.mul(&weights)?.simplify();

        let inverse = OperatorMatrix::new(
            (0..=degree)
                .map(|k| {
                    SymbolicMatrix::from_fn(n, n, |r, c| {
                        solution.get((k * n + r) * n + c, 0).clone()
                    })
                })
                .collect(),
        )?;

        if !self.verify(jacobian, &inverse)? {
            info!("candidate inverse failed verification");
            return Ok(None);
        }
        Ok(Some(UnimodularCertificate {
            inverse,
            jacobian: jacobian.clone(),
        }))
    }

    fn verify(&self, jacobian: &OperatorMatrix, inverse: &OperatorMatrix) -> Result<bool> {
        if !jacobian.mul(inverse, &self.context)?.is_identity(&self.algebra) {
            debug!("J·Inv is not the identity operator");
            return Ok(false);
        }

        // Act on generic test signals w(t).
        let n = jacobian.nrows();
        let names: Vec<String> = (1..=n).map(|i| format!("_w{i}")).collect();
        let signal_context = self.context.with_additional_states(&names)?;
        let w = SymbolicMatrix::column_vector(
            names
                .iter()
                .map(|name| RationalFunction::from_symbol(Symbol::new(name)))
                .collect(),
        );

        let round_trip = inverse.apply(&jacobian.apply(&w, &signal_context)?, &signal_context)?;
        if !self.algebra.is_zero_matrix(&round_trip.sub(&w)?.simplify()) {
            debug!("Inv(J(w)) differs from w");
            return Ok(false);
        }
        let round_trip = jacobian.apply(&inverse.apply(&w, &signal_context)?, &signal_context)?;
        if !self.algebra.is_zero_matrix(&round_trip.sub(&w)?.simplify()) {
            debug!("J(Inv(w)) differs from w");
            return Ok(false);
        }
        Ok(true)
    }
}
