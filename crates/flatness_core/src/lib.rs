//! The `flatness_core` crate computes differentially flat outputs of implicit
//! nonlinear systems `F(x, ẋ) = 0` with Franke's matrix-reduction algorithm.
//!
//! Key components:
//! - **Symbolic arithmetic**: exact multivariate `Polynomial`s and `RationalFunction`s over ℚ,
//!   collected in `SymbolicMatrix`.
//! - **Algebra**: `MatrixAlgebra` builds complements and pseudo-inverses exactly and decides
//!   rank, zero and unit questions by random substitution (`Prober`).
//! - **Reduction**: `ReductionEngine` drives the tangent pair `(P1_i, P0_i)` to its terminal
//!   iteration and records every step in an `IterationSequence`.
//! - **Unimodularity**: `UnimodularityChecker` searches for the inverse of a Lie–Bäcklund
//!   Jacobian with an operator ansatz in `s = d/dt`.
//! - **Collaborators**: an expression parser, model loading, an interactive construction
//!   strategy and a text printer.
pub mod algebra;
pub mod context;
pub mod equation_engine;
pub mod error;
pub mod iteration;
pub mod matrix;
pub mod model;
pub mod polynomial;
pub mod printer;
pub mod probe;
pub mod rational;
pub mod reduction;
pub mod strategy;
pub mod symbol;
pub mod tangent;
pub mod traits;
pub mod unimodular;
