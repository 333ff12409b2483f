use crate::algebra::MatrixAlgebra;
use crate::error::Result;
use crate::matrix::SymbolicMatrix;
use std::fmt;

/// Identifies a matrix of the run, e.g. `P1_roc[2]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixLabel {
    pub name: &'static str,
    pub iteration: usize,
}

impl MatrixLabel {
    pub fn new(name: &'static str, iteration: usize) -> Self {
        Self { name, iteration }
    }
}

impl fmt::Display for MatrixLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.iteration)
    }
}

/// Supplies the four complement / pseudo-inverse constructions the
/// reduction engine needs. Implementations may compute them, ask a user, or
/// replay recorded answers; whatever they return must satisfy the usual
/// identity (`M·C = 0`, `C·M = 0`, `M·R = I`, `L·M = I`).
pub trait MatrixConstructor {
    fn right_orthogonal_complement(
        &mut self,
        label: &MatrixLabel,
        m: &SymbolicMatrix,
        algebra: &MatrixAlgebra,
    ) -> Result<SymbolicMatrix>;

    fn left_orthogonal_complement(
        &mut self,
        label: &MatrixLabel,
        m: &SymbolicMatrix,
        algebra: &MatrixAlgebra,
    ) -> Result<SymbolicMatrix>;

    fn right_pseudo_inverse(
        &mut self,
        label: &MatrixLabel,
        m: &SymbolicMatrix,
        algebra: &MatrixAlgebra,
    ) -> Result<SymbolicMatrix>;

    fn left_pseudo_inverse(
        &mut self,
        label: &MatrixLabel,
        m: &SymbolicMatrix,
        algebra: &MatrixAlgebra,
    ) -> Result<SymbolicMatrix>;
}

/// Receives every matrix the engine stores.
pub trait MatrixPrinter {
    fn print_matrix(&mut self, label: &MatrixLabel, m: &SymbolicMatrix) -> std::io::Result<()>;
}
