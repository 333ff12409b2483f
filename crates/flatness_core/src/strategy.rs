//! Construction strategies for complements and pseudo-inverses.

use crate::algebra::MatrixAlgebra;
use crate::context::DifferentiationContext;
use crate::equation_engine::parse_matrix;
use crate::error::{FlatnessError, Result};
use crate::matrix::SymbolicMatrix;
use crate::traits::{MatrixConstructor, MatrixLabel};
use std::io::{self, BufRead, Write};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Construction {
    RightComplement,
    LeftComplement,
    RightInverse,
    LeftInverse,
}

impl Construction {
    pub fn describe(self) -> &'static str {
        match self {
            Construction::RightComplement => "right orthogonal complement",
            Construction::LeftComplement => "left orthogonal complement",
            Construction::RightInverse => "right pseudo-inverse",
            Construction::LeftInverse => "left pseudo-inverse",
        }
    }

    pub fn compute(self, algebra: &MatrixAlgebra, m: &SymbolicMatrix) -> Result<SymbolicMatrix> {
        match self {
            Construction::RightComplement => algebra.right_orthogonal_complement(m),
            Construction::LeftComplement => algebra.left_orthogonal_complement(m),
            Construction::RightInverse => algebra.right_pseudo_inverse(m),
            Construction::LeftInverse => algebra.left_pseudo_inverse(m),
        }
    }

    /// Checks a user-supplied candidate; the error text is shown before re-prompting.
    pub fn verify(
        self,
        algebra: &MatrixAlgebra,
        m: &SymbolicMatrix,
        candidate: &SymbolicMatrix,
    ) -> std::result::Result<(), String> {
        let (n, p) = m.shape();
        let rank = algebra.symbolic_rank(m);
        match self {
            Construction::RightComplement => {
                expect_shape(candidate, (p, p.saturating_sub(rank)))?;
                let product = m.mul(candidate).map_err(|e| e.to_string())?;
                if !algebra.is_zero_matrix(&product) {
                    return Err(format!("M·C = {product} is not zero"));
                }
                if !algebra.has_full_column_rank(candidate) {
                    return Err("the columns of C are linearly dependent".to_string());
                }
            }
            Construction::LeftComplement => {
                expect_shape(candidate, (n.saturating_sub(rank), n))?;
                let product = candidate.mul(m).map_err(|e| e.to_string())?;
                if !algebra.is_zero_matrix(&product) {
                    return Err(format!("C·M = {product} is not zero"));
                }
                if !algebra.has_full_row_rank(candidate) {
                    return Err("the rows of C are linearly dependent".to_string());
                }
            }
            Construction::RightInverse => {
                expect_shape(candidate, (p, n))?;
                let product = m.mul(candidate).map_err(|e| e.to_string())?.simplify();
                if !algebra.is_unit_matrix(&product) {
                    return Err(format!("M·R = {product} is not the unit matrix"));
                }
            }
            Construction::LeftInverse => {
                expect_shape(candidate, (p, n))?;
                let product = candidate.mul(m).map_err(|e| e.to_string())?.simplify();
                if !algebra.is_unit_matrix(&product) {
                    return Err(format!("L·M = {product} is not the unit matrix"));
                }
            }
        }
        Ok(())
    }
}

fn expect_shape(candidate: &SymbolicMatrix, shape: (usize, usize)) -> std::result::Result<(), String> {
    if candidate.shape() == shape {
        Ok(())
    } else {
        Err(format!(
            "expected a {}x{} matrix, got {}x{}",
            shape.0,
            shape.1,
            candidate.nrows(),
            candidate.ncols()
        ))
    }
}

/// Computes every construction with [`MatrixAlgebra`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AutomaticConstructor;

impl AutomaticConstructor {
    fn build(
        &self,
        construction: Construction,
        label: &MatrixLabel,
        m: &SymbolicMatrix,
        algebra: &MatrixAlgebra,
    ) -> Result<SymbolicMatrix> {
        let result = construction.compute(algebra, m)?;
        debug!(
            %label,
            construction = construction.describe(),
            rows = result.nrows(),
            cols = result.ncols(),
            "constructed"
        );
        Ok(result)
    }
}

impl MatrixConstructor for AutomaticConstructor {
    fn right_orthogonal_complement(
        &mut self,
        label: &MatrixLabel,
        m: &SymbolicMatrix,
        algebra: &MatrixAlgebra,
    ) -> Result<SymbolicMatrix> {
        self.build(Construction::RightComplement, label, m, algebra)
    }

    fn left_orthogonal_complement(
        &mut self,
        label: &MatrixLabel,
        m: &SymbolicMatrix,
        algebra: &MatrixAlgebra,
    ) -> Result<SymbolicMatrix> {
        self.build(Construction::LeftComplement, label, m, algebra)
    }

    fn right_pseudo_inverse(
        &mut self,
        label: &MatrixLabel,
        m: &SymbolicMatrix,
        algebra: &MatrixAlgebra,
    ) -> Result<SymbolicMatrix> {
        self.build(Construction::RightInverse, label, m, algebra)
    }

    fn left_pseudo_inverse(
        &mut self,
        label: &MatrixLabel,
        m: &SymbolicMatrix,
        algebra: &MatrixAlgebra,
    ) -> Result<SymbolicMatrix> {
        self.build(Construction::LeftInverse, label, m, algebra)
    }
}

/// Asks for every construction on `output` and reads the answer from `input`.
///
/// An answer is either `auto` (compute it) or a matrix literal such as
/// `[[1, 0], [0, x1]]`. Literals that fail to parse or to verify are
/// reported and asked for again.
pub struct InteractiveConstructor<R, W> {
    context: DifferentiationContext,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> InteractiveConstructor<R, W> {
    pub fn new(context: DifferentiationContext, input: R, output: W) -> Self {
        Self {
            context,
            input,
            output,
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn ask(
        &mut self,
        construction: Construction,
        label: &MatrixLabel,
        m: &SymbolicMatrix,
        algebra: &MatrixAlgebra,
    ) -> Result<SymbolicMatrix> {
        writeln!(self.output, "{label}: {} of", construction.describe())?;
        writeln!(self.output, "  {m}")?;
        loop {
            write!(self.output, "matrix literal or 'auto' > ")?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(FlatnessError::Input(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("no answer for {label}"),
                )));
            }
            let answer = line.trim();
            if answer.is_empty() {
                continue;
            }
            if answer.eq_ignore_ascii_case("auto") {
                return construction.compute(algebra, m);
            }

            let candidate = match parse_matrix(answer, &self.context) {
                Ok(candidate) => candidate,
                Err(err) => {
                    writeln!(self.output, "{err}")?;
                    continue;
                }
            };
            match construction.verify(algebra, m, &candidate) {
                Ok(()) => return Ok(candidate),
                Err(reason) => {
                    warn!(%label, %reason, "rejected user-supplied matrix");
                    writeln!(self.output, "rejected: {reason}")?;
                }
            }
        }
    }
}

impl<R: BufRead, W: Write> MatrixConstructor for InteractiveConstructor<R, W> {
    fn right_orthogonal_complement(
        &mut self,
        label: &MatrixLabel,
        m: &SymbolicMatrix,
        algebra: &MatrixAlgebra,
    ) -> Result<SymbolicMatrix> {
        self.ask(Construction::RightComplement, label, m, algebra)
    }

    fn left_orthogonal_complement(
        &mut self,
        label: &MatrixLabel,
        m: &SymbolicMatrix,
        algebra: &MatrixAlgebra,
    ) -> Result<SymbolicMatrix> {
        self.ask(Construction::LeftComplement, label, m, algebra)
    }

    fn right_pseudo_inverse(
        &mut self,
        label: &MatrixLabel,
        m: &SymbolicMatrix,
        algebra: &MatrixAlgebra,
    ) -> Result<SymbolicMatrix> {
        self.ask(Construction::RightInverse, label, m, algebra)
    }

    fn left_pseudo_inverse(
        &mut self,
        label: &MatrixLabel,
        m: &SymbolicMatrix,
        algebra: &MatrixAlgebra,
    ) -> Result<SymbolicMatrix> {
        self.ask(Construction::LeftInverse, label, m, algebra)
    }
}
