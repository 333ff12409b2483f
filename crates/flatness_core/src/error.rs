use crate::matrix::SymbolicMatrix;
use thiserror::Error;

/// Fatal conditions of a flatness run.
///
/// None of these is retried: they either mean the model violates a
/// precondition of the reduction or that a post-construction check did not
/// hold. The offending matrices travel with the error for diagnosis.
#[derive(Debug, Error)]
pub enum FlatnessError {
    #[error(
        "P1 of iteration {iteration} does not have full row rank; \
         the implicit equations contain hidden algebraic constraints"
    )]
    AlgebraicConstraint {
        iteration: usize,
        p1: Box<SymbolicMatrix>,
    },

    #[error("B of iteration {iteration} is the zero matrix; the system is not flat")]
    NotFlat {
        iteration: usize,
        b: Box<SymbolicMatrix>,
    },

    #[error("{operation} needs rank {required}, but the {rows}x{cols} matrix has rank {found}")]
    SingularSystem {
        operation: &'static str,
        required: usize,
        found: usize,
        rows: usize,
        cols: usize,
        matrix: Box<SymbolicMatrix>,
    },

    #[error("combining matrix K of iteration {iteration} is not regular")]
    DegenerateCase {
        iteration: usize,
        k: Box<SymbolicMatrix>,
    },

    #[error("verification failed: {check}")]
    VerificationFailure {
        check: String,
        matrix: Box<SymbolicMatrix>,
    },

    #[error("dimension mismatch in {operation}: {left:?} vs {right:?}")]
    DimensionMismatch {
        operation: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("no terminal iteration within {limit} iterations")]
    IterationLimit { limit: usize },

    #[error("the reduction was aborted by an earlier error")]
    RunAborted,

    #[error("invalid symbol name \"{0}\"")]
    InvalidSymbol(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("interactive I/O failed: {0}")]
    Input(#[from] std::io::Error),
}

impl FlatnessError {
    pub(crate) fn verification(check: impl Into<String>, matrix: &SymbolicMatrix) -> Self {
        FlatnessError::VerificationFailure {
            check: check.into(),
            matrix: Box::new(matrix.clone()),
        }
    }
}

pub type Result<T, E = FlatnessError> = std::result::Result<T, E>;
