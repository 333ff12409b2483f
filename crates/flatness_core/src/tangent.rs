use crate::context::DifferentiationContext;
use crate::error::{FlatnessError, Result};
use crate::matrix::SymbolicMatrix;
use serde::Serialize;
use tracing::debug;

/// Linearization `P1(x, ẋ)·dẋ + P0(x, ẋ)·dx` of an implicit system `F(x, ẋ) = 0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TangentSystem {
    pub p1: SymbolicMatrix,
    pub p0: SymbolicMatrix,
}

impl TangentSystem {
    /// `P1 = ∂F/∂ẋ`, `P0 = ∂F/∂x`, one column per state component.
    pub fn from_equations(
        equations: &SymbolicMatrix,
        context: &DifferentiationContext,
    ) -> Result<Self> {
        if let Some(symbol) = equations
            .symbols()
            .into_iter()
            .find(|s| context.is_state(s) && s.order() > 1)
        {
            return Err(FlatnessError::InvalidSymbol(format!(
                "{symbol} (implicit equations may only involve x and its first derivative)"
            )));
        }

        let p1 = equations.jacobian(&context.state_derivatives(1))?.simplify();
        let p0 = equations.jacobian(&context.state_derivatives(0))?.simplify();
        debug!(
            equations = equations.nrows(),
            states = context.dimension(),
            "built tangent system"
        );
        Ok(Self { p1, p0 })
    }

    /// A directly supplied pair; same row count, one column per state.
    pub fn from_matrices(
        p1: SymbolicMatrix,
        p0: SymbolicMatrix,
        context: &DifferentiationContext,
    ) -> Result<Self> {
        let n = context.dimension();
        if p1.ncols() != n {
            return Err(FlatnessError::DimensionMismatch {
                operation: "tangent system P1 (columns must match the state dimension)",
                left: p1.shape(),
                right: (p1.nrows(), n),
            });
        }
        if p0.shape() != p1.shape() {
            return Err(FlatnessError::DimensionMismatch {
                operation: "tangent system P0 (must match the shape of P1)",
                left: p0.shape(),
                right: p1.shape(),
            });
        }
        Ok(Self {
            p1: p1.simplify(),
            p0: p0.simplify(),
        })
    }

    pub fn equations(&self) -> usize {
        self.p1.nrows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rational::RationalFunction;
    use crate::symbol::Symbol;

    fn var(name: &str, order: u32) -> RationalFunction {
        RationalFunction::from_symbol(Symbol::with_order(name, order))
    }

    fn matrix(rows: Vec<Vec<RationalFunction>>) -> SymbolicMatrix {
        SymbolicMatrix::from_rows(rows).expect("rectangular rows")
    }

    #[test]
    fn franke_example_three_tangent_pair() {
        let ctx = DifferentiationContext::new(&["x1", "x2", "x3"], &[] as &[&str]).expect("ctx");
        // F = x1_dot*x3 - x2*x3 - x1*x3_dot
        let f = &(&(&var("x1", 1) * &var("x3", 0)) - &(&var("x2", 0) * &var("x3", 0)))
            - &(&var("x1", 0) * &var("x3", 1));
        let tangent =
            TangentSystem::from_equations(&SymbolicMatrix::column_vector(vec![f]), &ctx)
                .expect("first order equations");

        let p1 = matrix(vec![vec![
            var("x3", 0),
            RationalFunction::zero(),
            (-&var("x1", 0)).simplify(),
        ]]);
        let p0 = matrix(vec![vec![
            (-&var("x3", 1)).simplify(),
            (-&var("x3", 0)).simplify(),
            (&var("x1", 1) - &var("x2", 0)).simplify(),
        ]]);
        assert_eq!(tangent.p1, p1);
        assert_eq!(tangent.p0, p0);
        assert_eq!(tangent.equations(), 1);
    }

    #[test]
    fn rejects_second_derivatives() {
        let ctx = DifferentiationContext::new(&["x"], &[] as &[&str]).expect("ctx");
        let f = SymbolicMatrix::column_vector(vec![var("x", 2)]);
        assert!(matches!(
            TangentSystem::from_equations(&f, &ctx),
            Err(FlatnessError::InvalidSymbol(_))
        ));
    }

    #[test]
    fn supplied_pair_is_shape_checked() {
        let ctx = DifferentiationContext::new(&["x1", "x2"], &[] as &[&str]).expect("ctx");
        let p1 = SymbolicMatrix::zeros(1, 2);
        assert!(TangentSystem::from_matrices(p1.clone(), SymbolicMatrix::zeros(1, 2), &ctx).is_ok());
        assert!(TangentSystem::from_matrices(p1, SymbolicMatrix::zeros(2, 2), &ctx).is_err());
        assert!(TangentSystem::from_matrices(
            SymbolicMatrix::zeros(1, 3),
            SymbolicMatrix::zeros(1, 3),
            &ctx
        )
        .is_err());
    }
}
