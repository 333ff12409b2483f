//! Loading a model into its differentiation context and initial tangent pair.

use crate::context::DifferentiationContext;
use crate::equation_engine::{parse_expression, parse_matrix};
use crate::iteration::IterationSequence;
use crate::matrix::SymbolicMatrix;
use crate::reduction::{ReductionEngine, ReductionSettings};
use crate::tangent::TangentSystem;
use anyhow::{bail, Context, Result};
use tracing::info;

/// A parsed model: the state vector, its parameters and `(P1_0, P0_0)`.
#[derive(Debug, Clone)]
pub struct FlatnessModel {
    context: DifferentiationContext,
    tangent: TangentSystem,
}

impl FlatnessModel {
    /// Builds the model from implicit equations `F(x, ẋ) = 0`, one string per row.
    ///
    /// Derivatives are written with a suffix: `x1_dot`, `x1_ddot`, `x1_d3`.
    pub fn from_equations<S, P, E>(states: &[S], parameters: &[P], equations: &[E]) -> Result<Self>
    where
        S: AsRef<str>,
        P: AsRef<str>,
        E: AsRef<str>,
    {
        if equations.is_empty() {
            bail!("Model has no equations.");
        }
        let context = DifferentiationContext::new(states, parameters)
            .context("Invalid state or parameter declaration.")?;

        let rows = equations
            .iter()
            .enumerate()
            .map(|(idx, eq)| {
                parse_expression(eq.as_ref(), &context)
                    .with_context(|| format!("Failed to parse equation {}.", idx + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        let tangent = TangentSystem::from_equations(&SymbolicMatrix::column_vector(rows), &context)
            .context("Failed to build the tangent system.")?;

        info!(
            states = context.dimension(),
            equations = tangent.equations(),
            "loaded model from implicit equations"
        );
        Ok(Self { context, tangent })
    }

    /// Builds the model from matrix literals for `P1_0` and `P0_0`.
    pub fn from_tangent_system<S, P>(
        states: &[S],
        parameters: &[P],
        p1: &str,
        p0: &str,
    ) -> Result<Self>
    where
        S: AsRef<str>,
        P: AsRef<str>,
    {
        let context = DifferentiationContext::new(states, parameters)
            .context("Invalid state or parameter declaration.")?;
        let p1 = parse_matrix(p1, &context).context("Failed to parse P1.")?;
        let p0 = parse_matrix(p0, &context).context("Failed to parse P0.")?;
        if p1.nrows() == 0 {
            bail!("P1 has no rows.");
        }
        let tangent = TangentSystem::from_matrices(p1, p0, &context)
            .context("Supplied tangent pair is inconsistent.")?;

        info!(
            states = context.dimension(),
            equations = tangent.equations(),
            "loaded model from tangent pair"
        );
        Ok(Self { context, tangent })
    }

    pub fn context(&self) -> &DifferentiationContext {
        &self.context
    }

    pub fn tangent(&self) -> &TangentSystem {
        &self.tangent
    }

    /// A fresh engine over this model with automatic constructions.
    pub fn engine<'a>(&self, settings: ReductionSettings) -> ReductionEngine<'a> {
        ReductionEngine::new(self.context.clone(), self.tangent.clone(), settings)
    }

    /// Runs the reduction to its terminal iteration.
    pub fn run(&self, settings: ReductionSettings) -> Result<IterationSequence> {
        let sequence = self
            .engine(settings)
            .run()
            .context("Flat-output reduction failed.")?;
        info!(iterations = sequence.len(), "reduction finished");
        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlatnessError;
    use crate::probe::ProbeSettings;

    fn settings() -> ReductionSettings {
        ReductionSettings {
            probe: ProbeSettings {
                seed: Some(7),
                ..ProbeSettings::default()
            },
            ..ReductionSettings::default()
        }
    }

    #[test]
    fn equations_and_literal_pair_agree() {
        let from_eq = FlatnessModel::from_equations(
            &["x1", "x2", "x3"],
            &[] as &[&str],
            &["x1_dot*x3 - x2*x3 - x1*x3_dot"],
        )
        .expect("model");
        let from_pair = FlatnessModel::from_tangent_system(
            &["x1", "x2", "x3"],
            &[] as &[&str],
            "[[x3, 0, -x1]]",
            "[[-x3_dot, -x3, -x2 + x1_dot]]",
        )
        .expect("model");
        assert_eq!(from_eq.tangent(), from_pair.tangent());
        assert_eq!(from_eq.context().dimension(), 3);
    }

    #[test]
    fn parameters_are_constant_in_the_tangent_system() {
        let model = FlatnessModel::from_equations(
            &["x1", "x2"],
            &["k"],
            &["x1_dot - k*x2", "x2_dot - x1"],
        )
        .expect("model");
        let ctx = model.context();
        assert_eq!(model.tangent().p1, parse_matrix("[[1, 0], [0, 1]]", ctx).expect("P1"));
        assert_eq!(model.tangent().p0, parse_matrix("[[0, -k], [-1, 0]]", ctx).expect("P0"));
    }

    #[test]
    fn run_reaches_terminal_iteration() {
        let model = FlatnessModel::from_equations(
            &["x1", "x2", "x3"],
            &[] as &[&str],
            &["x1_dot - x2", "x2_dot - x3"],
        )
        .expect("model");
        let sequence = model.run(settings()).expect("flat");
        assert_eq!(sequence.len(), 2);
        assert!(sequence.terminal().is_some());
    }

    #[test]
    fn run_failure_keeps_the_typed_error() {
        let model = FlatnessModel::from_tangent_system(
            &["x1", "x2"],
            &[] as &[&str],
            "[[1, 0]]",
            "[[x2, 0]]",
        )
        .expect("model");
        let err = model.run(settings()).expect_err("B = 0");
        assert!(matches!(
            err.downcast_ref::<FlatnessError>(),
            Some(FlatnessError::NotFlat { .. })
        ));
    }

    #[test]
    fn rejects_bad_input_with_context() {
        let err = FlatnessModel::from_equations(&["x1"], &[] as &[&str], &["x1_dot - y"])
            .expect_err("unknown identifier");
        assert!(err.to_string().contains("equation 1"));

        assert!(FlatnessModel::from_equations(&["x1"], &[] as &[&str], &[] as &[&str]).is_err());
        assert!(FlatnessModel::from_tangent_system(
            &["x1", "x2"],
            &[] as &[&str],
            "[[1, 0]]",
            "[[0]]"
        )
        .is_err());
    }
}
