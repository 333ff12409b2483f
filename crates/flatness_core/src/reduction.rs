//! The iterative reduction of a tangent system towards flat outputs.
//!
//! Each iteration takes the pair `(P1_i, P0_i)` through
//!
//! 1. **reduce**: `A_i = (P0_i - Ṗ1_i)·P1_i⁺`, `B_i = (P0_i - Ṗ1_i)·P1_i^⊥`,
//! 2. **rank-deficient path** when `B_i` has dependent columns: `B_i` is
//!    recombined with a regular `K = [K1 | K2]` into a full-column-rank `B̃_i`,
//! 3. **termination** once `B_i` (or `B̃_i`) has full row rank,
//! 4. **elimination**: `P1_{i+1} = B_i^⊥ˡ`, `P0_{i+1} = B_i^⊥ˡ·A_i`.
//!
//! Every intermediate matrix lands in an [`IterationState`]; the finished
//! states form the [`IterationSequence`] handed to downstream consumers.

use crate::algebra::MatrixAlgebra;
use crate::context::DifferentiationContext;
use crate::error::{FlatnessError, Result};
use crate::iteration::{IterationSequence, IterationState, OutlierMatrices, ReductionMatrices};
use crate::matrix::SymbolicMatrix;
use crate::probe::ProbeSettings;
use crate::strategy::AutomaticConstructor;
use crate::tangent::TangentSystem;
use crate::traits::{MatrixConstructor, MatrixLabel, MatrixPrinter};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReductionSettings {
    /// Iterations started before the run gives up with `IterationLimit`.
    pub max_iterations: usize,
    pub probe: ProbeSettings,
}

impl Default for ReductionSettings {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            probe: ProbeSettings::default(),
        }
    }
}

/// Everything one run reads but never changes.
#[derive(Debug)]
pub struct RunContext {
    pub context: DifferentiationContext,
    pub algebra: MatrixAlgebra,
    pub settings: ReductionSettings,
}

impl RunContext {
    pub fn new(context: DifferentiationContext, settings: ReductionSettings) -> Self {
        Self {
            context,
            algebra: MatrixAlgebra::new(settings.probe),
            settings,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// An elimination produced the next pair.
    Continue,
    Terminal,
}

enum EngineState {
    Reducing(TangentSystem),
    Terminal,
    Failed,
}

pub struct ReductionEngine<'a> {
    run: RunContext,
    constructor: Box<dyn MatrixConstructor + 'a>,
    printer: Option<Box<dyn MatrixPrinter + 'a>>,
    state: EngineState,
    sequence: IterationSequence,
}

impl<'a> ReductionEngine<'a> {
    pub fn new(
        context: DifferentiationContext,
        tangent: TangentSystem,
        settings: ReductionSettings,
    ) -> Self {
        Self {
            run: RunContext::new(context, settings),
            constructor: Box::new(AutomaticConstructor),
            printer: None,
            state: EngineState::Reducing(tangent),
            sequence: IterationSequence::new(),
        }
    }

    pub fn with_constructor(mut self, constructor: Box<dyn MatrixConstructor + 'a>) -> Self {
        self.constructor = constructor;
        self
    }

    pub fn with_printer(mut self, printer: Box<dyn MatrixPrinter + 'a>) -> Self {
        self.printer = Some(printer);
        self
    }

    pub fn run_context(&self) -> &RunContext {
        &self.run
    }

    pub fn sequence(&self) -> &IterationSequence {
        &self.sequence
    }

    pub fn into_sequence(self) -> IterationSequence {
        self.sequence
    }

    /// `true` once the run reached its terminal iteration or failed.
    pub fn is_done(&self) -> bool {
        !matches!(self.state, EngineState::Reducing(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, EngineState::Terminal)
    }

    /// Runs to the terminal iteration.
    pub fn run(mut self) -> Result<IterationSequence> {
        while self.step()? == StepOutcome::Continue {}
        Ok(self.sequence)
    }

    /// Performs one full iteration. After an error the engine stays failed
    /// and every further step returns [`FlatnessError::RunAborted`].
    pub fn step(&mut self) -> Result<StepOutcome> {
        let tangent = match std::mem::replace(&mut self.state, EngineState::Failed) {
            EngineState::Reducing(tangent) => tangent,
            EngineState::Terminal => {
                self.state = EngineState::Terminal;
                return Ok(StepOutcome::Terminal);
            }
            EngineState::Failed => return Err(FlatnessError::RunAborted),
        };

        let index = self.sequence.len();
        if index >= self.run.settings.max_iterations {
            return Err(FlatnessError::IterationLimit {
                limit: self.run.settings.max_iterations,
            });
        }

        let (state, next) = self.iterate(index, tangent)?;
        self.sequence.push(state);
        match next {
            Some(tangent) => {
                self.state = EngineState::Reducing(tangent);
                Ok(StepOutcome::Continue)
            }
            None => {
                self.state = EngineState::Terminal;
                Ok(StepOutcome::Terminal)
            }
        }
    }

    fn iterate(
        &mut self,
        index: usize,
        tangent: TangentSystem,
    ) -> Result<(IterationState, Option<TangentSystem>)> {
        let TangentSystem { p1, p0 } = tangent;
        info!(
            iteration = index,
            rows = p1.nrows(),
            cols = p1.ncols(),
            "reducing"
        );
        self.report("P1", index, &p1)?;
        self.report("P0", index, &p0)?;

        if !self.run.algebra.has_full_row_rank(&p1) {
            return Err(FlatnessError::AlgebraicConstraint {
                iteration: index,
                p1: Box::new(p1),
            });
        }

        let mut state = IterationState::new(index, p1.clone(), p0.clone());
        let reduction = self.reduce(index, &p1, &p0)?;
        let b = reduction.b.clone();
        let a = reduction.a.clone();
        let (p1_roc, p1_rpinv) = (reduction.p1_roc.clone(), reduction.p1_rpinv.clone());
        state.store_reduction(reduction);

        if self.run.algebra.is_zero_matrix(&b) {
            return Err(FlatnessError::NotFlat {
                iteration: index,
                b: Box::new(b),
            });
        }

        let effective_b = if self.run.algebra.symbolic_rank(&b) < b.ncols() {
            info!(iteration = index, "B has dependent columns, taking the rank-deficient path");
            let outlier = self.rank_deficient(index, &b, &p1_roc, &p1_rpinv)?;
            let b_tilde = outlier.b_tilde.clone();
            state.store_outlier(outlier);
            b_tilde
        } else {
            b.clone()
        };

        if self.run.algebra.has_full_row_rank(&effective_b) {
            info!(iteration = index, "terminal iteration reached");
            state.mark_terminal();
            return Ok((state, None));
        }

        let b_loc = self.constructor.left_orthogonal_complement(
            &MatrixLabel::new("B", index),
            &b,
            &self.run.algebra,
        )?;
        let next_p0 = b_loc.mul(&a)?.simplify();
        self.report("B_loc", index, &b_loc)?;
        info!(
            iteration = index,
            next_rows = b_loc.nrows(),
            next_cols = b_loc.ncols(),
            "eliminated"
        );
        state.store_elimination(b_loc.clone());

        Ok((
            state,
            Some(TangentSystem {
                p1: b_loc,
                p0: next_p0,
            }),
        ))
    }

    fn reduce(
        &mut self,
        index: usize,
        p1: &SymbolicMatrix,
        p0: &SymbolicMatrix,
    ) -> Result<ReductionMatrices> {
        let label = MatrixLabel::new("P1", index);
        let algebra = &self.run.algebra;
        let p1_roc = self
            .constructor
            .right_orthogonal_complement(&label, p1, algebra)?;
        let p1_rpinv = self.constructor.right_pseudo_inverse(&label, p1, algebra)?;
        let p1_dot = algebra.time_derivative(p1, &self.run.context);

        let residual = p0.sub(&p1_dot)?;
        let a = residual.mul(&p1_rpinv)?.simplify();
        let b = residual.mul(&p1_roc)?.simplify();
        let b_lpinv = if algebra.has_full_column_rank(&b) {
            match self
                .constructor
                .left_pseudo_inverse(&MatrixLabel::new("B", index), &b, algebra)
            {
                Ok(l) => Some(l),
                Err(err @ FlatnessError::SingularSystem { .. }) => {
                    debug!(iteration = index, %err, "B has no left pseudo-inverse");
                    None
                }
                Err(err) => return Err(err),
            }
        } else {
            debug!(iteration = index, "B has dependent columns, no left pseudo-inverse");
            None
        };

        self.report("P1_roc", index, &p1_roc)?;
        self.report("P1_rpinv", index, &p1_rpinv)?;
        self.report("P1_dot", index, &p1_dot)?;
        self.report("A", index, &a)?;
        self.report("B", index, &b)?;
        if let Some(l) = &b_lpinv {
            self.report("B_lpinv", index, l)?;
        }

        Ok(ReductionMatrices {
            p1_roc,
            p1_rpinv,
            p1_dot,
            a,
            b,
            b_lpinv,
        })
    }

    fn rank_deficient(
        &mut self,
        index: usize,
        b: &SymbolicMatrix,
        p1_roc: &SymbolicMatrix,
        p1_rpinv: &SymbolicMatrix,
    ) -> Result<OutlierMatrices> {
        let algebra = &self.run.algebra;
        let b_label = MatrixLabel::new("B", index);

        let k2 = self
            .constructor
            .right_orthogonal_complement(&b_label, b, algebra)?;
        let k1 = if algebra.has_full_row_rank(b) {
            self.constructor.right_pseudo_inverse(&b_label, b, algebra)?
        } else {
            self.constructor.right_orthogonal_complement(
                &MatrixLabel::new("K2^T", index),
                &k2.transpose(),
                algebra,
            )?
        };

        let k = k1.concat_cols(&k2)?;
        if !algebra.is_regular_matrix(&k) {
            return Err(FlatnessError::DegenerateCase {
                iteration: index,
                k: Box::new(k),
            });
        }

        let b_tilde = b.mul(&k1)?.simplify();
        let b_tilde_lpinv = self.constructor.left_pseudo_inverse(
            &MatrixLabel::new("B_tilde", index),
            &b_tilde,
            algebra,
        )?;
        let p1_tilde_roc = p1_roc.mul(&k1)?.simplify();
        let z = p1_roc.mul(&k2)?.simplify();
        let z_lpinv = algebra.restricted_left_pseudo_inverse(p1_rpinv, &p1_tilde_roc, &z)?;

        self.report("K1", index, &k1)?;
        self.report("K2", index, &k2)?;
        self.report("B_tilde", index, &b_tilde)?;
        self.report("B_tilde_lpinv", index, &b_tilde_lpinv)?;
        self.report("P1_tilde_roc", index, &p1_tilde_roc)?;
        self.report("Z", index, &z)?;
        self.report("Z_lpinv", index, &z_lpinv)?;

        Ok(OutlierMatrices {
            k1,
            k2,
            b_tilde,
            b_tilde_lpinv,
            p1_tilde_roc,
            z,
            z_lpinv,
        })
    }

    fn report(&mut self, name: &'static str, index: usize, m: &SymbolicMatrix) -> Result<()> {
        if let Some(printer) = self.printer.as_mut() {
            printer.print_matrix(&MatrixLabel::new(name, index), m)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation_engine::{parse_expression, parse_matrix};
    use crate::printer::TextPrinter;

    fn settings() -> ReductionSettings {
        ReductionSettings {
            probe: ProbeSettings {
                seed: Some(42),
                ..ProbeSettings::default()
            },
            ..ReductionSettings::default()
        }
    }

    fn context(states: &[&str]) -> DifferentiationContext {
        DifferentiationContext::new(states, &[] as &[&str]).expect("ctx")
    }

    fn equations(ctx: &DifferentiationContext, rows: &[&str]) -> SymbolicMatrix {
        SymbolicMatrix::column_vector(
            rows.iter()
                .map(|r| parse_expression(r, ctx).expect("equation"))
                .collect(),
        )
    }

    fn engine_for<'a>(ctx: &DifferentiationContext, rows: &[&str]) -> ReductionEngine<'a> {
        let tangent = TangentSystem::from_equations(&equations(ctx, rows), ctx).expect("tangent");
        ReductionEngine::new(ctx.clone(), tangent, settings())
    }

    #[test]
    fn franke_example_three_terminates_through_rank_deficient_path() {
        let ctx = context(&["x1", "x2", "x3"]);
        let sequence = engine_for(&ctx, &["x1_dot*x3 - x2*x3 - x1*x3_dot"])
            .run()
            .expect("flat");

        assert_eq!(sequence.len(), 1);
        let state = sequence.terminal().expect("terminal state");
        assert_eq!(state.p1(), &parse_matrix("[[x3, 0, -x1]]", &ctx).expect("P1"));
        assert_eq!(state.p0(), &parse_matrix("[[-x3_dot, -x3, -x2 + x1_dot]]", &ctx).expect("P0"));

        let reduction = state.reduction().expect("reduced");
        assert_eq!(reduction.b.shape(), (1, 2));
        assert!(reduction.b_lpinv.is_none());

        assert!(state.is_outlier());
        let outlier = state.outlier().expect("rank-deficient path");
        let algebra = MatrixAlgebra::new(settings().probe);
        assert!(algebra.is_unit_matrix(&outlier.b_tilde));
        assert!(algebra.is_unit_matrix(&outlier.z_lpinv.mul(&outlier.z).expect("shapes")));
        assert!(algebra.is_zero_matrix(&outlier.z_lpinv.mul(&outlier.p1_tilde_roc).expect("shapes")));
        assert!(state.b_loc().is_none());
    }

    #[test]
    fn integrator_chain_eliminates_once() {
        let ctx = context(&["x1", "x2", "x3"]);
        let mut engine = engine_for(&ctx, &["x1_dot - x2", "x2_dot - x3"]);

        assert_eq!(engine.step().expect("first iteration"), StepOutcome::Continue);
        assert!(!engine.is_done());
        let first = engine.sequence().get(0).expect("iteration 0");
        assert!(!first.is_terminal());
        assert!(!first.is_outlier());
        assert_eq!(first.b_loc(), Some(&parse_matrix("[[1, 0]]", &ctx).expect("B_loc")));

        assert_eq!(engine.step().expect("second iteration"), StepOutcome::Terminal);
        assert!(engine.is_done());
        assert!(engine.is_terminal());
        let last = engine.sequence().terminal().expect("terminal");
        assert_eq!(last.index(), 1);
        assert_eq!(last.p1(), &parse_matrix("[[1, 0]]", &ctx).expect("P1"));
        assert_eq!(last.p0(), &parse_matrix("[[0, -1]]", &ctx).expect("P0"));

        // Further steps keep reporting the terminal state.
        assert_eq!(engine.step().expect("idempotent"), StepOutcome::Terminal);
        assert_eq!(engine.sequence().len(), 2);
    }

    #[test]
    fn zero_b_is_not_flat() {
        let ctx = context(&["x1", "x2"]);
        let tangent = TangentSystem::from_matrices(
            parse_matrix("[[1, 0]]", &ctx).expect("P1"),
            parse_matrix("[[x2, 0]]", &ctx).expect("P0"),
            &ctx,
        )
        .expect("pair");
        let mut engine = ReductionEngine::new(ctx, tangent, settings());
        let err = engine.step().expect_err("B = 0");
        assert!(matches!(err, FlatnessError::NotFlat { iteration: 0, .. }));
        assert!(engine.sequence().is_empty());
        assert!(engine.is_done());
        assert!(matches!(engine.step(), Err(FlatnessError::RunAborted)));
    }

    #[test]
    fn dependent_equations_are_algebraic_constraints() {
        let ctx = context(&["x1", "x2"]);
        let tangent = TangentSystem::from_matrices(
            parse_matrix("[[1, 0], [x1, 0]]", &ctx).expect("P1"),
            SymbolicMatrix::zeros(2, 2),
            &ctx,
        )
        .expect("pair");
        let err = ReductionEngine::new(ctx, tangent, settings())
            .run()
            .expect_err("rank 1 < 2 rows");
        assert!(matches!(err, FlatnessError::AlgebraicConstraint { iteration: 0, .. }));
    }

    #[test]
    fn iteration_cap_stops_the_run() {
        let ctx = context(&["x1", "x2", "x3"]);
        let tangent = TangentSystem::from_equations(
            &equations(&ctx, &["x1_dot - x2", "x2_dot - x3"]),
            &ctx,
        )
        .expect("tangent");
        let capped = ReductionSettings {
            max_iterations: 1,
            ..settings()
        };
        let err = ReductionEngine::new(ctx, tangent, capped)
            .run()
            .expect_err("needs two iterations");
        assert!(matches!(err, FlatnessError::IterationLimit { limit: 1 }));
    }

    #[test]
    fn printer_sees_every_stored_matrix() {
        let ctx = context(&["x1", "x2", "x3"]);
        let mut buffer = Vec::new();
        {
            let engine = engine_for(&ctx, &["x1_dot - x2", "x2_dot - x3"])
                .with_printer(Box::new(TextPrinter::new(&mut buffer)));
            engine.run().expect("flat");
        }
        let text = String::from_utf8(buffer).expect("utf8");
        for label in ["P1[0]", "P1_roc[0]", "A[0]", "B[0]", "B_loc[0]", "P1[1]", "B[1]"] {
            assert!(text.contains(label), "missing {label}");
        }
        assert!(!text.contains("B_loc[1]"));
    }

    #[test]
    fn regular_p1_leaves_no_inputs() {
        // ẋ = x: B has no columns and counts as zero.
        let ctx = context(&["x"]);
        let err = engine_for(&ctx, &["x_dot - x"]).run().expect_err("no free input");
        assert!(matches!(err, FlatnessError::NotFlat { .. }));
    }

    fn pair(ctx: &DifferentiationContext, p1: &str, p0: &str) -> TangentSystem {
        TangentSystem::from_matrices(
            parse_matrix(p1, ctx).expect("P1"),
            parse_matrix(p0, ctx).expect("P0"),
            ctx,
        )
        .expect("pair")
    }

    #[test]
    fn small_high_degree_b_is_not_mistaken_for_zero() {
        let ctx = context(&["x1", "x2"]);
        for seed in 0..20 {
            let settings = ReductionSettings {
                probe: ProbeSettings {
                    seed: Some(seed),
                    ..ProbeSettings::default()
                },
                ..ReductionSettings::default()
            };
            let sequence = ReductionEngine::new(
                ctx.clone(),
                pair(&ctx, "[[1, 0]]", "[[0, 1/(x1^3*x2^3)]]"),
                settings,
            )
            .run()
            .unwrap_or_else(|err| panic!("seed {seed}: {err}"));
            assert_eq!(sequence.len(), 1, "seed {seed}");
        }
    }

    #[test]
    fn rank_deficient_b_without_full_row_rank_is_eliminated() {
        let ctx = context(&["x1", "x2", "x3", "x4", "x5"]);
        let tangent = pair(
            &ctx,
            "[[1, 0, 0, 0, 0], [0, 1, 0, 0, 0]]",
            "[[0, 0, x3, x4, 0], [0, x1, x3, x4, 0]]",
        );
        let sequence = ReductionEngine::new(ctx.clone(), tangent, settings())
            .run()
            .expect("flat");
        assert_eq!(sequence.len(), 2);

        let first = sequence.get(0).expect("iteration 0");
        assert!(first.is_outlier());
        assert!(!first.is_terminal());
        let algebra = MatrixAlgebra::new(settings().probe);
        let outlier = first.outlier().expect("rank-deficient path");
        assert_eq!(outlier.k1.shape(), (3, 1));
        assert_eq!(outlier.k2.shape(), (3, 2));
        assert_eq!(outlier.b_tilde.shape(), (2, 1));
        assert!(!algebra.has_full_row_rank(&outlier.b_tilde));
        assert!(algebra.is_unit_matrix(&outlier.z_lpinv.mul(&outlier.z).expect("shapes")));
        assert!(algebra.is_zero_matrix(&outlier.z_lpinv.mul(&outlier.p1_tilde_roc).expect("shapes")));
        assert_eq!(first.b_loc(), Some(&parse_matrix("[[-1, 1]]", &ctx).expect("B_loc")));

        let last = sequence.terminal().expect("terminal");
        assert_eq!(last.index(), 1);
        assert_eq!(last.p1(), &parse_matrix("[[-1, 1]]", &ctx).expect("P1"));
        assert_eq!(last.p0(), &parse_matrix("[[0, x1]]", &ctx).expect("P0"));
    }

    /// Automatic constructions, except that `B⁺` is replaced by `B^⊥` and
    /// every left pseudo-inverse request is recorded.
    struct SkewedConstructor<'r> {
        replace_rpinv_of_b: bool,
        left_inverse_labels: &'r mut Vec<String>,
    }

    impl MatrixConstructor for SkewedConstructor<'_> {
        fn right_orthogonal_complement(
            &mut self,
            label: &MatrixLabel,
            m: &SymbolicMatrix,
            algebra: &MatrixAlgebra,
        ) -> Result<SymbolicMatrix> {
            AutomaticConstructor.right_orthogonal_complement(label, m, algebra)
        }

        fn left_orthogonal_complement(
            &mut self,
            label: &MatrixLabel,
            m: &SymbolicMatrix,
            algebra: &MatrixAlgebra,
        ) -> Result<SymbolicMatrix> {
            AutomaticConstructor.left_orthogonal_complement(label, m, algebra)
        }

        fn right_pseudo_inverse(
            &mut self,
            label: &MatrixLabel,
            m: &SymbolicMatrix,
            algebra: &MatrixAlgebra,
        ) -> Result<SymbolicMatrix> {
            if self.replace_rpinv_of_b && label.name == "B" {
                return AutomaticConstructor.right_orthogonal_complement(label, m, algebra);
            }
            AutomaticConstructor.right_pseudo_inverse(label, m, algebra)
        }

        fn left_pseudo_inverse(
            &mut self,
            label: &MatrixLabel,
            m: &SymbolicMatrix,
            algebra: &MatrixAlgebra,
        ) -> Result<SymbolicMatrix> {
            self.left_inverse_labels.push(label.to_string());
            AutomaticConstructor.left_pseudo_inverse(label, m, algebra)
        }
    }

    #[test]
    fn singular_k_is_a_degenerate_case() {
        let ctx = context(&["x1", "x2", "x3"]);
        let mut labels = Vec::new();
        let constructor = SkewedConstructor {
            replace_rpinv_of_b: true,
            left_inverse_labels: &mut labels,
        };
        let err = engine_for(&ctx, &["x1_dot*x3 - x2*x3 - x1*x3_dot"])
            .with_constructor(Box::new(constructor))
            .run()
            .expect_err("K = [K2 | K2]");
        assert!(matches!(err, FlatnessError::DegenerateCase { iteration: 0, .. }));
    }

    #[test]
    fn left_pseudo_inverses_go_through_the_constructor() {
        let ctx = context(&["x1", "x2", "x3"]);
        let mut labels = Vec::new();
        engine_for(&ctx, &["x1_dot*x3 - x2*x3 - x1*x3_dot"])
            .with_constructor(Box::new(SkewedConstructor {
                replace_rpinv_of_b: false,
                left_inverse_labels: &mut labels,
            }))
            .run()
            .expect("flat");
        // B (1x2) has dependent columns, so only B_tilde is asked for.
        assert_eq!(labels, vec!["B_tilde[0]".to_string()]);

        let mut labels = Vec::new();
        engine_for(&ctx, &["x1_dot - x2", "x2_dot - x3"])
            .with_constructor(Box::new(SkewedConstructor {
                replace_rpinv_of_b: false,
                left_inverse_labels: &mut labels,
            }))
            .run()
            .expect("flat");
        assert_eq!(labels, vec!["B[0]".to_string(), "B[1]".to_string()]);
    }
}
