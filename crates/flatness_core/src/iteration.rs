//! The per-iteration record of a reduction run.
//!
//! An [`IterationState`] is filled in dependency order while its iteration
//! runs and is frozen once it is pushed onto the [`IterationSequence`].
//! Downstream consumers only ever see the frozen sequence.

use crate::matrix::SymbolicMatrix;
use serde::Serialize;

/// Matrices derived in the reduction step.
#[derive(Debug, Clone, Serialize)]
pub struct ReductionMatrices {
    pub p1_roc: SymbolicMatrix,
    pub p1_rpinv: SymbolicMatrix,
    pub p1_dot: SymbolicMatrix,
    pub a: SymbolicMatrix,
    pub b: SymbolicMatrix,
    /// `None` when `B` has no left pseudo-inverse.
    pub b_lpinv: Option<SymbolicMatrix>,
}

/// Matrices of the rank-deficient path, where `B` lacks full column rank.
#[derive(Debug, Clone, Serialize)]
pub struct OutlierMatrices {
    pub k1: SymbolicMatrix,
    pub k2: SymbolicMatrix,
    pub b_tilde: SymbolicMatrix,
    pub b_tilde_lpinv: SymbolicMatrix,
    pub p1_tilde_roc: SymbolicMatrix,
    pub z: SymbolicMatrix,
    pub z_lpinv: SymbolicMatrix,
}

#[derive(Debug, Clone, Serialize)]
pub struct IterationState {
    index: usize,
    p1: SymbolicMatrix,
    p0: SymbolicMatrix,
    reduction: Option<ReductionMatrices>,
    outlier: Option<OutlierMatrices>,
    b_loc: Option<SymbolicMatrix>,
    is_terminal: bool,
}

impl IterationState {
    pub(crate) fn new(index: usize, p1: SymbolicMatrix, p0: SymbolicMatrix) -> Self {
        Self {
            index,
            p1,
            p0,
            reduction: None,
            outlier: None,
            b_loc: None,
            is_terminal: false,
        }
    }

    pub(crate) fn store_reduction(&mut self, reduction: ReductionMatrices) {
        self.reduction = Some(reduction);
    }

    pub(crate) fn store_outlier(&mut self, outlier: OutlierMatrices) {
        self.outlier = Some(outlier);
    }

    pub(crate) fn store_elimination(&mut self, b_loc: SymbolicMatrix) {
        self.b_loc = Some(b_loc);
    }

    pub(crate) fn mark_terminal(&mut self) {
        self.is_terminal = true;
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn p1(&self) -> &SymbolicMatrix {
        &self.p1
    }

    pub fn p0(&self) -> &SymbolicMatrix {
        &self.p0
    }

    pub fn reduction(&self) -> Option<&ReductionMatrices> {
        self.reduction.as_ref()
    }

    pub fn outlier(&self) -> Option<&OutlierMatrices> {
        self.outlier.as_ref()
    }

    pub fn b_loc(&self) -> Option<&SymbolicMatrix> {
        self.b_loc.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.is_terminal
    }

    /// Went through the rank-deficient path.
    pub fn is_outlier(&self) -> bool {
        self.outlier.is_some()
    }

    /// `B̃` on the rank-deficient path, `B` otherwise.
    pub fn effective_b(&self) -> Option<&SymbolicMatrix> {
        match (&self.outlier, &self.reduction) {
            (Some(outlier), _) => Some(&outlier.b_tilde),
            (None, Some(reduction)) => Some(&reduction.b),
            (None, None) => None,
        }
    }
}

/// Ordered, append-only trace of a run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct IterationSequence {
    states: Vec<IterationState>,
}

impl IterationSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, state: IterationState) {
        debug_assert_eq!(state.index, self.states.len());
        self.states.push(state);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&IterationState> {
        self.states.get(index)
    }

    pub fn last(&self) -> Option<&IterationState> {
        self.states.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IterationState> {
        self.states.iter()
    }

    /// The terminal state, once the run has reached it.
    pub fn terminal(&self) -> Option<&IterationState> {
        self.states.last().filter(|s| s.is_terminal)
    }
}

impl<'a> IntoIterator for &'a IterationSequence {
    type Item = &'a IterationState;
    type IntoIter = std::slice::Iter<'a, IterationState>;

    fn into_iter(self) -> Self::IntoIter {
        self.states.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_reports_terminal_only_when_marked() {
        let mut seq = IterationSequence::new();
        let mut first = IterationState::new(0, SymbolicMatrix::zeros(1, 2), SymbolicMatrix::zeros(1, 2));
        first.store_elimination(SymbolicMatrix::identity(1));
        seq.push(first);
        assert!(seq.terminal().is_none());

        let mut second = IterationState::new(1, SymbolicMatrix::zeros(1, 2), SymbolicMatrix::zeros(1, 2));
        second.mark_terminal();
        seq.push(second);
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.terminal().map(IterationState::index), Some(1));
        assert!(seq.get(0).and_then(IterationState::b_loc).is_some());
    }

    #[test]
    fn effective_b_prefers_the_outlier_matrix() {
        let mut state = IterationState::new(0, SymbolicMatrix::zeros(1, 3), SymbolicMatrix::zeros(1, 3));
        assert!(state.effective_b().is_none());
        state.store_reduction(ReductionMatrices {
            p1_roc: SymbolicMatrix::zeros(3, 2),
            p1_rpinv: SymbolicMatrix::zeros(3, 1),
            p1_dot: SymbolicMatrix::zeros(1, 3),
            a: SymbolicMatrix::zeros(1, 1),
            b: SymbolicMatrix::zeros(1, 2),
            b_lpinv: None,
        });
        assert_eq!(state.effective_b().map(SymbolicMatrix::shape), Some((1, 2)));
        state.store_outlier(OutlierMatrices {
            k1: SymbolicMatrix::zeros(2, 1),
            k2: SymbolicMatrix::zeros(2, 1),
            b_tilde: SymbolicMatrix::identity(1),
            b_tilde_lpinv: SymbolicMatrix::identity(1),
            p1_tilde_roc: SymbolicMatrix::zeros(3, 1),
            z: SymbolicMatrix::zeros(3, 1),
            z_lpinv: SymbolicMatrix::zeros(1, 3),
        });
        assert!(state.is_outlier());
        assert_eq!(state.effective_b(), Some(&SymbolicMatrix::identity(1)));
    }
}
