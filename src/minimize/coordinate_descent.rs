use crate::minimize::{
    MinimizerError, MinimizerWarning,
    convergence::ConvergenceTest,
    iteration::{IterationState, Minimizer, Trial},
    line_search::{LineSearch, line_search_from_kind, line_search_trial},
    objective::Evaluator,
    options::{LineSearchKind, LineSearchParams},
};
use ndarray::prelude::*;
use std::fmt;

/// Back-and-forth coordinate descent.
///
/// Each iteration searches along a single axis, p = -g_i e_i. The axes are
/// visited 0, 1, ..., n-1 and then back down n-2, ..., 1 before the cycle
/// repeats.
///
/// The convergence test compares f across a complete sweep of the cycle
/// rather than across a single axis.
pub struct CoordinateDescent {
    line_search: Box<dyn LineSearch>,
    params: LineSearchParams,
    position: usize,
    /// Last accepted step length along each axis
    steps: Vec<f64>,
    /// f at the start of the current sweep
    sweep_f: Option<f64>,
    sweep_closed: bool,
    warning: Option<MinimizerWarning>,
}

impl CoordinateDescent {
    pub fn new(line_search: LineSearchKind, params: &LineSearchParams) -> Self {
        CoordinateDescent {
            line_search: line_search_from_kind(line_search, params),
            params: *params,
            position: 0,
            steps: Vec::new(),
            sweep_f: None,
            sweep_closed: false,
            warning: None,
        }
    }

    /// Number of positions in one back-and-forth sweep
    pub fn period(n: usize) -> usize {
        if n <= 1 { 1 } else { 2 * (n - 1) }
    }

    /// Axis visited at a position of the back-and-forth cycle
    pub fn axis(position: usize, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        let period = CoordinateDescent::period(n);
        let p = position % period;
        if p < n { p } else { period - p }
    }
}

impl Default for CoordinateDescent {
    fn default() -> Self {
        CoordinateDescent::new(LineSearchKind::Backtrack, &LineSearchParams::default())
    }
}

impl fmt::Debug for CoordinateDescent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinateDescent")
            .field("line_search", &self.line_search.kind())
            .field("position", &self.position)
            .finish()
    }
}

impl Minimizer for CoordinateDescent {
    fn name(&self) -> String {
        format!("Back-and-forth coordinate descent ({})", self.line_search.kind())
    }

    fn setup(&mut self, _eval: &mut Evaluator, state: &mut IterationState) -> Result<(), MinimizerError> {
        self.position = 0;
        self.steps = vec![self.params.a0; state.xk.len()];
        self.sweep_f = Some(state.fk);
        self.sweep_closed = false;
        self.warning = None;
        Ok(())
    }

    fn step(&mut self, eval: &mut Evaluator, state: &IterationState) -> Result<Trial, MinimizerError> {
        let n = state.xk.len();
        if self.steps.len() != n {
            self.steps = vec![self.params.a0; n];
        }
        let period = CoordinateDescent::period(n);
        let sweep = self.position / period;

        // Skip axes along which f is flat. A zero gradient is handled by the line search trial.
        let mut axis = CoordinateDescent::axis(self.position, n);
        for _ in 0..2 * n {
            if state.dfk[axis] * state.dfk[axis] != 0.0 {
                break;
            }
            self.position += 1;
            axis = CoordinateDescent::axis(self.position, n);
        }
        self.position += 1;
        self.sweep_closed = self.position / period > sweep;

        let mut pk = Array1::zeros(n);
        pk[axis] = -state.dfk[axis];
        // Along p = -g_i e_i the exact step is 1 / H_ii whatever the size of g_i,
        // so the last step on the same axis is the starting guess.
        let a0 = self.steps[axis];

        let (trial, warning) = line_search_trial(self.line_search.as_ref(), eval, state, pk, a0)?;
        if trial.alpha > 0.0 {
            self.steps[axis] = trial.alpha;
        }
        if warning.is_some() {
            self.warning = warning;
        }
        Ok(trial)
    }

    fn warning(&self) -> Option<MinimizerWarning> {
        self.warning
    }

    fn converged(&mut self, conv: &ConvergenceTest, _state: &IterationState, trial: &Trial) -> bool {
        if !self.sweep_closed {
            return false;
        }
        let f_start = self.sweep_f.replace(trial.f).unwrap_or(trial.f);
        conv.converged(trial.f, f_start, &trial.g)
    }
}
