use crate::minimize::{
    MinimizerError, MinimizerWarning,
    iteration::{IterationState, Minimizer, Trial},
    line_search::{LineSearch, initial_step, line_search_from_kind, line_search_trial},
    objective::Evaluator,
    options::{LineSearchKind, LineSearchParams},
};
use ndarray::prelude::*;
use std::fmt;

/// Steepest descent, p = -g.
pub struct SteepestDescent {
    line_search: Box<dyn LineSearch>,
    params: LineSearchParams,
    previous: Option<(f64, f64)>,
    warning: Option<MinimizerWarning>,
}

impl SteepestDescent {
    pub fn new(line_search: LineSearchKind, params: &LineSearchParams) -> Self {
        SteepestDescent {
            line_search: line_search_from_kind(line_search, params),
            params: *params,
            previous: None,
            warning: None,
        }
    }

    pub fn new_boxed(line_search: Box<dyn LineSearch>, params: &LineSearchParams) -> Self {
        SteepestDescent {
            line_search,
            params: *params,
            previous: None,
            warning: None,
        }
    }
}

impl Default for SteepestDescent {
    fn default() -> Self {
        SteepestDescent::new(LineSearchKind::Backtrack, &LineSearchParams::default())
    }
}

impl fmt::Debug for SteepestDescent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SteepestDescent")
            .field("line_search", &self.line_search.kind())
            .field("params", &self.params)
            .finish()
    }
}

impl Minimizer for SteepestDescent {
    fn name(&self) -> String {
        format!("Steepest descent ({})", self.line_search.kind())
    }

    fn step(&mut self, eval: &mut Evaluator, state: &IterationState) -> Result<Trial, MinimizerError> {
        let pk: Array1<f64> = -&state.dfk;
        let slope = state.dfk.dot(&pk);
        let a0 = initial_step(self.previous, slope, self.params.a0);

        let (trial, warning) = line_search_trial(self.line_search.as_ref(), eval, state, pk, a0)?;
        self.previous = Some((trial.alpha, slope));
        if warning.is_some() {
            self.warning = warning;
        }
        Ok(trial)
    }

    fn warning(&self) -> Option<MinimizerWarning> {
        self.warning
    }
}
