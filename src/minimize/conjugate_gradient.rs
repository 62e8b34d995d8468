use crate::minimize::{
    MinimizerError, MinimizerWarning,
    iteration::{IterationState, Minimizer, Trial},
    line_search::{LineSearch, initial_step, line_search_from_kind, line_search_trial},
    objective::Evaluator,
    options::{Algorithm, LineSearchKind, LineSearchParams},
};
use log::trace;
use ndarray::prelude::*;
use serde::Serialize;
use std::fmt;

/// Nonlinear conjugate gradient update formulas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConjGradMethod {
    FletcherReeves,   // β = ||g_new||² / ||g_old||²
    PolakRibiere,     // β = g_new·(g_new - g_old) / ||g_old||²
    PolakRibierePlus, // β = max(β_PR, 0)
    HestenesStiefel,  // β = g_new·(g_new - g_old) / p·(g_new - g_old)
}

impl ConjGradMethod {
    pub fn from_algorithm(algorithm: Algorithm) -> Option<ConjGradMethod> {
        match algorithm {
            Algorithm::FletcherReeves => Some(ConjGradMethod::FletcherReeves),
            Algorithm::PolakRibiere => Some(ConjGradMethod::PolakRibiere),
            Algorithm::PolakRibierePlus => Some(ConjGradMethod::PolakRibierePlus),
            Algorithm::HestenesStiefel => Some(ConjGradMethod::HestenesStiefel),
            _ => None,
        }
    }

    /// β for the new direction p_new = -g_new + β p
    pub fn beta(&self, g_old: &Array1<f64>, g_new: &Array1<f64>, p: &Array1<f64>) -> f64 {
        let y = g_new - g_old;
        match self {
            ConjGradMethod::FletcherReeves => g_new.dot(g_new) / g_old.dot(g_old),
            ConjGradMethod::PolakRibiere => g_new.dot(&y) / g_old.dot(g_old),
            ConjGradMethod::PolakRibierePlus => (g_new.dot(&y) / g_old.dot(g_old)).max(0.0),
            ConjGradMethod::HestenesStiefel => g_new.dot(&y) / p.dot(&y),
        }
    }
}

impl fmt::Display for ConjGradMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConjGradMethod::FletcherReeves => write!(f, "Fletcher-Reeves"),
            ConjGradMethod::PolakRibiere => write!(f, "Polak-Ribiere"),
            ConjGradMethod::PolakRibierePlus => write!(f, "Polak-Ribiere +"),
            ConjGradMethod::HestenesStiefel => write!(f, "Hestenes-Stiefel"),
        }
    }
}

/// Nonlinear conjugate gradient with restarts.
///
/// The direction is reset to steepest descent when consecutive gradients are
/// far from orthogonal, |g_new·g_old| / ||g_new||² >= 0.1, or when the
/// conjugate direction fails to point downhill.
pub struct ConjGrad {
    method: ConjGradMethod,
    line_search: Box<dyn LineSearch>,
    params: LineSearchParams,
    direction: Option<Array1<f64>>,
    previous: Option<(f64, f64)>,
    restarts: usize,
    warning: Option<MinimizerWarning>,
}

impl ConjGrad {
    /// The line search runs with the conjugate gradient curvature constant `eta_cg`.
    pub fn new(method: ConjGradMethod, line_search: LineSearchKind, params: &LineSearchParams) -> Self {
        let mut cg_params = *params;
        cg_params.eta = params.eta_cg;
        ConjGrad {
            method,
            line_search: line_search_from_kind(line_search, &cg_params),
            params: cg_params,
            direction: None,
            previous: None,
            restarts: 0,
            warning: None,
        }
    }

    pub fn new_boxed(
        method: ConjGradMethod,
        line_search: Box<dyn LineSearch>,
        params: &LineSearchParams,
    ) -> Self {
        ConjGrad {
            method,
            line_search,
            params: *params,
            direction: None,
            previous: None,
            restarts: 0,
            warning: None,
        }
    }

    pub fn method(&self) -> ConjGradMethod {
        self.method
    }

    pub fn restarts(&self) -> usize {
        self.restarts
    }

    /// Next search direction after moving from g_old to g_new along p
    fn next_direction(&mut self, g_old: &Array1<f64>, g_new: &Array1<f64>, p: &Array1<f64>) -> Array1<f64> {
        let steepest: Array1<f64> = -g_new;
        let gg = g_new.dot(g_new);
        if gg == 0.0 {
            return steepest;
        }
        if g_new.dot(g_old).abs() / gg >= 0.1 {
            self.restarts += 1;
            trace!("{} restart", self.method);
            return steepest;
        }
        let beta = self.method.beta(g_old, g_new, p);
        if !beta.is_finite() {
            self.restarts += 1;
            return steepest;
        }
        let direction = &steepest + &(p * beta);
        if g_new.dot(&direction) >= 0.0 {
            self.restarts += 1;
            trace!("{} direction is not downhill, restart", self.method);
            return steepest;
        }
        direction
    }
}

impl Default for ConjGrad {
    fn default() -> Self {
        ConjGrad::new(
            ConjGradMethod::PolakRibierePlus,
            LineSearchKind::MoreThuente,
            &LineSearchParams::default(),
        )
    }
}

impl fmt::Debug for ConjGrad {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConjGrad")
            .field("method", &self.method)
            .field("line_search", &self.line_search.kind())
            .field("params", &self.params)
            .field("restarts", &self.restarts)
            .finish()
    }
}

impl Minimizer for ConjGrad {
    fn name(&self) -> String {
        format!("{} conjugate gradient ({})", self.method, self.line_search.kind())
    }

    fn step(&mut self, eval: &mut Evaluator, state: &IterationState) -> Result<Trial, MinimizerError> {
        let pk = self.direction.take().unwrap_or_else(|| -&state.dfk);
        let slope = state.dfk.dot(&pk);
        let a0 = initial_step(self.previous, slope, self.params.a0);

        let (trial, warning) = line_search_trial(self.line_search.as_ref(), eval, state, pk, a0)?;
        self.previous = Some((trial.alpha, slope));
        if warning.is_some() {
            self.warning = warning;
        }
        Ok(trial)
    }

    fn update(
        &mut self,
        _eval: &mut Evaluator,
        state: &IterationState,
        trial: Trial,
    ) -> Result<IterationState, MinimizerError> {
        self.direction = Some(self.next_direction(&state.dfk, &trial.g, &trial.pk));
        Ok(IterationState::from_trial(trial, None))
    }

    fn warning(&self) -> Option<MinimizerWarning> {
        self.warning
    }
}
