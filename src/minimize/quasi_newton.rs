use crate::minimize::{
    MinimizerError, MinimizerWarning,
    iteration::{IterationState, Minimizer, Trial},
    line_search::{LineSearch, line_search_from_kind, line_search_trial},
    linalg::Vector,
    objective::Evaluator,
    options::{LineSearchKind, LineSearchParams},
};
use log::{debug, warn};
use ndarray::prelude::*;
use std::fmt;

/// BFGS update of the inverse Hessian approximation,
/// H+ = (I - rho s y^T) H (I - rho y s^T) + rho s s^T with rho = 1 / y^T s.
///
/// Returns `None` when y^T s is not safely positive, in which case the update
/// would destroy positive definiteness.
pub fn bfgs_inverse_update(
    h: &Array2<f64>,
    s: &Array1<f64>,
    y: &Array1<f64>,
) -> Option<Array2<f64>> {
    let ys = y.dot(s);
    if !(ys > f64::EPSILON.sqrt() * Vector::norm(s) * Vector::norm(y)) {
        return None;
    }
    let rho = 1.0 / ys;
    let n = s.len();
    let a = Array2::<f64>::eye(n) - Vector::outer(s, y) * rho;
    Some(a.dot(h).dot(&a.t()) + Vector::outer(s, s) * rho)
}

/// BFGS update of the Hessian approximation itself,
/// B+ = B - B s s^T B / s^T B s + y y^T / y^T s.
///
/// `None` when either curvature term is not positive.
pub fn bfgs_hessian_update(
    b: &Array2<f64>,
    s: &Array1<f64>,
    y: &Array1<f64>,
) -> Option<Array2<f64>> {
    let ys = y.dot(s);
    let bs = b.dot(s);
    let sbs = s.dot(&bs);
    if !(ys > f64::EPSILON.sqrt() * Vector::norm(s) * Vector::norm(y)) || !(sbs > 0.0) {
        return None;
    }
    Some(b - &(Vector::outer(&bs, &bs) / sbs) + Vector::outer(y, y) / ys)
}

/// Scaled identity (y^T s / y^T y) I, or I when that scale is unusable
pub(crate) fn scaled_identity(s: &Array1<f64>, y: &Array1<f64>) -> Array2<f64> {
    let n = s.len();
    let scale = y.dot(s) / y.dot(y);
    if scale.is_finite() && scale > 0.0 {
        Array2::eye(n) * scale
    } else {
        Array2::eye(n)
    }
}

/// Quasi-Newton BFGS with a line search.
pub struct QuasiNewton {
    line_search: Box<dyn LineSearch>,
    params: LineSearchParams,
    inv_hessian: Option<Array2<f64>>,
    first_update: bool,
    warning: Option<MinimizerWarning>,
}

impl QuasiNewton {
    pub fn new(line_search: LineSearchKind, params: &LineSearchParams) -> Self {
        QuasiNewton {
            line_search: line_search_from_kind(line_search, params),
            params: *params,
            inv_hessian: None,
            first_update: true,
            warning: None,
        }
    }

    pub fn new_boxed(line_search: Box<dyn LineSearch>, params: &LineSearchParams) -> Self {
        QuasiNewton {
            line_search,
            params: *params,
            inv_hessian: None,
            first_update: true,
            warning: None,
        }
    }

    /// Current inverse Hessian approximation
    pub fn inverse_hessian(&self) -> Option<&Array2<f64>> {
        self.inv_hessian.as_ref()
    }
}

impl Default for QuasiNewton {
    fn default() -> Self {
        QuasiNewton::new(LineSearchKind::MoreThuente, &LineSearchParams::default())
    }
}

impl fmt::Debug for QuasiNewton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuasiNewton")
            .field("line_search", &self.line_search.kind())
            .field("params", &self.params)
            .field("inv_hessian", &self.inv_hessian)
            .finish()
    }
}

impl Minimizer for QuasiNewton {
    fn name(&self) -> String {
        format!("Quasi-Newton BFGS ({})", self.line_search.kind())
    }

    fn setup(&mut self, _eval: &mut Evaluator, state: &mut IterationState) -> Result<(), MinimizerError> {
        self.inv_hessian = Some(Array2::eye(state.xk.len()));
        self.first_update = true;
        Ok(())
    }

    fn step(&mut self, eval: &mut Evaluator, state: &IterationState) -> Result<Trial, MinimizerError> {
        let n = state.xk.len();
        let h = self.inv_hessian.get_or_insert_with(|| Array2::eye(n));
        let pk = -h.dot(&state.dfk);

        let (trial, warning) =
            line_search_trial(self.line_search.as_ref(), eval, state, pk, self.params.a0)?;
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
        let s = &trial.x - &state.xk;
        let y = &trial.g - &state.dfk;
        let n = s.len();

        if Vector::norm(&s) > 0.0 {
            let mut h = self.inv_hessian.take().unwrap_or_else(|| Array2::eye(n));
            // Nocedal and Wright (6.20) rescaling before the first update
            if self.first_update && y.dot(&s) > 0.0 {
                h = scaled_identity(&s, &y);
                self.first_update = false;
            }
            h = match bfgs_inverse_update(&h, &s, &y) {
                Some(h) => h,
                None => {
                    warn!("BFGS: y^T s = {}, {}", y.dot(&s), MinimizerWarning::IndefiniteUpdate);
                    self.warning = Some(MinimizerWarning::IndefiniteUpdate);
                    scaled_identity(&s, &y)
                }
            };
            debug!("BFGS inverse Hessian updated, trace {}", h.diag().sum());
            self.inv_hessian = Some(h);
        }

        Ok(IterationState::from_trial(trial, None))
    }

    fn warning(&self) -> Option<MinimizerWarning> {
        self.warning
    }
}
