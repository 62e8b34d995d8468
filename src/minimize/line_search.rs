use crate::minimize::{
    MinimizerError, MinimizerWarning,
    iteration::{IterationState, Trial},
    linalg::Vector,
    objective::Evaluator,
    options::{LineSearchKind, LineSearchParams},
};
use log::{trace, warn};
use ndarray::prelude::*;

mod backtrack;
mod interpolate;
mod more_thuente;
mod nocedal_wright;

pub use self::backtrack::Backtrack;
pub use self::interpolate::NocedalWrightInterpol;
pub use self::more_thuente::MoreThuente;
pub use self::nocedal_wright::NocedalWrightWolfe;

/// Accepted step of a line search
#[derive(Debug, Clone)]
pub struct LineSearchResult {
    pub alpha: f64,
    /// phi(alpha)
    pub f: f64,
    /// Gradient at x + alpha p when the search evaluated it
    pub g: Option<Array1<f64>>,
    pub warning: Option<MinimizerWarning>,
}

/// Step length selection along a descent direction.
///
/// Callers guarantee `dfk . pk < 0`; [`line_search_trial`] enforces it.
pub trait LineSearch {
    fn search(
        &self,
        eval: &mut Evaluator,
        xk: &Array1<f64>,
        fk: f64,
        dfk: &Array1<f64>,
        pk: &Array1<f64>,
        a0: f64,
    ) -> Result<LineSearchResult, MinimizerError>;

    fn kind(&self) -> LineSearchKind;
}

/// Build the line search for a kind
pub fn line_search_from_kind(kind: LineSearchKind, params: &LineSearchParams) -> Box<dyn LineSearch> {
    match kind {
        LineSearchKind::Backtrack => Box::new(Backtrack::new(params)),
        LineSearchKind::NocedalWrightInterpol => Box::new(NocedalWrightInterpol::new(params)),
        LineSearchKind::NocedalWrightWolfe => Box::new(NocedalWrightWolfe::new(params)),
        LineSearchKind::MoreThuente => Box::new(MoreThuente::new(params)),
        LineSearchKind::NoLineSearch => Box::new(NoLineSearch {}),
    }
}

/// Take the full initial step a0.
#[derive(Debug, Clone, Default)]
pub struct NoLineSearch {}

impl LineSearch for NoLineSearch {
    fn search(
        &self,
        eval: &mut Evaluator,
        xk: &Array1<f64>,
        _fk: f64,
        _dfk: &Array1<f64>,
        pk: &Array1<f64>,
        a0: f64,
    ) -> Result<LineSearchResult, MinimizerError> {
        let f = eval.value(&(xk + &(pk * a0)));
        Ok(LineSearchResult {
            alpha: a0,
            f,
            g: None,
            warning: None,
        })
    }

    fn kind(&self) -> LineSearchKind {
        LineSearchKind::NoLineSearch
    }
}

/// phi(a) = f(xk + a pk) and its derivative
pub(crate) struct LineFn<'e, 'a> {
    eval: &'e mut Evaluator<'a>,
    xk: Array1<f64>,
    pk: Array1<f64>,
}

impl<'e, 'a> LineFn<'e, 'a> {
    pub(crate) fn new(eval: &'e mut Evaluator<'a>, xk: &Array1<f64>, pk: &Array1<f64>) -> Self {
        LineFn {
            eval,
            xk: xk.clone(),
            pk: pk.clone(),
        }
    }

    fn point(&self, a: f64) -> Array1<f64> {
        &self.xk + &(&self.pk * a)
    }

    pub(crate) fn value(&mut self, a: f64) -> f64 {
        let x = self.point(a);
        self.eval.value(&x)
    }

    /// (phi(a), phi'(a), gradient at xk + a pk)
    pub(crate) fn value_and_slope(
        &mut self,
        a: f64,
    ) -> Result<(f64, f64, Array1<f64>), MinimizerError> {
        let x = self.point(a);
        let f = self.eval.value(&x);
        let g = self.eval.gradient(&x)?;
        let slope = g.dot(&self.pk);
        trace!("phi({}) = {}, phi'({}) = {}", a, f, a, slope);
        Ok((f, slope, g))
    }
}

/// Directional derivative g^T p, which must be negative.
pub(crate) fn descent_slope(dfk: &Array1<f64>, pk: &Array1<f64>) -> Result<f64, MinimizerError> {
    let slope = dfk.dot(pk);
    if !(slope < 0.0) {
        return Err(MinimizerError::NotDescentDirection);
    }
    Ok(slope)
}

/// Initial trial step from the previous iteration, a_k = a_{k-1} (g_{k-1}^T p_{k-1}) / (g_k^T p_k).
pub(crate) fn initial_step(previous: Option<(f64, f64)>, slope: f64, default: f64) -> f64 {
    match previous {
        Some((alpha, prev_slope)) => {
            let a0 = alpha * prev_slope / slope;
            if a0.is_finite() && a0 > 0.0 { a0 } else { default }
        }
        None => default,
    }
}

/// Run a line search from the current iterate and package the accepted point.
///
/// A zero gradient means xk is stationary and is returned unchanged.
pub(crate) fn line_search_trial(
    line_search: &dyn LineSearch,
    eval: &mut Evaluator,
    state: &IterationState,
    pk: Array1<f64>,
    a0: f64,
) -> Result<(Trial, Option<MinimizerWarning>), MinimizerError> {
    if Vector::norm(&state.dfk) == 0.0 {
        let mut trial = Trial::stay(state);
        trial.moved = true;
        return Ok((trial, None));
    }
    descent_slope(&state.dfk, &pk)?;

    let result = line_search.search(eval, &state.xk, state.fk, &state.dfk, &pk, a0)?;
    if let Some(w) = result.warning {
        warn!("{} line search: {}", line_search.kind(), w);
    }
    let x = &state.xk + &(&pk * result.alpha);
    let g = match result.g {
        Some(g) => g,
        None => eval.gradient(&x)?,
    };
    let trial = Trial::moved_to(state, x, result.f, g, pk, result.alpha);
    Ok((trial, result.warning))
}

#[cfg(test)]
pub(crate) mod minimize_line_search_tests {
    use super::*;
    use crate::minimize::objective::{MultiDimGradFn, ObjFn, ObjGradFn, ObjHessFn};

    /// Rosenbrock function with its gradient
    pub(crate) fn create_rosenbrock() -> impl ObjHessFn + Clone {
        let func = |x: &Array1<f64>| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0].powi(2)).powi(2);
        let grad = |x: &Array1<f64>| {
            array![
                -2.0 * (1.0 - x[0]) - 400.0 * x[0] * (x[1] - x[0].powi(2)),
                200.0 * (x[1] - x[0].powi(2)),
            ]
        };
        MultiDimGradFn::new(func, grad)
    }

    /// Check the strong Wolfe conditions for a returned step
    pub(crate) fn assert_strong_wolfe(
        f: &dyn ObjHessFn,
        x: &Array1<f64>,
        p: &Array1<f64>,
        alpha: f64,
        mu: f64,
        eta: f64,
    ) {
        let f0 = f.call(x);
        let slope0 = f.grad(x).dot(p);
        let xa = x + &(p * alpha);
        let fa = f.call(&xa);
        let slope_a = f.grad(&xa).dot(p);
        assert!(alpha > 0.0);
        assert!(fa <= f0 + mu * alpha * slope0, "sufficient decrease fails");
        assert!(slope_a.abs() <= eta * slope0.abs(), "curvature condition fails");
    }

    #[test]
    fn test_descent_slope() {
        let g = array![1.0, 2.0];
        assert!(descent_slope(&g, &array![-1.0, 0.0]).is_ok());
        assert_eq!(
            descent_slope(&g, &array![1.0, 0.0]),
            Err(MinimizerError::NotDescentDirection)
        );
        assert_eq!(
            descent_slope(&g, &array![0.0, 0.0]),
            Err(MinimizerError::NotDescentDirection)
        );
    }

    #[test]
    fn test_initial_step() {
        assert_eq!(initial_step(None, -1.0, 1.0), 1.0);
        assert_eq!(initial_step(Some((0.5, -4.0)), -2.0, 1.0), 1.0);
        assert_eq!(initial_step(Some((0.5, -4.0)), -1.0, 1.0), 2.0);
        assert_eq!(initial_step(Some((0.5, 0.0)), -1.0, 1.0), 1.0);
    }

    #[test]
    fn test_no_line_search() {
        let f = create_rosenbrock();
        let mut eval = Evaluator::new(&f, 2);
        let x = array![-1.2, 1.0];
        let g = f.grad(&x);
        let p = -&g;
        let result = NoLineSearch {}
            .search(&mut eval, &x, f.call(&x), &g, &p, 0.25)
            .unwrap();
        assert_eq!(result.alpha, 0.25);
        assert_eq!(eval.counts(), (1, 0, 0));
    }
}
