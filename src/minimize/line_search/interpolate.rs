use crate::minimize::{
    MinimizerError, MinimizerWarning,
    line_search::{LineFn, LineSearch, LineSearchResult},
    objective::Evaluator,
    options::{LineSearchKind, LineSearchParams},
};
use log::trace;
use ndarray::prelude::*;

/// Armijo search with quadratic then cubic interpolation of phi.
///
/// Each new trial is kept inside [0.1 a, 0.5 a] of the previous trial a.
#[derive(Debug, Clone)]
pub struct NocedalWrightInterpol {
    pub mu: f64,
    pub max_iter: usize,
}

impl NocedalWrightInterpol {
    pub fn new(params: &LineSearchParams) -> Self {
        NocedalWrightInterpol {
            mu: params.mu,
            max_iter: params.max_iter,
        }
    }
}

impl Default for NocedalWrightInterpol {
    fn default() -> Self {
        NocedalWrightInterpol::new(&LineSearchParams::default())
    }
}

/// Minimiser of the quadratic through phi(0), phi'(0) and phi(a).
pub(crate) fn quadratic_min(f0: f64, slope0: f64, a: f64, fa: f64) -> f64 {
    -slope0 * a * a / (2.0 * (fa - f0 - slope0 * a))
}

/// Minimiser of the cubic through phi(0), phi'(0), phi(a_prev) and phi(a).
fn cubic_min(f0: f64, slope0: f64, a_prev: f64, f_prev: f64, a: f64, fa: f64) -> f64 {
    let denom = a_prev * a_prev * a * a * (a - a_prev);
    let r1 = fa - f0 - slope0 * a;
    let r0 = f_prev - f0 - slope0 * a_prev;
    let c3 = (a_prev * a_prev * r1 - a * a * r0) / denom;
    let c2 = (-a_prev.powi(3) * r1 + a.powi(3) * r0) / denom;
    if c3 == 0.0 {
        return -slope0 / (2.0 * c2);
    }
    (-c2 + (c2 * c2 - 3.0 * c3 * slope0).sqrt()) / (3.0 * c3)
}

impl LineSearch for NocedalWrightInterpol {
    fn search(
        &self,
        eval: &mut Evaluator,
        xk: &Array1<f64>,
        fk: f64,
        dfk: &Array1<f64>,
        pk: &Array1<f64>,
        a0: f64,
    ) -> Result<LineSearchResult, MinimizerError> {
        let slope = dfk.dot(pk);
        let mut phi = LineFn::new(eval, xk, pk);

        let mut a = a0;
        let mut fa = phi.value(a);
        let mut prev: Option<(f64, f64)> = None;
        let mut best = (a, fa);

        for _ in 0..self.max_iter {
            trace!("interpolation a: {} phi(a): {}", a, fa);
            if fa <= fk + self.mu * a * slope {
                return Ok(LineSearchResult {
                    alpha: a,
                    f: fa,
                    g: None,
                    warning: None,
                });
            }
            if fa < best.1 {
                best = (a, fa);
            }

            let trial = match prev {
                None => quadratic_min(fk, slope, a, fa),
                Some((a_prev, f_prev)) => cubic_min(fk, slope, a_prev, f_prev, a, fa),
            };
            let next = if trial.is_finite() {
                trial.clamp(0.1 * a, 0.5 * a)
            } else {
                0.5 * a
            };

            prev = Some((a, fa));
            a = next;
            fa = phi.value(a);
        }

        if fa < best.1 {
            best = (a, fa);
        }
        Ok(LineSearchResult {
            alpha: best.0,
            f: best.1,
            g: None,
            warning: Some(MinimizerWarning::LineSearchStalled),
        })
    }

    fn kind(&self) -> LineSearchKind {
        LineSearchKind::NocedalWrightInterpol
    }
}
