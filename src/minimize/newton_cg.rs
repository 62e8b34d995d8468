use crate::minimize::{
    MinimizerError, MinimizerWarning,
    iteration::{IterationState, Minimizer, Trial},
    line_search::{LineSearch, line_search_from_kind, line_search_trial},
    linalg::Vector,
    objective::Evaluator,
    options::{LineSearchKind, LineSearchParams},
};
use log::trace;
use ndarray::prelude::*;
use std::fmt;

/// Approximate Newton direction from truncated conjugate gradients on H p = -g.
///
/// The inner iteration starts from p = 0 and stops when the residual drops
/// below min(0.5, sqrt(|g|)) |g| or when a direction of non-positive
/// curvature appears. Negative curvature on the very first inner iteration
/// returns the steepest descent direction.
pub fn newton_cg_direction(h: &Array2<f64>, g: &Array1<f64>, max_iter: usize) -> Array1<f64> {
    let n = g.len();
    let g_norm = Vector::norm(g);
    let tol = g_norm.sqrt().min(0.5) * g_norm;

    let mut z = Array1::zeros(n);
    let mut r = g.clone();
    let mut d = -g;
    let mut rr = r.dot(&r);

    for j in 0..max_iter {
        let hd = h.dot(&d);
        let curvature = d.dot(&hd);
        if curvature <= 0.0 {
            trace!("Newton-CG negative curvature {} at inner iteration {}", curvature, j);
            return if j == 0 { -g } else { z };
        }
        let alpha = rr / curvature;
        z = z + &d * alpha;
        r = r + &hd * alpha;
        let rr_new = r.dot(&r);
        if rr_new.sqrt() < tol {
            trace!("Newton-CG residual {} after {} inner iterations", rr_new.sqrt(), j + 1);
            return z;
        }
        d = -&r + &d * (rr_new / rr);
        rr = rr_new;
    }
    z
}

/// Line search Newton-CG, also known as truncated Newton.
pub struct NewtonCg {
    line_search: Box<dyn LineSearch>,
    params: LineSearchParams,
    warning: Option<MinimizerWarning>,
}

impl NewtonCg {
    pub fn new(line_search: LineSearchKind, params: &LineSearchParams) -> Self {
        NewtonCg {
            line_search: line_search_from_kind(line_search, params),
            params: *params,
            warning: None,
        }
    }
}

impl Default for NewtonCg {
    fn default() -> Self {
        NewtonCg::new(LineSearchKind::MoreThuente, &LineSearchParams::default())
    }
}

impl fmt::Debug for NewtonCg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewtonCg")
            .field("line_search", &self.line_search.kind())
            .field("params", &self.params)
            .finish()
    }
}

impl Minimizer for NewtonCg {
    fn name(&self) -> String {
        format!("Newton Conjugate Gradient ({})", self.line_search.kind())
    }

    fn needs_hessian(&self) -> bool {
        true
    }

    fn step(&mut self, eval: &mut Evaluator, state: &IterationState) -> Result<Trial, MinimizerError> {
        let h = state
            .d2fk
            .as_ref()
            .ok_or(MinimizerError::HessianEvaluationError)?;
        let n = state.xk.len();
        let pk = newton_cg_direction(h, &state.dfk, 20 * n.max(1));

        let (trial, warning) =
            line_search_trial(self.line_search.as_ref(), eval, state, pk, self.params.a0)?;
        if warning.is_some() {
            self.warning = warning;
        }
        Ok(trial)
    }

    fn warning(&self) -> Option<MinimizerWarning> {
        self.warning
    }
}

#[cfg(test)]
mod minimize_newton_cg_tests {
    use super::*;
    use crate::minimize::{convergence::ConvergenceTest, objective::MultiDimHessFn};
    use float_cmp::{F64Margin, approx_eq};

    const MARGIN: F64Margin = F64Margin {
        epsilon: 1e-10,
        ulps: 10,
    };

    #[test]
    fn test_direction_solves_spd_system() {
        let h = array![[4.0, 1.0], [1.0, 3.0]];
        // Small g keeps the forcing term tight, so both CG iterations run
        let g = array![1e-4, 2e-4];
        let p = newton_cg_direction(&h, &g, 2);
        let r = h.dot(&p) + &g;
        assert!(Vector::norm(&r) < 1e-10 * Vector::norm(&g));
    }

    #[test]
    fn test_direction_truncated() {
        let h = array![[4.0, 1.0], [1.0, 3.0]];
        let g = array![1.0, 2.0];
        // One inner iteration already brings the residual under 0.5 |g|
        let p = newton_cg_direction(&h, &g, 10);
        assert!(approx_eq!(f64, p[0], -0.25, MARGIN));
        assert!(approx_eq!(f64, p[1], -0.5, MARGIN));
    }

    #[test]
    fn test_direction_negative_curvature_first() {
        let h = array![[-1.0, 0.0], [0.0, 2.0]];
        let g = array![1.0, 0.0];
        assert_eq!(newton_cg_direction(&h, &g, 10), array![-1.0, 0.0]);
    }

    #[test]
    fn test_direction_negative_curvature_later() {
        // g^T H g > 0 but the second conjugate direction has negative curvature
        let h = array![[1.0, 0.0], [0.0, -1.0]];
        let g = array![2.0, 1.0];
        let p = newton_cg_direction(&h, &g, 10);
        // alpha = 5 / 3 along -g
        assert!(approx_eq!(f64, p[0], -10.0 / 3.0, MARGIN));
        assert!(approx_eq!(f64, p[1], -5.0 / 3.0, MARGIN));
        assert!(g.dot(&p) < 0.0);
    }

    #[test]
    fn test_newton_cg_rosenbrock() {
        let f = MultiDimHessFn::new(
            |x: &Array1<f64>| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0].powi(2)).powi(2),
            |x: &Array1<f64>| {
                array![
                    -2.0 * (1.0 - x[0]) - 400.0 * x[0] * (x[1] - x[0].powi(2)),
                    200.0 * (x[1] - x[0].powi(2)),
                ]
            },
            Some(|x: &Array1<f64>| {
                array![
                    [2.0 - 400.0 * x[1] + 1200.0 * x[0].powi(2), -400.0 * x[0]],
                    [-400.0 * x[0], 200.0]
                ]
            }),
        );
        let conv = ConvergenceTest::new(None, Some(1e-8)).unwrap();
        let result = NewtonCg::default()
            .minimise(&f, &array![-1.2, 1.0], &conv, 1000)
            .unwrap();
        assert!((result.x[0] - 1.0).abs() < 1e-6);
        assert!((result.x[1] - 1.0).abs() < 1e-6);
    }
}
