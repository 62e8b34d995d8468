use crate::minimize::{
    MinimizerError, MinimizerWarning,
    hessian_mods::{Gmw, HessianModifier, hessian_mod_from_kind, newton_direction},
    iteration::{IterationState, Minimizer, Trial},
    line_search::{LineSearch, line_search_from_kind, line_search_trial},
    objective::Evaluator,
    options::{HessianModKind, LineSearchKind, LineSearchParams},
};
use log::warn;
use std::fmt;

/// Newton with a line search, p solving (H + E) p = -g.
///
/// Without a Hessian modifier the raw Hessian is solved directly, which only
/// gives a descent direction when H is positive definite.
pub struct Newton {
    line_search: Box<dyn LineSearch>,
    modifier: Option<Box<dyn HessianModifier>>,
    params: LineSearchParams,
    warning: Option<MinimizerWarning>,
}

impl Newton {
    pub fn new(
        line_search: LineSearchKind,
        hessian_mod: HessianModKind,
        params: &LineSearchParams,
        mach_acc: f64,
    ) -> Self {
        Newton {
            line_search: line_search_from_kind(line_search, params),
            modifier: hessian_mod_from_kind(hessian_mod, mach_acc),
            params: *params,
            warning: None,
        }
    }

    pub fn new_boxed(
        line_search: Box<dyn LineSearch>,
        modifier: Option<Box<dyn HessianModifier>>,
        params: &LineSearchParams,
    ) -> Self {
        Newton {
            line_search,
            modifier,
            params: *params,
            warning: None,
        }
    }
}

impl Default for Newton {
    fn default() -> Self {
        Newton::new_boxed(
            line_search_from_kind(LineSearchKind::MoreThuente, &LineSearchParams::default()),
            Some(Box::new(Gmw::default())),
            &LineSearchParams::default(),
        )
    }
}

impl fmt::Debug for Newton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Newton")
            .field("line_search", &self.line_search.kind())
            .field("modifier", &self.modifier.as_ref().map(|m| m.kind()))
            .field("params", &self.params)
            .finish()
    }
}

impl Minimizer for Newton {
    fn name(&self) -> String {
        let modifier = self
            .modifier
            .as_ref()
            .map_or(HessianModKind::NoMod, |m| m.kind());
        format!("Newton ({}, {})", self.line_search.kind(), modifier)
    }

    fn needs_hessian(&self) -> bool {
        true
    }

    fn step(&mut self, eval: &mut Evaluator, state: &IterationState) -> Result<Trial, MinimizerError> {
        let h = state
            .d2fk
            .as_ref()
            .ok_or(MinimizerError::HessianEvaluationError)?;
        let pk = match newton_direction(self.modifier.as_deref(), h, &state.dfk) {
            Ok(pk) => pk,
            Err(MinimizerError::SingularSystem(msg)) if self.modifier.is_none() => {
                // Singular unmodified Hessian, fall back to steepest descent
                warn!("Newton: {}, {}", msg, MinimizerWarning::NearSingularHessian);
                self.warning = Some(MinimizerWarning::NearSingularHessian);
                -&state.dfk
            }
            Err(e) => return Err(e),
        };

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
mod minimize_newton_tests {
    use super::*;
    use crate::minimize::{
        convergence::ConvergenceTest,
        objective::{MultiDimHessFn, ObjGradFn, ObjHessFn},
    };
    use ndarray::prelude::*;

    fn rosenbrock() -> impl ObjHessFn + Clone {
        MultiDimHessFn::new(
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
        )
    }

    fn convex_quadratic() -> impl ObjHessFn + Clone {
        // f = 1/2 x^T A x - b^T x with A SPD
        let a = array![[4.0, 1.0, 0.0], [1.0, 3.0, 0.5], [0.0, 0.5, 2.0]];
        let b = array![1.0, -2.0, 0.5];
        let (a1, a2, a3) = (a.clone(), a.clone(), a);
        let (b1, b2) = (b.clone(), b);
        MultiDimHessFn::new(
            move |x: &Array1<f64>| 0.5 * x.dot(&a1.dot(x)) - b1.dot(x),
            move |x: &Array1<f64>| a2.dot(x) - &b2,
            Some(move |_x: &Array1<f64>| a3.clone()),
        )
    }

    #[test]
    fn test_newton_quadratic_one_iteration() {
        let f = convex_quadratic();
        let conv = ConvergenceTest::new(None, Some(1e-10)).unwrap();
        for hessian_mod in [HessianModKind::Gmw, HessianModKind::Se99, HessianModKind::NoMod] {
            let result = Newton::new(
                LineSearchKind::MoreThuente,
                hessian_mod,
                &LineSearchParams::default(),
                1e-16,
            )
            .minimise(&f, &array![10.0, -7.0, 3.0], &conv, 100)
            .unwrap();
            assert_eq!(result.iterations, 1, "{}", hessian_mod);
            assert!(f.grad(&result.x).iter().all(|g| g.abs() < 1e-10));
        }
    }

    #[test]
    fn test_newton_gmw_rosenbrock() {
        let f = rosenbrock();
        let conv = ConvergenceTest::new(Some(1e-25), None).unwrap();
        let result = Newton::default()
            .minimise(&f, &array![-1.2, 1.0], &conv, 1000)
            .unwrap();
        assert!((result.x[0] - 1.0).abs() < 1e-6);
        assert!((result.x[1] - 1.0).abs() < 1e-6);
        assert!(result.f < 1e-12);
        assert!(result.h_count >= result.iterations);
        assert!(result.iterations < 100);
    }

    #[test]
    fn test_newton_backtrack_rosenbrock() {
        let f = rosenbrock();
        let conv = ConvergenceTest::new(None, Some(1e-8)).unwrap();
        let result = Newton::new(
            LineSearchKind::Backtrack,
            HessianModKind::Se99,
            &LineSearchParams::default(),
            1e-16,
        )
        .minimise(&f, &array![-1.2, 1.0], &conv, 1000)
        .unwrap();
        assert!((result.x[0] - 1.0).abs() < 1e-6);
        assert!((result.x[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_newton_indefinite_start() {
        // Saddle of x^4 - x^2 + y^2 at the origin, perturbed in x
        let f = MultiDimHessFn::new(
            |x: &Array1<f64>| x[0].powi(4) - x[0].powi(2) + x[1].powi(2),
            |x: &Array1<f64>| array![4.0 * x[0].powi(3) - 2.0 * x[0], 2.0 * x[1]],
            Some(|x: &Array1<f64>| array![[12.0 * x[0].powi(2) - 2.0, 0.0], [0.0, 2.0]]),
        );
        let conv = ConvergenceTest::new(None, Some(1e-10)).unwrap();
        let result = Newton::default()
            .minimise(&f, &array![0.1, 1.0], &conv, 200)
            .unwrap();
        // Minima at x = +-1/sqrt(2)
        assert!((result.x[0] - 0.5_f64.sqrt()).abs() < 1e-6);
        assert!(result.x[1].abs() < 1e-6);
    }

    #[test]
    fn test_newton_requires_descent_without_modifier() {
        // The unmodified Newton direction of an indefinite Hessian can point uphill
        let f = MultiDimHessFn::new(
            |x: &Array1<f64>| -x[0] * x[0] + x[0],
            |x: &Array1<f64>| array![-2.0 * x[0] + 1.0],
            Some(|_x: &Array1<f64>| array![[-2.0]]),
        );
        let conv = ConvergenceTest::new(Some(1e-10), None).unwrap();
        let err = Newton::new(
            LineSearchKind::Backtrack,
            HessianModKind::NoMod,
            &LineSearchParams::default(),
            1e-16,
        )
        .minimise(&f, &array![0.0], &conv, 10)
        .unwrap_err();
        assert_eq!(err, MinimizerError::NotDescentDirection);
    }
}
