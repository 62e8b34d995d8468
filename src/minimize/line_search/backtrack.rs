use crate::minimize::{
    MinimizerError, MinimizerWarning,
    line_search::{LineFn, LineSearch, LineSearchResult},
    objective::Evaluator,
    options::{LineSearchKind, LineSearchParams},
};
use log::trace;
use ndarray::prelude::*;

/// Armijo backtracking: a <- rho a until sufficient decrease holds.
#[derive(Debug, Clone)]
pub struct Backtrack {
    pub rho: f64,
    pub mu: f64,
    pub max_iter: usize,
}

impl Backtrack {
    pub fn new(params: &LineSearchParams) -> Self {
        Backtrack {
            rho: 0.5,
            mu: params.mu,
            max_iter: params.max_iter,
        }
    }
}

impl Default for Backtrack {
    fn default() -> Self {
        Backtrack::new(&LineSearchParams::default())
    }
}

impl LineSearch for Backtrack {
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
        let mut best = (a0, f64::INFINITY);
        for _ in 0..self.max_iter {
            let f = phi.value(a);
            trace!("backtrack a: {} phi(a): {}", a, f);
            if f <= fk + self.mu * a * slope {
                return Ok(LineSearchResult {
                    alpha: a,
                    f,
                    g: None,
                    warning: None,
                });
            }
            if f < best.1 {
                best = (a, f);
            }
            a *= self.rho;
        }

        Ok(LineSearchResult {
            alpha: best.0,
            f: best.1,
            g: None,
            warning: Some(MinimizerWarning::LineSearchStalled),
        })
    }

    fn kind(&self) -> LineSearchKind {
        LineSearchKind::Backtrack
    }
}

#[cfg(test)]
mod minimize_backtrack_tests {
    use super::*;
    use crate::minimize::line_search::minimize_line_search_tests::create_rosenbrock;
    use crate::minimize::objective::{MultiDimGradFn, ObjFn, ObjGradFn};

    #[test]
    fn test_backtrack_sufficient_decrease() {
        let f = create_rosenbrock();
        let mut eval = Evaluator::new(&f, 2);
        let x = array![-1.2, 1.0];
        let fk = f.call(&x);
        let g = f.grad(&x);
        let p = -&g;
        let ls = Backtrack::default();
        let result = ls.search(&mut eval, &x, fk, &g, &p, 1.0).unwrap();
        assert!(result.warning.is_none());
        assert!(result.f <= fk + ls.mu * result.alpha * g.dot(&p));
        assert!(result.alpha < 1.0);
        // Every trial is a halving of the previous one
        assert_eq!(result.alpha, 0.5_f64.powi(eval.counts().0 as i32 - 1));
    }

    #[test]
    fn test_backtrack_accepts_full_step() {
        let f = MultiDimGradFn::new(|x: &Array1<f64>| x.dot(x), |x: &Array1<f64>| x * 2.0);
        let mut eval = Evaluator::new(&f, 2);
        let x = array![1.0, 1.0];
        let g = f.grad(&x);
        let p = -&x;
        let result = Backtrack::default()
            .search(&mut eval, &x, f.call(&x), &g, &p, 1.0)
            .unwrap();
        assert_eq!(result.alpha, 1.0);
        assert_eq!(result.f, 0.0);
        assert_eq!(eval.counts(), (1, 0, 0));
    }

    #[test]
    fn test_backtrack_stalls() {
        // The direction is downhill only in the limit a -> 0 for a bad slope estimate
        let f = MultiDimGradFn::new(|x: &Array1<f64>| x[0].abs() + 1.0, |_x: &Array1<f64>| array![-1.0]);
        let mut eval = Evaluator::new(&f, 1);
        let x = array![0.0];
        let g = f.grad(&x);
        let p = array![1.0];
        let ls = Backtrack {
            rho: 0.5,
            mu: 1e-4,
            max_iter: 5,
        };
        let result = ls.search(&mut eval, &x, f.call(&x), &g, &p, 1.0).unwrap();
        assert_eq!(result.warning, Some(MinimizerWarning::LineSearchStalled));
        assert_eq!(result.alpha, 0.0625);
        assert_eq!(eval.counts().0, 5);
    }
}
