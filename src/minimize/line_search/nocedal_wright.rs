use crate::minimize::{
    MinimizerError, MinimizerWarning,
    line_search::{LineFn, LineSearch, LineSearchResult, interpolate::quadratic_min},
    objective::Evaluator,
    options::{LineSearchKind, LineSearchParams},
};
use log::trace;
use ndarray::prelude::*;

/// Strong Wolfe line search by bracketing then zooming.
#[derive(Debug, Clone)]
pub struct NocedalWrightWolfe {
    pub mu: f64,
    pub eta: f64,
    pub a_max: f64,
    pub max_iter: usize,
}

impl NocedalWrightWolfe {
    pub fn new(params: &LineSearchParams) -> Self {
        NocedalWrightWolfe {
            mu: params.mu,
            eta: params.eta,
            a_max: 1e5,
            max_iter: params.max_iter,
        }
    }
}

impl Default for NocedalWrightWolfe {
    fn default() -> Self {
        NocedalWrightWolfe::new(&LineSearchParams::default())
    }
}

/// One evaluated trial step
#[derive(Debug, Clone)]
struct Sample {
    a: f64,
    f: f64,
    slope: f64,
    g: Array1<f64>,
}

impl Sample {
    fn accept(self, warning: Option<MinimizerWarning>) -> LineSearchResult {
        LineSearchResult {
            alpha: self.a,
            f: self.f,
            g: Some(self.g),
            warning,
        }
    }
}

impl NocedalWrightWolfe {
    fn zoom(
        &self,
        phi: &mut LineFn,
        f0: f64,
        slope0: f64,
        mut lo: Sample,
        mut hi: Sample,
    ) -> Result<LineSearchResult, MinimizerError> {
        for _ in 0..self.max_iter {
            let width = hi.a - lo.a;
            let a_q = quadratic_min(lo.f, lo.slope, width, hi.f);
            let t = if a_q.is_finite() {
                (a_q / width).clamp(0.1, 0.66)
            } else {
                0.5
            };
            let a = lo.a + t * width;
            let (f, slope, g) = phi.value_and_slope(a)?;
            trace!("zoom lo: {} hi: {} a: {}", lo.a, hi.a, a);
            let sample = Sample { a, f, slope, g };

            if f > f0 + self.mu * a * slope0 || f >= lo.f {
                hi = sample;
            } else {
                if slope.abs() <= -self.eta * slope0 {
                    return Ok(sample.accept(None));
                }
                if slope * (hi.a - lo.a) >= 0.0 {
                    hi = lo;
                }
                lo = sample;
            }
        }
        Ok(lo.accept(Some(MinimizerWarning::LineSearchStalled)))
    }
}

impl LineSearch for NocedalWrightWolfe {
    fn search(
        &self,
        eval: &mut Evaluator,
        xk: &Array1<f64>,
        fk: f64,
        dfk: &Array1<f64>,
        pk: &Array1<f64>,
        a0: f64,
    ) -> Result<LineSearchResult, MinimizerError> {
        let slope0 = dfk.dot(pk);
        let mut phi = LineFn::new(eval, xk, pk);

        let mut prev = Sample {
            a: 0.0,
            f: fk,
            slope: slope0,
            g: dfk.clone(),
        };
        let mut a = a0.min(self.a_max);

        for i in 0..self.max_iter {
            let (f, slope, g) = phi.value_and_slope(a)?;
            trace!("bracket a: {} phi(a): {} phi'(a): {}", a, f, slope);
            let sample = Sample { a, f, slope, g };

            if f > fk + self.mu * a * slope0 || (i > 0 && f >= prev.f) {
                return self.zoom(&mut phi, fk, slope0, prev, sample);
            }
            if slope.abs() <= -self.eta * slope0 {
                return Ok(sample.accept(None));
            }
            if slope >= 0.0 {
                return self.zoom(&mut phi, fk, slope0, sample, prev);
            }
            if a >= self.a_max {
                return Ok(sample.accept(Some(MinimizerWarning::LineSearchStalled)));
            }
            prev = sample;
            a = (2.0 * a).min(self.a_max);
        }

        Ok(prev.accept(Some(MinimizerWarning::LineSearchStalled)))
    }

    fn kind(&self) -> LineSearchKind {
        LineSearchKind::NocedalWrightWolfe
    }
}

#[cfg(test)]
mod minimize_nocedal_wright_tests {
    use super::*;
    use crate::minimize::line_search::minimize_line_search_tests::{
        assert_strong_wolfe, create_rosenbrock,
    };
    use crate::minimize::objective::{MultiDimGradFn, ObjFn, ObjGradFn};

    #[test]
    fn test_wolfe_rosenbrock_steepest_descent() {
        let f = create_rosenbrock();
        let mut eval = Evaluator::new(&f, 2);
        let x = array![-1.2, 1.0];
        let g = f.grad(&x);
        let p = -&g;
        let ls = NocedalWrightWolfe::default();
        let result = ls.search(&mut eval, &x, f.call(&x), &g, &p, 1.0).unwrap();
        assert!(result.warning.is_none());
        assert_strong_wolfe(&f, &x, &p, result.alpha, ls.mu, ls.eta);
        let xa = &x + &(&p * result.alpha);
        assert_eq!(result.g.unwrap(), f.grad(&xa));
    }

    #[test]
    fn test_wolfe_rosenbrock_newton_direction() {
        let f = create_rosenbrock();
        let mut eval = Evaluator::new(&f, 2);
        let x: Array1<f64> = array![-1.2, 1.0];
        let g = f.grad(&x);
        // Newton direction at (-1.2, 1), the Hessian is positive definite there
        let h = array![
            [1200.0 * x[0] * x[0] - 400.0 * x[1] + 2.0, -400.0 * x[0]],
            [-400.0 * x[0], 200.0]
        ];
        let det = h[[0, 0]] * h[[1, 1]] - h[[0, 1]] * h[[1, 0]];
        let p = array![
            -(h[[1, 1]] * g[0] - h[[0, 1]] * g[1]) / det,
            -(-h[[1, 0]] * g[0] + h[[0, 0]] * g[1]) / det
        ];
        let ls = NocedalWrightWolfe::default();
        let result = ls.search(&mut eval, &x, f.call(&x), &g, &p, 1.0).unwrap();
        assert!(result.warning.is_none());
        assert_strong_wolfe(&f, &x, &p, result.alpha, ls.mu, ls.eta);
    }

    #[test]
    fn test_wolfe_expands_short_steps() {
        let f = MultiDimGradFn::new(
            |x: &Array1<f64>| 0.5 * x.dot(x),
            |x: &Array1<f64>| x.clone(),
        );
        let mut eval = Evaluator::new(&f, 1);
        let x = array![10.0];
        let g = f.grad(&x);
        let p = array![-1.0];
        let ls = NocedalWrightWolfe::default();
        let result = ls.search(&mut eval, &x, f.call(&x), &g, &p, 0.1).unwrap();
        assert!(result.alpha > 0.1);
        assert_strong_wolfe(&f, &x, &p, result.alpha, ls.mu, ls.eta);
    }
}
