use crate::minimize::{
    MinimizerError, MinimizerWarning,
    constraint::{Constraint, evaluate_constraints},
    convergence::ConvergenceTest,
    generic::generic_minimise,
    iteration::OptimisationResult,
    linalg::Vector,
    objective::{Evaluator, ObjFn, ObjGradFn, ObjHessFn},
    options::{Algorithm, MinOptions, MomParams},
};
use log::{debug, warn};
use ndarray::prelude::*;
use std::fmt;

/// Augmented Lagrangian L(x, lambda; mu) = f(x) + sum_i psi(c_i(x), lambda_i; mu).
///
/// psi(t, s; m) = -s t + t^2 / (2m) when t <= m s, and -m s^2 / 2 otherwise.
#[derive(Clone)]
pub struct AugmentedLagrangian<'a> {
    f: &'a dyn ObjHessFn,
    constraints: Vec<Box<dyn Constraint>>,
    lambda: Array1<f64>,
    mu: f64,
}

impl<'a> AugmentedLagrangian<'a> {
    pub fn new(
        f: &'a dyn ObjHessFn,
        constraints: Vec<Box<dyn Constraint>>,
        lambda: Array1<f64>,
        mu: f64,
    ) -> Self {
        AugmentedLagrangian {
            f,
            constraints,
            lambda,
            mu,
        }
    }

    pub fn multipliers(&self) -> &Array1<f64> {
        &self.lambda
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }

    fn set_penalty(&mut self, lambda: Array1<f64>, mu: f64) {
        self.lambda = lambda;
        self.mu = mu;
    }

    fn is_active(&self, c: f64, lambda: f64) -> bool {
        c <= self.mu * lambda
    }
}

impl fmt::Debug for AugmentedLagrangian<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AugmentedLagrangian")
            .field("constraints", &self.constraints.len())
            .field("lambda", &self.lambda)
            .field("mu", &self.mu)
            .finish()
    }
}

impl ObjFn for AugmentedLagrangian<'_> {
    fn call(&self, x: &Array1<f64>) -> f64 {
        let mut value = self.f.call(x);
        for (constraint, &lambda) in self.constraints.iter().zip(self.lambda.iter()) {
            let c = constraint.evaluate(x);
            value += if self.is_active(c, lambda) {
                -lambda * c + c * c / (2.0 * self.mu)
            } else {
                -0.5 * self.mu * lambda * lambda
            };
        }
        value
    }
}

impl ObjGradFn for AugmentedLagrangian<'_> {
    fn grad(&self, x: &Array1<f64>) -> Array1<f64> {
        let mut grad = self.f.grad(x);
        for (constraint, &lambda) in self.constraints.iter().zip(self.lambda.iter()) {
            let c = constraint.evaluate(x);
            if self.is_active(c, lambda) {
                grad.scaled_add(c / self.mu - lambda, &constraint.gradient(x));
            }
        }
        grad
    }
}

impl ObjHessFn for AugmentedLagrangian<'_> {
    fn hessian(&self, x: &Array1<f64>) -> Array2<f64> {
        let mut hess = self.f.hessian(x);
        for (constraint, &lambda) in self.constraints.iter().zip(self.lambda.iter()) {
            let c = constraint.evaluate(x);
            if self.is_active(c, lambda) {
                let dc = constraint.gradient(x);
                hess.scaled_add(1.0 / self.mu, &Vector::outer(&dc, &dc));
                hess.scaled_add(c / self.mu - lambda, &constraint.hessian(x));
            }
        }
        hess
    }

    fn has_hessian(&self) -> bool {
        self.f.has_hessian()
    }
}

fn tally(totals: &mut (usize, usize, usize), counts: (usize, usize, usize)) {
    totals.0 += counts.0;
    totals.1 += counts.1;
    totals.2 += counts.2;
}

/// Method of multipliers for problems with constraints c_i(x) >= 0.
///
/// Each outer iteration minimises the augmented Lagrangian with an
/// unconstrained algorithm, then updates lambda_i <- max(lambda_i - c_i / mu, 0)
/// and tightens mu, epsilon and gamma.
#[derive(Clone)]
pub struct MethodOfMultipliers {
    inner: Algorithm,
    options: MinOptions,
    constraints: Vec<Box<dyn Constraint>>,
    params: MomParams,
    multipliers: Option<Array1<f64>>,
}

impl MethodOfMultipliers {
    /// The constraints and penalty parameters are taken from `options`, the
    /// rest of `options` configures the inner algorithm.
    pub fn new(inner: Algorithm, options: &MinOptions) -> Self {
        let mut inner_options = options.clone();
        let constraints = std::mem::take(&mut inner_options.constraints);
        inner_options.inner = None;
        MethodOfMultipliers {
            inner,
            params: options.mom.clone(),
            options: inner_options,
            constraints,
            multipliers: None,
        }
    }

    /// Lagrange multipliers at the end of the last run
    pub fn multipliers(&self) -> Option<&Array1<f64>> {
        self.multipliers.as_ref()
    }

    pub fn minimise(
        &mut self,
        f: &dyn ObjHessFn,
        x0: &Array1<f64>,
        func_tol: Option<f64>,
        grad_tol: Option<f64>,
        max_iterations: usize,
    ) -> Result<OptimisationResult, MinimizerError> {
        let n = x0.len();
        if n == 0 {
            return Err(MinimizerError::InvalidDimension);
        }
        let conv = ConvergenceTest::new(func_tol, grad_tol)?;
        let m = self.constraints.len();
        let lambda = match &self.params.lambda0 {
            Some(lambda0) if lambda0.len() != m => return Err(MinimizerError::InvalidDimension),
            Some(lambda0) => lambda0.clone(),
            None => Array1::zeros(m),
        };
        let (mut c, _, _) = evaluate_constraints(&self.constraints, x0)?;

        let mut mu = self.params.mu0;
        let mut epsilon = self.params.epsilon0;
        let mut gamma = self.params.gamma0;
        let mut lagrangian = AugmentedLagrangian::new(f, self.constraints.clone(), lambda, mu);

        let mut counts = (0, 0, 0);
        let mut l_old = {
            let mut eval = Evaluator::new(&lagrangian, n);
            let value = eval.value(x0);
            tally(&mut counts, eval.counts());
            value
        };
        let mut x = x0.clone();
        let mut iterations = 0;
        let mut warning = None;

        loop {
            let tk = epsilon.min(gamma * Vector::norm(&c));
            let inner = generic_minimise(
                &lagrangian,
                &x,
                self.inner,
                &self.options,
                None,
                Some(tk),
                max_iterations
                    .saturating_sub(iterations)
                    .min(self.params.inner_max_iterations),
            )?;
            tally(&mut counts, (inner.f_count, inner.g_count, inner.h_count));
            iterations += inner.iterations;
            // The inner ceiling is not the caller's ceiling
            if inner.warning.is_some() && inner.warning != Some(MinimizerWarning::MaxIterationsReached) {
                warning = inner.warning;
            }

            let dl = {
                let mut eval = Evaluator::new(&lagrangian, n);
                let dl = eval.gradient(&inner.x)?;
                tally(&mut counts, eval.counts());
                dl
            };
            let converged = conv.converged(inner.f, l_old, &dl);
            x = inner.x;
            debug!(
                "method of multipliers: L = {} mu = {} lambda = {} tk = {}",
                inner.f,
                mu,
                lagrangian.multipliers(),
                tk
            );
            if converged {
                break;
            }
            iterations += 1;
            if iterations >= max_iterations {
                warn!("method of multipliers: {}", MinimizerWarning::MaxIterationsReached);
                warning = Some(MinimizerWarning::MaxIterationsReached);
                break;
            }

            c = evaluate_constraints(&self.constraints, &x)?.0;
            let lambda = (lagrangian.multipliers() - &(&c / mu)).mapv(|v| v.max(0.0));
            mu *= 0.1;
            epsilon *= 1e-2;
            gamma *= 1e-2;
            if mu < 1e-99 {
                warn!("method of multipliers: {}", MinimizerWarning::PenaltyUnderflow);
                lagrangian.set_penalty(lambda, mu);
                warning = Some(MinimizerWarning::PenaltyUnderflow);
                break;
            }
            lagrangian.set_penalty(lambda, mu);

            let mut eval = Evaluator::new(&lagrangian, n);
            l_old = eval.value(&x);
            tally(&mut counts, eval.counts());
        }

        self.multipliers = Some(lagrangian.multipliers().clone());
        let fx = {
            let mut eval = Evaluator::new(f, n);
            let value = eval.value(&x);
            tally(&mut counts, eval.counts());
            value
        };
        Ok(OptimisationResult::from_counts(x, fx, iterations, counts, warning))
    }
}

impl fmt::Debug for MethodOfMultipliers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodOfMultipliers")
            .field("inner", &self.inner)
            .field("constraints", &self.constraints.len())
            .field("params", &self.params)
            .finish()
    }
}
