use crate::minimize::{MinimizerError, linalg::Vector};
use ndarray::prelude::*;
use serde::Serialize;

/// Termination test applied after each accepted iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ConvergenceTest {
    /// |f_new - f_old| <= func_tol
    Function { func_tol: f64 },
    /// ||g_new|| <= grad_tol, or no change in the function value
    Gradient { grad_tol: f64 },
    /// Both the function and gradient tests must hold
    Double { func_tol: f64, grad_tol: f64 },
}

impl ConvergenceTest {
    /// Build the test from the optional tolerances of a run.
    pub fn new(func_tol: Option<f64>, grad_tol: Option<f64>) -> Result<Self, MinimizerError> {
        for tol in [func_tol, grad_tol].into_iter().flatten() {
            if tol.is_nan() || tol < 0.0 {
                return Err(MinimizerError::InvalidTolerance);
            }
        }
        match (func_tol, grad_tol) {
            (Some(func_tol), Some(grad_tol)) => Ok(ConvergenceTest::Double { func_tol, grad_tol }),
            (Some(func_tol), None) => Ok(ConvergenceTest::Function { func_tol }),
            (None, Some(grad_tol)) => Ok(ConvergenceTest::Gradient { grad_tol }),
            (None, None) => Err(MinimizerError::InitializationError(
                "convergence tests cannot be setup because both func_tol and grad_tol are unset"
                    .to_string(),
            )),
        }
    }

    pub fn converged(&self, f_new: f64, f_old: f64, g_new: &Array1<f64>) -> bool {
        match *self {
            ConvergenceTest::Function { func_tol } => (f_new - f_old).abs() <= func_tol,
            ConvergenceTest::Gradient { grad_tol } => {
                Vector::norm(g_new) <= grad_tol || f_new - f_old == 0.0
            }
            ConvergenceTest::Double { func_tol, grad_tol } => {
                (f_new - f_old).abs() <= func_tol && Vector::norm(g_new) <= grad_tol
            }
        }
    }
}
