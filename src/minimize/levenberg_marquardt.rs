use crate::minimize::{
    MinimizerError,
    iteration::{IterationState, Minimizer, Trial},
    linalg::Matrix,
    objective::{Evaluator, LeastSquaresFn},
    options::LmParams,
};
use log::debug;
use ndarray::prelude::*;
use std::fmt;

/// J^T W J with W = diag(1 / sigma^2)
pub fn gauss_newton_matrix(jacobian: &Array2<f64>, errors: &Array1<f64>) -> Array2<f64> {
    let weights = errors.mapv(|s| 1.0 / (s * s));
    let wj = jacobian * &weights.insert_axis(Axis(1));
    jacobian.t().dot(&wj)
}

/// Solve (J^T W J + lambda I) p = -g / 2.
pub fn lm_step(
    jtwj: &Array2<f64>,
    g: &Array1<f64>,
    lambda: f64,
) -> Result<Array1<f64>, MinimizerError> {
    let n = g.len();
    let a = jtwj + &(Array2::<f64>::eye(n) * lambda);
    Matrix::solve_linear_system(&a, &(g * -0.5))
}

/// Levenberg-Marquardt for chi-squared objectives.
///
/// The objective supplies f and its gradient -2 J^T W r, the least-squares
/// data supplies the model Jacobian and the errors. A step that does not
/// increase f is accepted and lambda shrinks tenfold, otherwise x stays put
/// and lambda grows tenfold.
pub struct LevenbergMarquardt {
    data: Box<dyn LeastSquaresFn>,
    params: LmParams,
}

impl LevenbergMarquardt {
    pub fn new<L>(data: L, params: &LmParams) -> Self
    where
        L: LeastSquaresFn + 'static,
    {
        LevenbergMarquardt {
            data: Box::new(data),
            params: *params,
        }
    }

    pub fn new_boxed(data: Box<dyn LeastSquaresFn>, params: &LmParams) -> Self {
        LevenbergMarquardt { data, params: *params }
    }

    fn curvature(&self, eval: &mut Evaluator, x: &Array1<f64>) -> Result<Array2<f64>, MinimizerError> {
        let jacobian = eval.jacobian(self.data.as_ref(), x)?;
        Ok(gauss_newton_matrix(&jacobian, &self.data.errors()))
    }
}

impl Clone for LevenbergMarquardt {
    fn clone(&self) -> Self {
        LevenbergMarquardt {
            data: dyn_clone::clone_box(&*self.data),
            params: self.params,
        }
    }
}

impl fmt::Debug for LevenbergMarquardt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevenbergMarquardt")
            .field("params", &self.params)
            .field("points", &self.data.errors().len())
            .finish()
    }
}

impl Minimizer for LevenbergMarquardt {
    fn name(&self) -> String {
        "Levenberg-Marquardt".to_string()
    }

    fn check(&self) -> Result<(), MinimizerError> {
        self.params.validate()
    }

    fn setup(&mut self, eval: &mut Evaluator, state: &mut IterationState) -> Result<(), MinimizerError> {
        state.d2fk = Some(self.curvature(eval, &state.xk)?);
        state.lambda = self.params.lambda0;
        Ok(())
    }

    fn step(&mut self, eval: &mut Evaluator, state: &IterationState) -> Result<Trial, MinimizerError> {
        let jtwj = state
            .d2fk
            .as_ref()
            .ok_or(MinimizerError::HessianEvaluationError)?;
        let pk = lm_step(jtwj, &state.dfk, state.lambda)?;
        let x = &state.xk + &pk;
        let f = eval.value(&x);

        if f <= state.fk {
            let g = eval.gradient(&x)?;
            let mut trial = Trial::moved_to(state, x, f, g, pk, 1.0);
            trial.lambda = state.lambda * 0.1;
            Ok(trial)
        } else {
            debug!("LM step rejected, f: {} > {}, lambda: {}", f, state.fk, state.lambda * 10.0);
            let mut trial = Trial::stay(state);
            trial.lambda = state.lambda * 10.0;
            Ok(trial)
        }
    }

    fn update(
        &mut self,
        eval: &mut Evaluator,
        state: &IterationState,
        trial: Trial,
    ) -> Result<IterationState, MinimizerError> {
        let d2fk = if trial.moved {
            Some(self.curvature(eval, &trial.x)?)
        } else {
            state.d2fk.clone()
        };
        Ok(IterationState::from_trial(trial, d2fk))
    }
}
