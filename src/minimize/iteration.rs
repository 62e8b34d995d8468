use crate::minimize::{
    MinimizerError, MinimizerWarning,
    convergence::ConvergenceTest,
    linalg::Vector,
    objective::{Evaluator, ObjHessFn},
};
use log::{debug, warn};
use ndarray::prelude::*;
use serde::Serialize;

/// Everything an optimiser carries from one iteration to the next.
#[derive(Debug, Clone)]
pub struct IterationState {
    pub xk: Array1<f64>,
    pub fk: f64,
    pub dfk: Array1<f64>,
    /// Hessian, its approximation, or the Gauss-Newton matrix for LM
    pub d2fk: Option<Array2<f64>>,
    pub pk: Array1<f64>,
    /// Trust region radius
    pub delta: f64,
    /// Levenberg-Marquardt damping
    pub lambda: f64,
    /// Whether the last iteration changed x
    pub moved: bool,
}

impl IterationState {
    pub fn from_trial(trial: Trial, d2fk: Option<Array2<f64>>) -> Self {
        IterationState {
            xk: trial.x,
            fk: trial.f,
            dfk: trial.g,
            d2fk,
            pk: trial.pk,
            delta: trial.delta,
            lambda: trial.lambda,
            moved: trial.moved,
        }
    }
}

/// Candidate produced by one step of an optimiser.
#[derive(Debug, Clone)]
pub struct Trial {
    pub x: Array1<f64>,
    pub f: f64,
    pub g: Array1<f64>,
    pub pk: Array1<f64>,
    pub alpha: f64,
    pub delta: f64,
    pub lambda: f64,
    pub moved: bool,
}

impl Trial {
    /// A rejected step, x stays where it is
    pub fn stay(state: &IterationState) -> Self {
        Trial {
            x: state.xk.clone(),
            f: state.fk,
            g: state.dfk.clone(),
            pk: Array1::zeros(state.xk.len()),
            alpha: 0.0,
            delta: state.delta,
            lambda: state.lambda,
            moved: false,
        }
    }

    pub fn moved_to(
        state: &IterationState,
        x: Array1<f64>,
        f: f64,
        g: Array1<f64>,
        pk: Array1<f64>,
        alpha: f64,
    ) -> Self {
        Trial {
            x,
            f,
            g,
            pk,
            alpha,
            delta: state.delta,
            lambda: state.lambda,
            moved: true,
        }
    }
}

/// Outcome of a minimisation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimisationResult {
    pub x: Array1<f64>,
    pub f: f64,
    pub iterations: usize,
    pub f_count: usize,
    pub g_count: usize,
    pub h_count: usize,
    pub warning: Option<MinimizerWarning>,
}

impl OptimisationResult {
    fn new(
        x: Array1<f64>,
        f: f64,
        iterations: usize,
        eval: &Evaluator,
        warning: Option<MinimizerWarning>,
    ) -> Self {
        OptimisationResult::from_counts(x, f, iterations, eval.counts(), warning)
    }

    /// Result assembled from (f_count, g_count, h_count) tallied across several evaluators.
    pub(crate) fn from_counts(
        x: Array1<f64>,
        f: f64,
        iterations: usize,
        counts: (usize, usize, usize),
        warning: Option<MinimizerWarning>,
    ) -> Self {
        let (f_count, g_count, h_count) = counts;
        OptimisationResult {
            x,
            f,
            iterations,
            f_count,
            g_count,
            h_count,
            warning,
        }
    }
}

/// An iterative unconstrained optimiser.
///
/// Implementors describe a single iteration; the loop, the iteration ceiling
/// and the convergence test live in [`run`].
pub trait Minimizer {
    fn name(&self) -> String;

    /// Reject a configuration before the objective is first evaluated.
    fn check(&self) -> Result<(), MinimizerError> {
        Ok(())
    }

    /// Whether the initial state needs the Hessian at x0
    fn needs_hessian(&self) -> bool {
        false
    }

    /// Adjust the initial state before the first step.
    fn setup(
        &mut self,
        _eval: &mut Evaluator,
        _state: &mut IterationState,
    ) -> Result<(), MinimizerError> {
        Ok(())
    }

    fn step(&mut self, eval: &mut Evaluator, state: &IterationState)
    -> Result<Trial, MinimizerError>;

    /// Build the next state from a trial that did not terminate the run.
    ///
    /// The Hessian is refreshed at the new point when the optimiser needs it
    /// and the trial moved.
    fn update(
        &mut self,
        eval: &mut Evaluator,
        state: &IterationState,
        trial: Trial,
    ) -> Result<IterationState, MinimizerError> {
        let d2fk = if self.needs_hessian() && trial.moved {
            Some(eval.hessian(&trial.x)?)
        } else {
            state.d2fk.clone()
        };
        Ok(IterationState::from_trial(trial, d2fk))
    }

    /// Numerical warning recorded during the run
    fn warning(&self) -> Option<MinimizerWarning> {
        None
    }

    /// Whether the run stops at this trial. Rejected steps never converge.
    fn converged(&mut self, conv: &ConvergenceTest, state: &IterationState, trial: &Trial) -> bool {
        trial.moved && conv.converged(trial.f, state.fk, &trial.g)
    }

    fn minimise(
        &mut self,
        f: &dyn ObjHessFn,
        x0: &Array1<f64>,
        conv: &ConvergenceTest,
        max_iterations: usize,
    ) -> Result<OptimisationResult, MinimizerError>
    where
        Self: Sized,
    {
        run(self, f, x0, conv, max_iterations)
    }
}

/// The loop shared by every optimiser.
pub fn run(
    minimizer: &mut dyn Minimizer,
    f: &dyn ObjHessFn,
    x0: &Array1<f64>,
    conv: &ConvergenceTest,
    max_iterations: usize,
) -> Result<OptimisationResult, MinimizerError> {
    let n = x0.len();
    if n == 0 {
        return Err(MinimizerError::InvalidDimension);
    }
    minimizer.check()?;
    let mut eval = Evaluator::new(f, n);

    let fk = eval.value(x0);
    if !fk.is_finite() {
        return Err(MinimizerError::NumericalError(format!(
            "the function value at the initial position is {}",
            fk
        )));
    }
    let dfk = eval.gradient(x0)?;
    let d2fk = if minimizer.needs_hessian() {
        Some(eval.hessian(x0)?)
    } else {
        None
    };
    let mut state = IterationState {
        xk: x0.clone(),
        fk,
        dfk,
        d2fk,
        pk: Array1::zeros(n),
        delta: 1.0,
        lambda: 1.0,
        moved: true,
    };
    minimizer.setup(&mut eval, &mut state)?;
    debug!("{}: x0 = {}, f0 = {}", minimizer.name(), x0, fk);

    if max_iterations == 0 {
        warn!("{}: {}", minimizer.name(), MinimizerWarning::MaxIterationsReached);
        return Ok(OptimisationResult::new(
            state.xk,
            state.fk,
            0,
            &eval,
            Some(MinimizerWarning::MaxIterationsReached),
        ));
    }

    let mut k = 0;
    loop {
        let trial = minimizer.step(&mut eval, &state)?;
        if !trial.f.is_finite() || !Vector::is_finite(&trial.x) {
            return Err(MinimizerError::NumericalError(format!(
                "non-finite trial point at iteration {}",
                k + 1
            )));
        }
        debug!(
            "{} k: {} f: {} |g|: {} alpha: {} delta: {} lambda: {} moved: {}",
            minimizer.name(),
            k,
            trial.f,
            Vector::norm(&trial.g),
            trial.alpha,
            trial.delta,
            trial.lambda,
            trial.moved
        );

        if k + 1 >= max_iterations {
            warn!("{}: {}", minimizer.name(), MinimizerWarning::MaxIterationsReached);
            return Ok(OptimisationResult::new(
                trial.x,
                trial.f,
                k + 1,
                &eval,
                Some(MinimizerWarning::MaxIterationsReached),
            ));
        }

        if minimizer.converged(conv, &state, &trial) {
            debug!("{} converged after {} iterations", minimizer.name(), k + 1);
            return Ok(OptimisationResult::new(
                trial.x,
                trial.f,
                k + 1,
                &eval,
                minimizer.warning(),
            ));
        }

        state = minimizer.update(&mut eval, &state, trial)?;
        k += 1;
    }
}

#[cfg(test)]
mod minimize_iteration_tests {
    use super::*;
    use crate::minimize::objective::MultiDimGradFn;

    /// Fixed-step gradient descent, enough to drive the loop
    struct HalfStep {}

    impl Minimizer for HalfStep {
        fn name(&self) -> String {
            "half step".to_string()
        }

        fn step(
            &mut self,
            eval: &mut Evaluator,
            state: &IterationState,
        ) -> Result<Trial, MinimizerError> {
            let pk = -&state.dfk * 0.25;
            let x = &state.xk + &pk;
            let f = eval.value(&x);
            let g = eval.gradient(&x)?;
            Ok(Trial::moved_to(state, x, f, g, pk, 1.0))
        }
    }

    fn quadratic() -> impl ObjHessFn + Clone {
        MultiDimGradFn::new(|x: &Array1<f64>| x.dot(x), |x: &Array1<f64>| x * 2.0)
    }

    #[test]
    fn test_loop_converges() {
        let f = quadratic();
        let conv = ConvergenceTest::new(None, Some(1e-10)).unwrap();
        let result = HalfStep {}.minimise(&f, &array![1.0, -2.0], &conv, 1000).unwrap();
        // x halves every iteration
        assert!(result.f < 1e-20);
        assert_eq!(result.warning, None);
        assert_eq!(result.f_count, result.iterations + 1);
        assert_eq!(result.g_count, result.iterations + 1);
        assert_eq!(result.h_count, 0);
    }

    #[test]
    fn test_loop_max_iterations() {
        let f = quadratic();
        let conv = ConvergenceTest::new(Some(0.0), None).unwrap();
        let result = HalfStep {}.minimise(&f, &array![1.0], &conv, 3).unwrap();
        assert_eq!(result.iterations, 3);
        assert_eq!(result.x, array![0.125]);
        assert_eq!(result.warning, Some(MinimizerWarning::MaxIterationsReached));
    }

    #[test]
    fn test_loop_zero_iterations() {
        let f = quadratic();
        let conv = ConvergenceTest::new(Some(1e-10), None).unwrap();
        let result = HalfStep {}.minimise(&f, &array![1.0], &conv, 0).unwrap();
        assert_eq!(result.iterations, 0);
        assert_eq!(result.x, array![1.0]);
        assert_eq!(result.f_count, 1);
    }

    #[test]
    fn test_loop_rejects_bad_start() {
        let f = quadratic();
        let conv = ConvergenceTest::new(Some(1e-10), None).unwrap();
        assert_eq!(
            HalfStep {}.minimise(&f, &array![], &conv, 10),
            Err(MinimizerError::InvalidDimension)
        );
        assert!(matches!(
            HalfStep {}.minimise(&f, &array![f64::NAN], &conv, 10),
            Err(MinimizerError::NumericalError(_))
        ));
    }

    #[test]
    fn test_result_serialises() {
        let f = quadratic();
        let conv = ConvergenceTest::new(Some(0.0), None).unwrap();
        let result = HalfStep {}.minimise(&f, &array![1.0], &conv, 1).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["iterations"], 1);
        assert_eq!(json["warning"], "MaxIterationsReached");
    }
}
