use crate::minimize::{
    MinimizerError, MinimizerWarning,
    hessian_mods::{HessianModifier, ModifiedCholesky},
    iteration::{IterationState, Minimizer, Trial},
    linalg::{Matrix, Vector},
    objective::Evaluator,
    options::{HessianType, TrustRegionParams},
    quasi_newton::bfgs_hessian_update,
};
use log::{debug, warn};
use ndarray::prelude::*;
use std::fmt;

mod cauchy;
mod dogleg;
mod steihaug;

pub use self::cauchy::CauchyPoint;
pub use self::dogleg::Dogleg;
pub use self::steihaug::Steihaug;

/// Model Hessian B of a trust region step, with its Cholesky factor when one is known.
#[derive(Debug, Clone)]
pub struct ModelHessian {
    pub b: Array2<f64>,
    pub factor: Option<ModifiedCholesky>,
}

impl ModelHessian {
    pub fn new(b: Array2<f64>) -> Self {
        ModelHessian { b, factor: None }
    }

    /// B = H + E from a modified Cholesky factorisation of H
    pub fn from_factor(factor: ModifiedCholesky) -> Self {
        ModelHessian {
            b: factor.reconstruct(),
            factor: Some(factor),
        }
    }

    /// Solve B x = rhs, by substitution through the factor when there is one.
    pub fn solve(&self, rhs: &Array1<f64>) -> Result<Array1<f64>, MinimizerError> {
        match &self.factor {
            Some(factor) => factor.solve(rhs),
            None => Matrix::solve_linear_system(&self.b, rhs),
        }
    }
}

/// Approximate minimiser of the model m(p) = f + g^T p + p^T B p / 2
/// subject to ||p|| <= delta.
pub trait TrustRegionStep {
    fn step(&self, g: &Array1<f64>, model: &ModelHessian, delta: f64) -> Result<Array1<f64>, MinimizerError>;

    fn name(&self) -> &'static str;

    /// Whether the step needs a positive definite model Hessian
    fn needs_positive_definite(&self) -> bool {
        false
    }
}

/// tau >= 0 with ||z + tau d|| = delta, for ||z|| <= delta
pub(crate) fn boundary_tau(z: &Array1<f64>, d: &Array1<f64>, delta: f64) -> f64 {
    let a = d.dot(d);
    let b = 2.0 * z.dot(d);
    let c = z.dot(z) - delta * delta;
    let disc = (b * b - 4.0 * a * c).max(0.0);
    (-b + disc.sqrt()) / (2.0 * a)
}

/// Reduction predicted by the quadratic model, -(g^T p + p^T B p / 2)
pub fn predicted_reduction(g: &Array1<f64>, b: &Array2<f64>, p: &Array1<f64>) -> f64 {
    -(g.dot(p) + 0.5 * Matrix::quadratic_form(b, p))
}

/// Radius for the next iteration from the reduction ratio rho.
pub fn update_radius(
    delta: f64,
    rho: f64,
    predicted: f64,
    step_norm: f64,
    params: &TrustRegionParams,
) -> f64 {
    if !(rho >= 0.25) || predicted < 0.0 {
        0.25 * delta
    } else if rho > 0.75 && (step_norm - delta).abs() <= 1e-5 * delta {
        (2.0 * delta).min(params.delta_max)
    } else {
        delta
    }
}

/// Trust region minimiser with a Newton or BFGS model Hessian.
///
/// The model Hessian is refreshed only after an accepted step. A rejected
/// step keeps x and shrinks the radius.
pub struct TrustRegion {
    generator: Box<dyn TrustRegionStep>,
    hessian_type: HessianType,
    modifier: Option<Box<dyn HessianModifier>>,
    params: TrustRegionParams,
    warning: Option<MinimizerWarning>,
}

impl TrustRegion {
    pub fn new<S>(
        generator: S,
        hessian_type: HessianType,
        modifier: Option<Box<dyn HessianModifier>>,
        params: &TrustRegionParams,
    ) -> Self
    where
        S: TrustRegionStep + 'static,
    {
        TrustRegion::new_boxed(Box::new(generator), hessian_type, modifier, params)
    }

    pub fn new_boxed(
        generator: Box<dyn TrustRegionStep>,
        hessian_type: HessianType,
        modifier: Option<Box<dyn HessianModifier>>,
        params: &TrustRegionParams,
    ) -> Self {
        TrustRegion {
            generator,
            hessian_type,
            modifier,
            params: *params,
            warning: None,
        }
    }

    /// Hessian used by the step and the model.
    ///
    /// When the step generator needs a positive definite matrix, B travels with
    /// its Cholesky factor. If B is not positive definite the modifier's B + E
    /// and its factor take its place.
    fn model_hessian(&mut self, b: &Array2<f64>) -> Result<ModelHessian, MinimizerError> {
        if !self.generator.needs_positive_definite() {
            return Ok(ModelHessian::new(b.clone()));
        }
        if let Some(l) = Matrix::cholesky(b) {
            return Ok(ModelHessian {
                b: b.clone(),
                factor: Some(ModifiedCholesky::unmodified(l)),
            });
        }
        match &self.modifier {
            Some(modifier) => {
                let factor = modifier.factorise(b)?;
                debug!(
                    "{} model Hessian modified by {}, max perturbation {}",
                    self.generator.name(),
                    modifier.kind(),
                    factor.max_perturbation()
                );
                Ok(ModelHessian::from_factor(factor))
            }
            None => {
                if self.warning.is_none() {
                    warn!("{}: {}", self.generator.name(), MinimizerWarning::NearSingularHessian);
                }
                self.warning = Some(MinimizerWarning::NearSingularHessian);
                Ok(ModelHessian::new(b.clone()))
            }
        }
    }
}

impl fmt::Debug for TrustRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustRegion")
            .field("generator", &self.generator.name())
            .field("hessian_type", &self.hessian_type)
            .field("modifier", &self.modifier.as_ref().map(|m| m.kind()))
            .field("params", &self.params)
            .finish()
    }
}

impl Minimizer for TrustRegion {
    fn name(&self) -> String {
        format!("{} trust region ({} Hessian)", self.generator.name(), self.hessian_type)
    }

    fn needs_hessian(&self) -> bool {
        self.hessian_type == HessianType::Newton
    }

    fn check(&self) -> Result<(), MinimizerError> {
        self.params.validate()
    }

    fn setup(&mut self, _eval: &mut Evaluator, state: &mut IterationState) -> Result<(), MinimizerError> {
        state.delta = self.params.delta0;
        if self.hessian_type == HessianType::Bfgs {
            state.d2fk = Some(Array2::eye(state.xk.len()));
        }
        Ok(())
    }

    fn step(&mut self, eval: &mut Evaluator, state: &IterationState) -> Result<Trial, MinimizerError> {
        if Vector::norm(&state.dfk) == 0.0 {
            let mut trial = Trial::stay(state);
            trial.moved = true;
            return Ok(trial);
        }
        let b = state
            .d2fk
            .as_ref()
            .ok_or(MinimizerError::HessianEvaluationError)?;
        let model = self.model_hessian(b)?;

        let pk = self.generator.step(&state.dfk, &model, state.delta)?;
        let predicted = predicted_reduction(&state.dfk, &model.b, &pk);
        let x = &state.xk + &pk;
        let f = eval.value(&x);
        let actual = state.fk - f;
        let rho = if predicted == 0.0 { 1e99 } else { actual / predicted };
        let step_norm = Vector::norm(&pk);
        let delta = update_radius(state.delta, rho, predicted, step_norm, &self.params);
        let accepted = rho > self.params.eta && predicted > 0.0;
        debug!(
            "{} rho: {} predicted: {} |p|: {} delta: {} -> {} accepted: {}",
            self.generator.name(),
            rho,
            predicted,
            step_norm,
            state.delta,
            delta,
            accepted
        );

        let mut trial = if accepted {
            let g = eval.gradient(&x)?;
            Trial::moved_to(state, x, f, g, pk, 1.0)
        } else {
            Trial::stay(state)
        };
        trial.delta = delta;
        Ok(trial)
    }

    fn update(
        &mut self,
        eval: &mut Evaluator,
        state: &IterationState,
        trial: Trial,
    ) -> Result<IterationState, MinimizerError> {
        if !trial.moved {
            return Ok(IterationState::from_trial(trial, state.d2fk.clone()));
        }
        let d2fk = match self.hessian_type {
            HessianType::Newton => eval.hessian(&trial.x)?,
            HessianType::Bfgs => {
                let n = trial.x.len();
                let b = state.d2fk.clone().unwrap_or_else(|| Array2::eye(n));
                let s = &trial.x - &state.xk;
                let y = &trial.g - &state.dfk;
                if Vector::norm(&s) == 0.0 {
                    b
                } else {
                    match bfgs_hessian_update(&b, &s, &y) {
                        Some(b) => b,
                        None => {
                            warn!("{}: {}", self.generator.name(), MinimizerWarning::IndefiniteUpdate);
                            self.warning = Some(MinimizerWarning::IndefiniteUpdate);
                            Array2::eye(n)
                        }
                    }
                }
            }
        };
        Ok(IterationState::from_trial(trial, Some(d2fk)))
    }

    fn warning(&self) -> Option<MinimizerWarning> {
        self.warning
    }
}

#[cfg(test)]
mod minimize_trust_region_tests {
    use super::*;
    use crate::minimize::{
        convergence::ConvergenceTest,
        hessian_mods::Gmw,
        line_search::minimize_line_search_tests::create_rosenbrock,
        objective::{MultiDimHessFn, ObjHessFn},
    };

    fn rosenbrock_with_hessian() -> impl ObjHessFn + Clone {
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

    #[test]
    fn test_radius_rules() {
        let params = TrustRegionParams::default();
        assert_eq!(update_radius(1.0, 0.1, 1.0, 1.0, &params), 0.25);
        assert_eq!(update_radius(1.0, 0.9, -1.0, 1.0, &params), 0.25);
        assert_eq!(update_radius(1.0, f64::NAN, 1.0, 1.0, &params), 0.25);
        assert_eq!(update_radius(1.0, 0.9, 1.0, 1.0, &params), 2.0);
        // Interior step, the radius is not the limit
        assert_eq!(update_radius(1.0, 0.9, 1.0, 0.5, &params), 1.0);
        assert_eq!(update_radius(1.0, 0.5, 1.0, 1.0, &params), 1.0);
        assert_eq!(update_radius(8e4, 0.9, 1.0, 8e4, &params), 1e5);
    }

    #[test]
    fn test_boundary_tau() {
        let z = array![0.0, 0.0];
        let d = array![3.0, 4.0];
        assert!((boundary_tau(&z, &d, 10.0) - 2.0).abs() < 1e-14);
        let z = array![1.0, 0.0];
        let d = array![1.0, 0.0];
        assert!((boundary_tau(&z, &d, 3.0) - 2.0).abs() < 1e-14);
    }

    #[test]
    fn test_dogleg_newton_rosenbrock() {
        let f = rosenbrock_with_hessian();
        let conv = ConvergenceTest::new(None, Some(1e-8)).unwrap();
        let result = TrustRegion::new(
            Dogleg {},
            HessianType::Newton,
            Some(Box::new(Gmw::default())),
            &TrustRegionParams::default(),
        )
        .minimise(&f, &array![-1.2, 1.0], &conv, 1000)
        .unwrap();
        assert!((result.x[0] - 1.0).abs() < 1e-6);
        assert!((result.x[1] - 1.0).abs() < 1e-6);
        assert!(result.iterations < 200);
    }

    #[test]
    fn test_dogleg_bfgs_rosenbrock() {
        let f = create_rosenbrock();
        let conv = ConvergenceTest::new(None, Some(1e-6)).unwrap();
        let result = TrustRegion::new(Dogleg {}, HessianType::Bfgs, None, &TrustRegionParams::default())
            .minimise(&f, &array![-1.2, 1.0], &conv, 5000)
            .unwrap();
        assert!((result.x[0] - 1.0).abs() < 1e-4);
        assert!((result.x[1] - 1.0).abs() < 1e-4);
        assert_eq!(result.h_count, 0);
    }

    #[test]
    fn test_steihaug_rosenbrock() {
        let f = rosenbrock_with_hessian();
        let conv = ConvergenceTest::new(None, Some(1e-8)).unwrap();
        let result = TrustRegion::new(Steihaug::default(), HessianType::Newton, None, &TrustRegionParams::default())
            .minimise(&f, &array![-1.2, 1.0], &conv, 1000)
            .unwrap();
        assert!((result.x[0] - 1.0).abs() < 1e-6);
        assert!((result.x[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cauchy_point_decreases() {
        let f = rosenbrock_with_hessian();
        let conv = ConvergenceTest::new(Some(1e-25), None).unwrap();
        let result = TrustRegion::new(CauchyPoint {}, HessianType::Newton, None, &TrustRegionParams::default())
            .minimise(&f, &array![-1.2, 1.0], &conv, 100)
            .unwrap();
        assert!(result.f < 24.2);
        assert_eq!(result.warning, Some(MinimizerWarning::MaxIterationsReached));
    }

    #[test]
    fn test_rejected_step_keeps_hessian() {
        // Newton overshoots on sqrt(1 + x^2): from x = 2 the full step lands on x = -8
        let f = MultiDimHessFn::new(
            |x: &Array1<f64>| (1.0 + x[0] * x[0]).sqrt(),
            |x: &Array1<f64>| array![x[0] / (1.0 + x[0] * x[0]).sqrt()],
            Some(|x: &Array1<f64>| array![[(1.0 + x[0] * x[0]).powf(-1.5)]]),
        );
        let mut eval = Evaluator::new(&f, 1);
        let x0 = array![2.0];
        let mut state = IterationState {
            xk: x0.clone(),
            fk: eval.value(&x0),
            dfk: eval.gradient(&x0).unwrap(),
            d2fk: Some(eval.hessian(&x0).unwrap()),
            pk: Array1::zeros(1),
            delta: 1.0,
            lambda: 1.0,
            moved: true,
        };
        let params = TrustRegionParams {
            delta0: 1e4,
            ..TrustRegionParams::default()
        };
        let mut tr = TrustRegion::new(Dogleg {}, HessianType::Newton, Some(Box::new(Gmw::default())), &params);
        tr.setup(&mut eval, &mut state).unwrap();

        let trial = tr.step(&mut eval, &state).unwrap();
        assert!(!trial.moved);
        assert_eq!(trial.delta, 2500.0);
        let next = tr.update(&mut eval, &state, trial).unwrap();
        assert_eq!(next.xk, x0);
        assert_eq!(next.d2fk, state.d2fk);
        assert_eq!(eval.counts(), (2, 1, 1));
    }

    #[test]
    fn test_model_hessian_carries_factor() {
        let mut tr = TrustRegion::new(
            Dogleg {},
            HessianType::Newton,
            Some(Box::new(Gmw::default())),
            &TrustRegionParams::default(),
        );
        let b = array![[4.0, 1.0], [1.0, 2.0]];
        let model = tr.model_hessian(&b).unwrap();
        assert_eq!(model.b, b);
        let factor = model.factor.as_ref().unwrap();
        assert_eq!(factor.max_perturbation(), 0.0);
        let x = model.solve(&array![1.0, 1.0]).unwrap();
        assert!(Vector::norm(&(b.dot(&x) - array![1.0, 1.0])) < 1e-14);

        // Indefinite B is replaced by the modifier's B + E
        let h = array![[1.0, 2.0], [2.0, 1.0]];
        let model = tr.model_hessian(&h).unwrap();
        let factor = model.factor.as_ref().unwrap();
        assert!(factor.max_perturbation() > 0.0);
        assert!(Matrix::cholesky(&model.b).is_some());

        // Steihaug works on B itself
        let mut tr = TrustRegion::new(Steihaug::default(), HessianType::Newton, None, &TrustRegionParams::default());
        assert!(tr.model_hessian(&h).unwrap().factor.is_none());
        assert_eq!(tr.warning(), None);
    }

    #[test]
    fn test_rejects_bad_radius() {
        let f = rosenbrock_with_hessian();
        let conv = ConvergenceTest::new(Some(1e-10), None).unwrap();
        let params = TrustRegionParams {
            delta0: 0.0,
            ..TrustRegionParams::default()
        };
        assert!(matches!(
            TrustRegion::new(Dogleg {}, HessianType::Newton, None, &params).minimise(&f, &array![0.0, 0.0], &conv, 10),
            Err(MinimizerError::InitializationError(_))
        ));
    }
}
