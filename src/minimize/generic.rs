use crate::minimize::{
    MinimizerError,
    conjugate_gradient::{ConjGrad, ConjGradMethod},
    convergence::ConvergenceTest,
    coordinate_descent::CoordinateDescent,
    grid::grid_search,
    hessian_mods::hessian_mod_from_kind,
    iteration::{Minimizer, OptimisationResult, run},
    levenberg_marquardt::LevenbergMarquardt,
    method_of_multipliers::MethodOfMultipliers,
    newton::Newton,
    newton_cg::NewtonCg,
    objective::{Evaluator, ObjHessFn},
    options::{Algorithm, HessianModKind, HessianType, LineSearchKind, MinOptions},
    quasi_newton::QuasiNewton,
    steepest_descent::SteepestDescent,
    trust_region::{CauchyPoint, Dogleg, Steihaug, TrustRegion, TrustRegionStep},
};
use log::info;
use ndarray::prelude::*;

pub const DEFAULT_FUNC_TOL: f64 = 1e-25;
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000_000;

fn trust_region(
    generator: Box<dyn TrustRegionStep>,
    options: &MinOptions,
) -> TrustRegion {
    let hessian_type = options.hessian_type.unwrap_or(HessianType::Newton);
    let modifier = if hessian_type == HessianType::Bfgs || !generator.needs_positive_definite() {
        None
    } else {
        hessian_mod_from_kind(options.hessian_mod.unwrap_or(HessianModKind::Gmw), options.mach_acc)
    };
    TrustRegion::new_boxed(generator, hessian_type, modifier, &options.trust_region)
}

fn build_minimizer(
    algorithm: Algorithm,
    options: &MinOptions,
) -> Result<Box<dyn Minimizer>, MinimizerError> {
    let ls = &options.line_search_params;
    let minimizer: Box<dyn Minimizer> = match algorithm {
        Algorithm::SteepestDescent => Box::new(SteepestDescent::new(
            options.line_search.unwrap_or(LineSearchKind::Backtrack),
            ls,
        )),
        Algorithm::CoordinateDescent => Box::new(CoordinateDescent::new(
            options.line_search.unwrap_or(LineSearchKind::Backtrack),
            ls,
        )),
        Algorithm::Bfgs => Box::new(QuasiNewton::new(
            options.line_search.unwrap_or(LineSearchKind::MoreThuente),
            ls,
        )),
        Algorithm::Newton => Box::new(Newton::new(
            options.line_search.unwrap_or(LineSearchKind::MoreThuente),
            options.hessian_mod.unwrap_or(HessianModKind::Gmw),
            ls,
            options.mach_acc,
        )),
        Algorithm::NewtonCg => Box::new(NewtonCg::new(
            options.line_search.unwrap_or(LineSearchKind::MoreThuente),
            ls,
        )),
        Algorithm::LevenbergMarquardt => {
            let data = options.least_squares.clone().ok_or_else(|| {
                MinimizerError::InitializationError(
                    "Levenberg-Marquardt needs the model Jacobian and measurement errors".to_string(),
                )
            })?;
            Box::new(LevenbergMarquardt::new_boxed(data, &options.lm))
        }
        Algorithm::CauchyPoint => Box::new(trust_region(Box::new(CauchyPoint {}), options)),
        Algorithm::Dogleg => Box::new(trust_region(Box::new(Dogleg {}), options)),
        Algorithm::Steihaug => Box::new(trust_region(Box::new(Steihaug::default()), options)),
        Algorithm::FletcherReeves
        | Algorithm::PolakRibiere
        | Algorithm::PolakRibierePlus
        | Algorithm::HestenesStiefel => {
            let method = ConjGradMethod::from_algorithm(algorithm).ok_or_else(|| {
                MinimizerError::InitializationError(format!("{} is not a conjugate gradient method", algorithm))
            })?;
            Box::new(ConjGrad::new(
                method,
                options.line_search.unwrap_or(LineSearchKind::MoreThuente),
                ls,
            ))
        }
        Algorithm::Fixed | Algorithm::Grid | Algorithm::MethodOfMultipliers => {
            return Err(MinimizerError::InitializationError(format!(
                "{} is not an iterative unconstrained algorithm",
                algorithm
            )));
        }
    };
    Ok(minimizer)
}

/// Minimise f from x0 with the given algorithm.
///
/// Options are validated against the algorithm and the objective before f is
/// evaluated. `Fixed` returns f(x0), `Grid` searches `options.grid` and ignores
/// x0 beyond its length.
pub fn generic_minimise(
    f: &dyn ObjHessFn,
    x0: &Array1<f64>,
    algorithm: Algorithm,
    options: &MinOptions,
    func_tol: Option<f64>,
    grad_tol: Option<f64>,
    max_iterations: usize,
) -> Result<OptimisationResult, MinimizerError> {
    options.validate(algorithm, f.has_hessian())?;

    match algorithm {
        Algorithm::Fixed => {
            if x0.is_empty() {
                return Err(MinimizerError::InvalidDimension);
            }
            let mut eval = Evaluator::new(f, x0.len());
            let fx = eval.value(x0);
            Ok(OptimisationResult::from_counts(x0.clone(), fx, 0, eval.counts(), None))
        }
        Algorithm::Grid => {
            if x0.len() != options.grid.len() {
                return Err(MinimizerError::InvalidDimension);
            }
            grid_search(f, &options.grid)
        }
        Algorithm::MethodOfMultipliers => {
            let inner = options.inner.ok_or_else(|| {
                MinimizerError::InitializationError(
                    "the unconstrained minimisation algorithm has not been specified".to_string(),
                )
            })?;
            MethodOfMultipliers::new(inner, options).minimise(f, x0, func_tol, grad_tol, max_iterations)
        }
        _ => {
            let conv = ConvergenceTest::new(func_tol, grad_tol)?;
            let mut minimizer = build_minimizer(algorithm, options)?;
            info!("minimising with {}", minimizer.name());
            run(minimizer.as_mut(), f, x0, &conv, max_iterations)
        }
    }
}

/// String entry point: `minimise(&f, &x0, "Newton", &["MT", "GMW"], ...)`.
///
/// Constraints, least-squares data and grids cannot be given as tokens, use
/// [`generic_minimise`] with a [`MinOptions`] for those.
pub fn minimise(
    f: &dyn ObjHessFn,
    x0: &Array1<f64>,
    name: &str,
    tokens: &[&str],
    func_tol: Option<f64>,
    grad_tol: Option<f64>,
    max_iterations: usize,
) -> Result<OptimisationResult, MinimizerError> {
    let algorithm: Algorithm = name
        .parse()
        .map_err(|e: simple_error::SimpleError| MinimizerError::InitializationError(e.to_string()))?;
    let options = MinOptions::parse(algorithm, tokens)?;
    generic_minimise(f, x0, algorithm, &options, func_tol, grad_tol, max_iterations)
}
