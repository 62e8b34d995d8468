pub use crate::error::{MinimizerError, MinimizerWarning};

pub mod conjugate_gradient;
pub mod constraint;
pub mod convergence;
pub mod coordinate_descent;
pub mod generic;
pub mod grid;
pub mod hessian_mods;
pub mod iteration;
pub mod levenberg_marquardt;
pub mod line_search;
pub mod linalg;
pub mod method_of_multipliers;
pub mod newton;
pub mod newton_cg;
pub mod objective;
pub mod options;
pub mod quasi_newton;
pub mod steepest_descent;
pub mod trust_region;

pub use self::conjugate_gradient::{ConjGrad, ConjGradMethod};
pub use self::constraint::{
    Constraint, LinearConstraint, QuadraticConstraint, create_box_constraints,
    create_linear_constraints,
};
pub use self::convergence::ConvergenceTest;
pub use self::coordinate_descent::CoordinateDescent;
pub use self::generic::{DEFAULT_FUNC_TOL, DEFAULT_MAX_ITERATIONS, generic_minimise, minimise};
pub use self::grid::{GridAxis, grid_search};
pub use self::hessian_mods::{
    AddedIdentity, Gmw, HessianModifier, ModifiedCholesky, Se99, newton_direction,
};
pub use self::iteration::{IterationState, Minimizer, OptimisationResult, Trial};
pub use self::levenberg_marquardt::LevenbergMarquardt;
pub use self::line_search::{
    Backtrack, LineSearch, LineSearchResult, MoreThuente, NoLineSearch, NocedalWrightInterpol,
    NocedalWrightWolfe,
};
pub use self::linalg::Matrix;
pub use self::method_of_multipliers::{AugmentedLagrangian, MethodOfMultipliers};
pub use self::newton::Newton;
pub use self::newton_cg::NewtonCg;
pub use self::objective::{
    Evaluator, LeastSquaresFn, MultiDimFn, MultiDimGradFn, MultiDimHessFn, MultiDimNumGradFn,
    ObjFn, ObjGradFn, ObjHessFn, WeightedLeastSquares,
};
pub use self::options::{
    Algorithm, HessianModKind, HessianType, LineSearchKind, LineSearchParams, LmParams,
    MinOption, MinOptions, MomParams, TrustRegionParams,
};
pub use self::quasi_newton::QuasiNewton;
pub use self::steepest_descent::SteepestDescent;
pub use self::trust_region::{
    CauchyPoint, Dogleg, ModelHessian, Steihaug, TrustRegion, TrustRegionStep,
};
