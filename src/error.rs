use serde::Serialize;
use std::fmt;

/// Error types for optimizers
///
/// Every variant aborts the current run. Conditions the optimizers recover from
/// locally are reported through [`MinimizerWarning`] instead.
#[derive(Debug, Clone, PartialEq)]
pub enum MinimizerError {
    ConstraintViolation,
    GradientEvaluationError,
    HessianEvaluationError,
    InitializationError(String),
    InvalidDimension,
    InvalidTolerance,
    NotDescentDirection,
    NumericalError(String),
    SingularSystem(String),
}

impl fmt::Display for MinimizerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MinimizerError::ConstraintViolation => {
                write!(f, "Constraint values do not match the constraint gradients")
            }
            MinimizerError::GradientEvaluationError => write!(f, "Gradient evaluation error"),
            MinimizerError::HessianEvaluationError => write!(f, "Hessian evaluation error"),
            MinimizerError::InitializationError(msg) => {
                write!(f, "Initialisation of minimisation has failed: {}", msg)
            }
            MinimizerError::InvalidDimension => write!(f, "Invalid dimension or empty vector"),
            MinimizerError::InvalidTolerance => {
                write!(f, "Tolerances must be positive and at least one must be set")
            }
            MinimizerError::NotDescentDirection => write!(
                f,
                "The directional derivative is not negative, p is not a descent direction"
            ),
            MinimizerError::NumericalError(msg) => write!(f, "Numerical error: {}", msg),
            MinimizerError::SingularSystem(msg) => write!(f, "Linear system is singular: {}", msg),
        }
    }
}

impl std::error::Error for MinimizerError {}

/// Non-fatal conditions recorded in a minimisation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MinimizerWarning {
    /// The iteration ceiling was hit before the convergence test fired.
    MaxIterationsReached,
    /// A line search exhausted its iteration cap and returned its best step.
    LineSearchStalled,
    /// The BFGS curvature y^T s was not positive; the approximation was reset.
    IndefiniteUpdate,
    /// A Hessian was too close to singular for the requested solve.
    NearSingularHessian,
    /// The method of multipliers penalty parameter fell below its floor.
    PenaltyUnderflow,
}

impl fmt::Display for MinimizerWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MinimizerWarning::MaxIterationsReached => {
                write!(f, "Maximum number of iterations reached")
            }
            MinimizerWarning::LineSearchStalled => {
                write!(f, "Line search iteration limit reached")
            }
            MinimizerWarning::IndefiniteUpdate => {
                write!(f, "Indefinite quasi-Newton update, approximation reset")
            }
            MinimizerWarning::NearSingularHessian => write!(f, "Near singular Hessian"),
            MinimizerWarning::PenaltyUnderflow => write!(f, "Mu too small"),
        }
    }
}
