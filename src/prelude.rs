//! relax-minimise prelude.
//!
//! This module contains the most used types, traits and functions, which you
//! can import easily as a group.
//!
//! ```
//! use relax_minimise::prelude::*;
//!
//! ```

#[doc(no_inline)]
pub use crate::error::{MinimizerError, MinimizerWarning};

#[doc(no_inline)]
pub use crate::minimize::{
    DEFAULT_FUNC_TOL, DEFAULT_MAX_ITERATIONS, generic_minimise, minimise,
};

#[doc(no_inline)]
pub use crate::minimize::{
    Algorithm, HessianModKind, HessianType, LineSearchKind, MinOption, MinOptions,
};

#[doc(no_inline)]
pub use crate::minimize::{
    Constraint, LinearConstraint, QuadraticConstraint, create_box_constraints,
    create_linear_constraints,
};

#[doc(no_inline)]
pub use crate::minimize::{
    LeastSquaresFn, MultiDimFn, MultiDimGradFn, MultiDimHessFn, MultiDimNumGradFn, ObjFn,
    ObjGradFn, ObjHessFn, WeightedLeastSquares,
};

#[doc(no_inline)]
pub use crate::minimize::{ConvergenceTest, GridAxis, Minimizer, OptimisationResult};
