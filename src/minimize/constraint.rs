use crate::minimize::MinimizerError;
use dyn_clone::DynClone;
use ndarray::prelude::*;
use std::fmt;

/// Inequality constraint c(x) >= 0
pub trait Constraint: DynClone {
    fn evaluate(&self, x: &Array1<f64>) -> f64;
    fn gradient(&self, x: &Array1<f64>) -> Array1<f64>;
    fn hessian(&self, x: &Array1<f64>) -> Array2<f64>;
}
dyn_clone::clone_trait_object!(Constraint);

/// Linear constraint: a^T x - b >= 0
#[derive(Clone)]
pub struct LinearConstraint {
    pub a: Array1<f64>,
    pub b: f64,
}

impl LinearConstraint {
    pub fn new(a: Array1<f64>, b: f64) -> Self {
        Self { a, b }
    }
}

impl Constraint for LinearConstraint {
    fn evaluate(&self, x: &Array1<f64>) -> f64 {
        self.a.dot(x) - self.b
    }

    fn gradient(&self, _x: &Array1<f64>) -> Array1<f64> {
        self.a.clone()
    }

    fn hessian(&self, x: &Array1<f64>) -> Array2<f64> {
        let n = x.len();
        Array2::zeros((n, n))
    }
}

impl fmt::Debug for LinearConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinearConstraint( {:?}^T * x >= {:?})", self.a, self.b)
    }
}

/// Quadratic constraint: x^T Q x + a^T x + b >= 0, with Q symmetric
#[derive(Clone)]
pub struct QuadraticConstraint {
    pub q: Array2<f64>,
    pub a: Array1<f64>,
    pub b: f64,
}

impl QuadraticConstraint {
    pub fn new(q: Array2<f64>, a: Array1<f64>, b: f64) -> Self {
        Self { q, a, b }
    }
}

impl Constraint for QuadraticConstraint {
    fn evaluate(&self, x: &Array1<f64>) -> f64 {
        x.dot(&self.q.dot(x)) + self.a.dot(x) + self.b
    }

    fn gradient(&self, x: &Array1<f64>) -> Array1<f64> {
        &self.a + &(self.q.dot(x) * 2.0)
    }

    fn hessian(&self, _x: &Array1<f64>) -> Array2<f64> {
        &self.q * 2.0
    }
}

impl fmt::Debug for QuadraticConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QuadraticConstraint( x^T * {:?} * x + {:?}^T * x + {:?} >= 0)",
            self.q, self.a, self.b
        )
    }
}

/// Create box constraints: l <= x <= u, skipping infinite bounds
pub fn create_box_constraints(
    lower: &Array1<f64>,
    upper: &Array1<f64>,
) -> Vec<Box<dyn Constraint>> {
    let mut constraints = Vec::new();

    for (i, (&l, &u)) in lower.iter().zip(upper.iter()).enumerate() {
        // x_i - l >= 0
        if l.is_finite() {
            let mut a = Array1::zeros(lower.len());
            a[i] = 1.0;
            constraints.push(Box::new(LinearConstraint::new(a, l)) as Box<dyn Constraint>);
        }

        // -x_i + u >= 0
        if u.is_finite() {
            let mut a = Array1::zeros(lower.len());
            a[i] = -1.0;
            constraints.push(Box::new(LinearConstraint::new(a, -u)) as Box<dyn Constraint>);
        }
    }

    constraints
}

/// One constraint per row of A x >= b
pub fn create_linear_constraints(
    a: &Array2<f64>,
    b: &Array1<f64>,
) -> Result<Vec<Box<dyn Constraint>>, MinimizerError> {
    if a.nrows() != b.len() || a.nrows() == 0 {
        return Err(MinimizerError::InvalidDimension);
    }
    Ok(a.outer_iter()
        .zip(b.iter())
        .map(|(row, &bi)| Box::new(LinearConstraint::new(row.to_owned(), bi)) as Box<dyn Constraint>)
        .collect())
}

/// Values, gradients (one row each) and Hessians of a constraint set at x.
pub(crate) fn evaluate_constraints(
    constraints: &[Box<dyn Constraint>],
    x: &Array1<f64>,
) -> Result<(Array1<f64>, Array2<f64>, Vec<Array2<f64>>), MinimizerError> {
    let n = x.len();
    let m = constraints.len();
    let mut c = Array1::zeros(m);
    let mut dc = Array2::zeros((m, n));
    let mut d2c = Vec::with_capacity(m);
    for (i, constraint) in constraints.iter().enumerate() {
        let grad = constraint.gradient(x);
        let hess = constraint.hessian(x);
        if grad.len() != n || hess.dim() != (n, n) {
            return Err(MinimizerError::ConstraintViolation);
        }
        c[i] = constraint.evaluate(x);
        dc.row_mut(i).assign(&grad);
        d2c.push(hess);
    }
    Ok((c, dc, d2c))
}

#[cfg(test)]
mod minimize_constraint_tests {
    use super::*;
    use float_cmp::{F64Margin, approx_eq};

    const MARGIN: F64Margin = F64Margin {
        epsilon: 1e-12,
        ulps: 10,
    };

    #[test]
    fn test_linear_constraint() {
        let constraint = LinearConstraint::new(array![1.0, 1.0], 1.0);
        let x = array![0.5, 0.3];

        // x1 + x2 - 1 >= 0 is violated at x
        assert!(approx_eq!(f64, constraint.evaluate(&x), -0.2, MARGIN));
        assert_eq!(constraint.gradient(&x), array![1.0, 1.0]);
        assert_eq!(constraint.hessian(&x), Array2::<f64>::zeros((2, 2)));
    }

    #[test]
    fn test_quadratic_constraint() {
        // Unit disc, 1 - x^T x >= 0
        let constraint = QuadraticConstraint::new(-Array2::<f64>::eye(2), array![0.0, 0.0], 1.0);
        let x = array![0.6, 0.8];

        assert!(constraint.evaluate(&x).abs() < 1e-12);
        assert_eq!(constraint.gradient(&x), array![-1.2, -1.6]);
        assert_eq!(constraint.hessian(&x), Array2::<f64>::eye(2) * -2.0);
    }

    #[test]
    fn test_box_constraints() {
        let lower = array![0.0, -1.0];
        let upper = array![2.0, f64::INFINITY];
        let constraints = create_box_constraints(&lower, &upper);
        assert_eq!(constraints.len(), 3);

        for constraint in &constraints {
            assert!(constraint.evaluate(&array![1.0, 0.0]) > 0.0);
            assert!(constraint.evaluate(&array![0.0, -1.0]) >= 0.0);
        }
        assert!(constraints.iter().any(|c| c.evaluate(&array![2.5, 0.0]) < 0.0));
    }

    #[test]
    fn test_linear_constraints_from_matrix() {
        let a = array![[1.0, 0.0], [-1.0, -1.0]];
        let b = array![0.0, -3.0];
        let constraints = create_linear_constraints(&a, &b).unwrap();
        let (c, dc, d2c) = evaluate_constraints(&constraints, &array![1.0, 1.0]).unwrap();
        assert_eq!(c, array![1.0, 1.0]);
        assert_eq!(dc, a);
        assert_eq!(d2c.len(), 2);

        assert!(matches!(
            create_linear_constraints(&a, &array![1.0]),
            Err(MinimizerError::InvalidDimension)
        ));
    }

    #[test]
    fn test_mismatched_constraint_gradient() {
        let constraints: Vec<Box<dyn Constraint>> =
            vec![Box::new(LinearConstraint::new(array![1.0, 0.0, 0.0], 0.0))];
        assert_eq!(
            evaluate_constraints(&constraints, &array![1.0, 1.0]).unwrap_err(),
            MinimizerError::ConstraintViolation
        );
    }
}
