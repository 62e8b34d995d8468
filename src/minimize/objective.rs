use crate::minimize::MinimizerError;
use dyn_clone::DynClone;
use log::trace;
use ndarray::prelude::*;

// Define a trait for the objective function
pub trait ObjFn: DynClone {
    fn call(&self, x: &Array1<f64>) -> f64;
}
dyn_clone::clone_trait_object!(ObjFn);

// Define a trait for the gradient function
pub trait ObjGradFn: ObjFn + DynClone {
    fn grad(&self, x: &Array1<f64>) -> Array1<f64>;
}
dyn_clone::clone_trait_object!(ObjGradFn);

// Define a trait for the hessian function
pub trait ObjHessFn: ObjGradFn + DynClone {
    fn hessian(&self, x: &Array1<f64>) -> Array2<f64>;

    /// Whether `hessian` returns the true Hessian rather than the identity placeholder.
    fn has_hessian(&self) -> bool {
        true
    }
}
dyn_clone::clone_trait_object!(ObjHessFn);

/// Model side of a weighted least-squares problem, used by Levenberg-Marquardt.
pub trait LeastSquaresFn: DynClone {
    /// Jacobian of the model values, one row per data point.
    fn model_jacobian(&self, x: &Array1<f64>) -> Array2<f64>;
    /// Measurement errors, one per data point.
    fn errors(&self) -> Array1<f64>;
}
dyn_clone::clone_trait_object!(LeastSquaresFn);

// Wrapper for multi-dimensional functions
#[derive(Clone)]
pub struct MultiDimFn<F>(pub F)
where
    F: Fn(&Array1<f64>) -> f64 + Clone;

// Convenience constructors
impl<F> MultiDimFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    pub fn new(f: F) -> Self {
        MultiDimFn(f)
    }
}

// Implementation for multi-dimensional functions
impl<F> ObjFn for MultiDimFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    fn call(&self, x: &Array1<f64>) -> f64 {
        (self.0)(x)
    }
}

// Wrapper for multi-dimensional function w/gradient
#[derive(Clone)]
pub struct MultiDimGradFn<F, GF>(pub F, pub GF)
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone;

// Convenience constructors
impl<F, GF> MultiDimGradFn<F, GF>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone,
{
    pub fn new(f: F, gf: GF) -> Self {
        MultiDimGradFn(f, gf)
    }
}

impl<F, GF> ObjFn for MultiDimGradFn<F, GF>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone,
{
    fn call(&self, x: &Array1<f64>) -> f64 {
        (self.0)(x)
    }
}

impl<F, GF> ObjGradFn for MultiDimGradFn<F, GF>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone,
{
    fn grad(&self, x: &Array1<f64>) -> Array1<f64> {
        (self.1)(x)
    }
}

// No Hessian available, the identity stands in
impl<F, GF> ObjHessFn for MultiDimGradFn<F, GF>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone,
{
    fn hessian(&self, x: &Array1<f64>) -> Array2<f64> {
        Array2::eye(x.len())
    }

    fn has_hessian(&self) -> bool {
        false
    }
}

// Wrapper for multi-dimensional function w/numerical gradient
#[derive(Clone)]
pub struct MultiDimNumGradFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    f: F,
    step: f64,
}

// Convenience constructors
impl<F> MultiDimNumGradFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    pub fn new(f: F, step: Option<f64>) -> Self {
        Self {
            f,
            step: step.unwrap_or(1e-8),
        }
    }

    /// Central difference gradient
    pub fn numerical_gradient(&self, x: &Array1<f64>) -> Array1<f64> {
        let n = x.len();
        let mut grad = Array1::zeros(n);

        for i in 0..n {
            let mut x_plus_h = x.clone();
            x_plus_h[i] += self.step;
            let f_plus_h = (self.f)(&x_plus_h);

            let mut x_minus_h = x.clone();
            x_minus_h[i] -= self.step;
            let f_minus_h = (self.f)(&x_minus_h);

            grad[i] = (f_plus_h - f_minus_h) / (2.0 * self.step);
        }

        grad
    }
}

impl<F> ObjFn for MultiDimNumGradFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    fn call(&self, x: &Array1<f64>) -> f64 {
        (self.f)(x)
    }
}

impl<F> ObjGradFn for MultiDimNumGradFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    fn grad(&self, x: &Array1<f64>) -> Array1<f64> {
        self.numerical_gradient(x)
    }
}

impl<F> ObjHessFn for MultiDimNumGradFn<F>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
{
    fn hessian(&self, x: &Array1<f64>) -> Array2<f64> {
        Array2::eye(x.len())
    }

    fn has_hessian(&self) -> bool {
        false
    }
}

// Wrapper for multi-dimensional function w/hessian
#[derive(Clone)]
pub struct MultiDimHessFn<F, GF, HF>(pub F, pub GF, pub Option<HF>)
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone,
    HF: Fn(&Array1<f64>) -> Array2<f64> + Clone;

// Convenience constructors
impl<F, GF, HF> MultiDimHessFn<F, GF, HF>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone,
    HF: Fn(&Array1<f64>) -> Array2<f64> + Clone,
{
    pub fn new(f: F, gf: GF, hf: Option<HF>) -> Self {
        MultiDimHessFn(f, gf, hf)
    }
}

impl<F, GF, HF> ObjFn for MultiDimHessFn<F, GF, HF>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone,
    HF: Fn(&Array1<f64>) -> Array2<f64> + Clone,
{
    fn call(&self, x: &Array1<f64>) -> f64 {
        (self.0)(x)
    }
}

impl<F, GF, HF> ObjGradFn for MultiDimHessFn<F, GF, HF>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone,
    HF: Fn(&Array1<f64>) -> Array2<f64> + Clone,
{
    fn grad(&self, x: &Array1<f64>) -> Array1<f64> {
        (self.1)(x)
    }
}

impl<F, GF, HF> ObjHessFn for MultiDimHessFn<F, GF, HF>
where
    F: Fn(&Array1<f64>) -> f64 + Clone,
    GF: Fn(&Array1<f64>) -> Array1<f64> + Clone,
    HF: Fn(&Array1<f64>) -> Array2<f64> + Clone,
{
    fn hessian(&self, x: &Array1<f64>) -> Array2<f64> {
        match &self.2 {
            Some(hf) => (hf)(x),
            _ => Array2::eye(x.len()),
        }
    }

    fn has_hessian(&self) -> bool {
        self.2.is_some()
    }
}

/// Chi-squared objective for fitting a model to data with known errors.
///
/// f(x) = sum_i ((y_i - m_i(x)) / sigma_i)^2. The Hessian is the
/// Gauss-Newton approximation 2 J^T W J with W = diag(1 / sigma^2).
#[derive(Clone)]
pub struct WeightedLeastSquares<M, J>
where
    M: Fn(&Array1<f64>) -> Array1<f64> + Clone,
    J: Fn(&Array1<f64>) -> Array2<f64> + Clone,
{
    model: M,
    jacobian: J,
    values: Array1<f64>,
    errors: Array1<f64>,
}

impl<M, J> WeightedLeastSquares<M, J>
where
    M: Fn(&Array1<f64>) -> Array1<f64> + Clone,
    J: Fn(&Array1<f64>) -> Array2<f64> + Clone,
{
    pub fn new(model: M, jacobian: J, values: Array1<f64>, errors: Array1<f64>) -> Self {
        WeightedLeastSquares {
            model,
            jacobian,
            values,
            errors,
        }
    }

    fn weights(&self) -> Array1<f64> {
        self.errors.mapv(|s| 1.0 / (s * s))
    }

    fn residuals(&self, x: &Array1<f64>) -> Array1<f64> {
        &self.values - &(self.model)(x)
    }
}

impl<M, J> ObjFn for WeightedLeastSquares<M, J>
where
    M: Fn(&Array1<f64>) -> Array1<f64> + Clone,
    J: Fn(&Array1<f64>) -> Array2<f64> + Clone,
{
    fn call(&self, x: &Array1<f64>) -> f64 {
        let r = self.residuals(x);
        r.iter()
            .zip(self.errors.iter())
            .map(|(ri, si)| (ri / si).powi(2))
            .sum()
    }
}

impl<M, J> ObjGradFn for WeightedLeastSquares<M, J>
where
    M: Fn(&Array1<f64>) -> Array1<f64> + Clone,
    J: Fn(&Array1<f64>) -> Array2<f64> + Clone,
{
    fn grad(&self, x: &Array1<f64>) -> Array1<f64> {
        let wr = self.residuals(x) * self.weights();
        (self.jacobian)(x).t().dot(&wr) * -2.0
    }
}

impl<M, J> ObjHessFn for WeightedLeastSquares<M, J>
where
    M: Fn(&Array1<f64>) -> Array1<f64> + Clone,
    J: Fn(&Array1<f64>) -> Array2<f64> + Clone,
{
    fn hessian(&self, x: &Array1<f64>) -> Array2<f64> {
        let jac = (self.jacobian)(x);
        let wj = &jac * &self.weights().insert_axis(Axis(1));
        jac.t().dot(&wj) * 2.0
    }
}

impl<M, J> LeastSquaresFn for WeightedLeastSquares<M, J>
where
    M: Fn(&Array1<f64>) -> Array1<f64> + Clone,
    J: Fn(&Array1<f64>) -> Array2<f64> + Clone,
{
    fn model_jacobian(&self, x: &Array1<f64>) -> Array2<f64> {
        (self.jacobian)(x)
    }

    fn errors(&self) -> Array1<f64> {
        self.errors.clone()
    }
}

/// Counting front end to an objective.
///
/// Every function, gradient and Hessian evaluation of a run goes through
/// here, so the counters reported in a result are exact.
pub struct Evaluator<'a> {
    f: &'a dyn ObjHessFn,
    n: usize,
    f_count: usize,
    g_count: usize,
    h_count: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(f: &'a dyn ObjHessFn, n: usize) -> Self {
        Evaluator {
            f,
            n,
            f_count: 0,
            g_count: 0,
            h_count: 0,
        }
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn has_hessian(&self) -> bool {
        self.f.has_hessian()
    }

    pub fn value(&mut self, x: &Array1<f64>) -> f64 {
        self.f_count += 1;
        let value = self.f.call(x);
        trace!("f({}) = {}", x, value);
        value
    }

    pub fn gradient(&mut self, x: &Array1<f64>) -> Result<Array1<f64>, MinimizerError> {
        self.g_count += 1;
        let grad = self.f.grad(x);
        if grad.len() != self.n {
            return Err(MinimizerError::GradientEvaluationError);
        }
        Ok(grad)
    }

    pub fn hessian(&mut self, x: &Array1<f64>) -> Result<Array2<f64>, MinimizerError> {
        self.h_count += 1;
        let hess = self.f.hessian(x);
        if hess.dim() != (self.n, self.n) {
            return Err(MinimizerError::HessianEvaluationError);
        }
        Ok(hess)
    }

    /// Model Jacobian of a least-squares problem, counted as a Hessian evaluation
    /// since it is the curvature source of Levenberg-Marquardt.
    pub fn jacobian(
        &mut self,
        data: &dyn LeastSquaresFn,
        x: &Array1<f64>,
    ) -> Result<Array2<f64>, MinimizerError> {
        self.h_count += 1;
        let jac = data.model_jacobian(x);
        if jac.ncols() != self.n || jac.nrows() != data.errors().len() {
            return Err(MinimizerError::HessianEvaluationError);
        }
        Ok(jac)
    }

    /// (f_count, g_count, h_count)
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.f_count, self.g_count, self.h_count)
    }
}
