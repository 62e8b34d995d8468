use crate::minimize::MinimizerError;
use ndarray::prelude::*;

/// Vector helpers shared by the minimisers
#[derive(Debug, Clone)]
pub(crate) struct Vector {}

impl Vector {
    pub(crate) fn norm(v: &Array1<f64>) -> f64 {
        v.dot(v).sqrt()
    }

    pub(crate) fn is_finite(v: &Array1<f64>) -> bool {
        v.iter().all(|x| x.is_finite())
    }

    /// Outer product a b^T
    pub(crate) fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
        Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j])
    }
}

/// Dense matrix helpers: triangular solves, plain Cholesky and Gaussian elimination
#[derive(Debug, Clone)]
pub struct Matrix {}

impl Matrix {
    pub fn frobenius_norm(a: &Array2<f64>) -> f64 {
        a.iter().map(|x| x * x).sum::<f64>().sqrt()
    }

    pub fn is_finite(a: &Array2<f64>) -> bool {
        a.iter().all(|x| x.is_finite())
    }

    pub fn is_lower_triangular(a: &Array2<f64>) -> bool {
        let n = a.nrows();
        (0..n).all(|i| (i + 1..n).all(|j| a[[i, j]] == 0.0))
    }

    /// Quadratic form p^T A p
    pub fn quadratic_form(a: &Array2<f64>, p: &Array1<f64>) -> f64 {
        p.dot(&a.dot(p))
    }

    /// Solve L y = b for lower triangular L.
    pub fn forward_substitution(
        l: &Array2<f64>,
        b: &Array1<f64>,
    ) -> Result<Array1<f64>, MinimizerError> {
        let n = b.len();
        let mut y = Array1::zeros(n);
        for i in 0..n {
            let mut sum = b[i];
            for j in 0..i {
                sum -= l[[i, j]] * y[j];
            }
            if l[[i, i]] == 0.0 {
                return Err(MinimizerError::SingularSystem(format!(
                    "zero pivot in row {} of the lower triangular factor",
                    i
                )));
            }
            y[i] = sum / l[[i, i]];
        }
        Ok(y)
    }

    /// Solve L^T x = y for lower triangular L.
    pub fn back_substitution(
        l: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<Array1<f64>, MinimizerError> {
        let n = y.len();
        let mut x = Array1::zeros(n);
        for i in (0..n).rev() {
            let mut sum = y[i];
            for j in i + 1..n {
                sum -= l[[j, i]] * x[j];
            }
            if l[[i, i]] == 0.0 {
                return Err(MinimizerError::SingularSystem(format!(
                    "zero pivot in column {} of the lower triangular factor",
                    i
                )));
            }
            x[i] = sum / l[[i, i]];
        }
        Ok(x)
    }

    /// Plain Cholesky factorisation A = L L^T.
    ///
    /// Returns `None` when A is not numerically positive definite.
    pub fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
        let n = a.nrows();
        let mut l = Array2::<f64>::zeros((n, n));
        for j in 0..n {
            let mut d = a[[j, j]];
            for k in 0..j {
                d -= l[[j, k]] * l[[j, k]];
            }
            if !(d > 0.0) || !d.is_finite() {
                return None;
            }
            let ljj = d.sqrt();
            l[[j, j]] = ljj;
            for i in j + 1..n {
                let mut s = a[[i, j]];
                for k in 0..j {
                    s -= l[[i, k]] * l[[j, k]];
                }
                l[[i, j]] = s / ljj;
            }
        }
        Some(l)
    }

    /// Gaussian elimination with partial pivoting
    pub fn solve_linear_system(
        a: &Array2<f64>,
        b: &Array1<f64>,
    ) -> Result<Array1<f64>, MinimizerError> {
        let n = a.nrows();
        if a.ncols() != n || b.len() != n {
            return Err(MinimizerError::InvalidDimension);
        }
        if !Matrix::is_finite(a) || !Vector::is_finite(b) {
            return Err(MinimizerError::SingularSystem(
                "non-finite entries in the linear system".to_string(),
            ));
        }

        let mut ax = a.clone();
        let mut bx = b.clone();
        let scale = ax.iter().fold(0.0_f64, |m, x| m.max(x.abs())).max(1.0);

        // Forward elimination with partial pivoting
        for k in 0..n {
            let mut max_row = k;
            for i in k + 1..n {
                if ax[[i, k]].abs() > ax[[max_row, k]].abs() {
                    max_row = i;
                }
            }

            if max_row != k {
                for j in 0..n {
                    ax.swap((k, j), (max_row, j));
                }
                bx.swap(k, max_row);
            }

            if ax[[k, k]].abs() <= f64::EPSILON * scale {
                return Err(MinimizerError::SingularSystem(format!(
                    "pivot {} is numerically zero",
                    k
                )));
            }

            for i in k + 1..n {
                let factor = ax[[i, k]] / ax[[k, k]];
                for j in k..n {
                    ax[[i, j]] -= factor * ax[[k, j]];
                }
                bx[i] -= factor * bx[k];
            }
        }

        // Back substitution
        let mut x = Array1::zeros(n);
        for i in (0..n).rev() {
            x[i] = bx[i];
            for j in i + 1..n {
                x[i] -= ax[[i, j]] * x[j];
            }
            x[i] /= ax[[i, i]];
        }

        Ok(x)
    }
}
