use crate::minimize::{
    MinimizerError,
    linalg::{Matrix, Vector},
    trust_region::{ModelHessian, TrustRegionStep},
};
use ndarray::prelude::*;

/// Cauchy point, the model minimiser along -g inside the trust region.
///
/// p = -tau delta g / ||g|| with tau = 1 when g^T B g <= 0 and
/// tau = min(||g||^3 / (delta g^T B g), 1) otherwise.
#[derive(Debug, Clone, Default)]
pub struct CauchyPoint {}

impl TrustRegionStep for CauchyPoint {
    fn step(&self, g: &Array1<f64>, model: &ModelHessian, delta: f64) -> Result<Array1<f64>, MinimizerError> {
        let g_norm = Vector::norm(g);
        let gbg = Matrix::quadratic_form(&model.b, g);
        let tau = if gbg <= 0.0 {
            1.0
        } else {
            (g_norm.powi(3) / (delta * gbg)).min(1.0)
        };
        Ok(g * (-tau * delta / g_norm))
    }

    fn name(&self) -> &'static str {
        "Cauchy point"
    }
}

#[cfg(test)]
mod minimize_cauchy_tests {
    use super::*;

    #[test]
    fn test_cauchy_interior() {
        let b = ModelHessian::new(array![[2.0, 0.0], [0.0, 2.0]]);
        let g = array![1.0, 0.0];
        // The minimiser along -g is at p = -g / 2
        let p = CauchyPoint {}.step(&g, &b, 10.0).unwrap();
        assert!((p[0] + 0.5).abs() < 1e-14);
        assert_eq!(p[1], 0.0);
    }

    #[test]
    fn test_cauchy_boundary() {
        let b = ModelHessian::new(array![[2.0, 0.0], [0.0, 2.0]]);
        let g = array![3.0, 4.0];
        let p = CauchyPoint {}.step(&g, &b, 0.5).unwrap();
        assert!((Vector::norm(&p) - 0.5).abs() < 1e-14);

        let b = ModelHessian::new(array![[-2.0, 0.0], [0.0, 1.0]]);
        let p = CauchyPoint {}.step(&array![1.0, 0.0], &b, 0.5).unwrap();
        assert_eq!(p, array![-0.5, 0.0]);
    }
}
