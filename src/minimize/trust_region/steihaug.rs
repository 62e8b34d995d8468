use crate::minimize::{
    MinimizerError,
    linalg::Vector,
    trust_region::{ModelHessian, TrustRegionStep, boundary_tau},
};
use log::trace;
use ndarray::prelude::*;

/// CG-Steihaug, truncated conjugate gradients inside the trust region.
///
/// Stops at the boundary on negative curvature or when an iterate leaves the
/// region, and inside it once the residual is below min(0.5, sqrt(|g|)) |g|.
#[derive(Debug, Clone)]
pub struct Steihaug {
    pub max_iter: Option<usize>,
}

impl Default for Steihaug {
    fn default() -> Self {
        Steihaug { max_iter: None }
    }
}

impl TrustRegionStep for Steihaug {
    fn step(&self, g: &Array1<f64>, model: &ModelHessian, delta: f64) -> Result<Array1<f64>, MinimizerError> {
        let n = g.len();
        let g_norm = Vector::norm(g);
        let tol = g_norm.sqrt().min(0.5) * g_norm;
        let max_iter = self.max_iter.unwrap_or(20 * n.max(1));

        let mut z = Array1::zeros(n);
        let mut r = g.clone();
        let mut d = -g;
        let mut rr = r.dot(&r);

        for j in 0..max_iter {
            let bd = model.b.dot(&d);
            let curvature = d.dot(&bd);
            if curvature <= 0.0 {
                trace!("Steihaug negative curvature at inner iteration {}", j);
                let tau = boundary_tau(&z, &d, delta);
                return Ok(&z + &(&d * tau));
            }
            let alpha = rr / curvature;
            let z_next = &z + &(&d * alpha);
            if Vector::norm(&z_next) >= delta {
                trace!("Steihaug boundary at inner iteration {}", j);
                let tau = boundary_tau(&z, &d, delta);
                return Ok(&z + &(&d * tau));
            }
            z = z_next;
            r = r + &bd * alpha;
            let rr_next = r.dot(&r);
            if rr_next.sqrt() < tol {
                return Ok(z);
            }
            d = -&r + &d * (rr_next / rr);
            rr = rr_next;
        }
        Ok(z)
    }

    fn name(&self) -> &'static str {
        "CG-Steihaug"
    }
}
