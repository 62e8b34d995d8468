use crate::minimize::{
    MinimizerError,
    linalg::{Matrix, Vector},
    trust_region::{ModelHessian, TrustRegionStep, boundary_tau},
};
use log::trace;
use ndarray::prelude::*;

/// Dogleg path from the Cauchy point towards the full step p_B = -B^-1 g.
#[derive(Debug, Clone, Default)]
pub struct Dogleg {}

impl TrustRegionStep for Dogleg {
    fn step(&self, g: &Array1<f64>, model: &ModelHessian, delta: f64) -> Result<Array1<f64>, MinimizerError> {
        let g_norm = Vector::norm(g);
        let gbg = Matrix::quadratic_form(&model.b, g);
        if !(gbg > 0.0) {
            // No curvature along -g, go to the boundary
            return Ok(g * (-delta / g_norm));
        }

        let pu: Array1<f64> = g * (-g.dot(g) / gbg);
        let pu_norm = Vector::norm(&pu);

        let pb = model.solve(&-g)?;
        if !(g.dot(&pb) < 0.0) {
            trace!("dogleg full step is not downhill, using the Cauchy point");
            return Ok(if pu_norm >= delta { &pu * (delta / pu_norm) } else { pu });
        }
        if Vector::norm(&pb) <= delta {
            trace!("dogleg full step");
            return Ok(pb);
        }
        if pu_norm >= delta {
            trace!("dogleg steepest descent step to the boundary");
            return Ok(&pu * (delta / pu_norm));
        }

        let d = &pb - &pu;
        let s = boundary_tau(&pu, &d, delta);
        trace!("dogleg tau: {}", 1.0 + s);
        Ok(&pu + &(&d * s))
    }

    fn name(&self) -> &'static str {
        "Dogleg"
    }

    fn needs_positive_definite(&self) -> bool {
        true
    }
}
