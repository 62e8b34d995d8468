use crate::minimize::{
    MinimizerError,
    hessian_mods::{HessianModifier, ModifiedCholesky, check_symmetric_input},
    linalg::Matrix,
    options::HessianModKind,
};
use log::trace;
use ndarray::prelude::*;

/// Cholesky with an added multiple of the identity.
///
/// Tries H + tau I for tau = 0 (when the diagonal is positive), then
/// tau_0 = -min(h_ii) + beta, doubling until a plain Cholesky succeeds.
#[derive(Debug, Clone)]
pub struct AddedIdentity {
    pub max_iter: usize,
}

impl Default for AddedIdentity {
    fn default() -> Self {
        AddedIdentity { max_iter: 100 }
    }
}

impl HessianModifier for AddedIdentity {
    fn factorise(&self, h: &Array2<f64>) -> Result<ModifiedCholesky, MinimizerError> {
        let n = check_symmetric_input(h)?;
        let frobenius = Matrix::frobenius_norm(h);
        let beta = if frobenius > 0.0 { 0.5 * frobenius } else { 1e-3 };

        let min_diag = (0..n).fold(f64::INFINITY, |m, i| m.min(h[[i, i]]));
        let mut tau = if min_diag > 0.0 { 0.0 } else { -min_diag + beta };

        for _ in 0..self.max_iter {
            let shifted = h + &(Array2::<f64>::eye(n) * tau);
            if let Some(l) = Matrix::cholesky(&shifted) {
                trace!("Cholesky with added identity, tau: {}", tau);
                return Ok(ModifiedCholesky {
                    l,
                    perm: (0..n).collect(),
                    e: Array1::from_elem(n, tau),
                });
            }
            tau = (2.0 * tau).max(beta);
        }

        Err(MinimizerError::SingularSystem(format!(
            "no positive definite shift found after {} attempts",
            self.max_iter
        )))
    }

    fn kind(&self) -> HessianModKind {
        HessianModKind::AddedIdentity
    }
}
