use crate::minimize::{
    MinimizerError,
    linalg::{Matrix, Vector},
    options::HessianModKind,
};
use log::trace;
use ndarray::prelude::*;

mod cholesky;
mod gmw;
mod se99;

pub use self::cholesky::AddedIdentity;
pub use self::gmw::Gmw;
pub use self::se99::Se99;

/// Pivoted factorisation L L^T = P (H + E) P^T of a modified Hessian.
///
/// `perm[i]` is the row of H that sits in row i of the permuted matrix and
/// `e` holds the diagonal perturbation in the original ordering.
#[derive(Debug, Clone)]
pub struct ModifiedCholesky {
    pub l: Array2<f64>,
    pub perm: Vec<usize>,
    pub e: Array1<f64>,
}

impl ModifiedCholesky {
    /// Factor of a matrix that needed no modification, A = L L^T.
    pub fn unmodified(l: Array2<f64>) -> Self {
        let n = l.nrows();
        ModifiedCholesky {
            l,
            perm: (0..n).collect(),
            e: Array1::zeros(n),
        }
    }

    /// Solve (H + E) x = b by forward and back substitution.
    pub fn solve(&self, b: &Array1<f64>) -> Result<Array1<f64>, MinimizerError> {
        let n = self.perm.len();
        if b.len() != n {
            return Err(MinimizerError::InvalidDimension);
        }
        let pb = Array1::from_shape_fn(n, |i| b[self.perm[i]]);
        let y = Matrix::forward_substitution(&self.l, &pb)?;
        let z = Matrix::back_substitution(&self.l, &y)?;
        let mut x = Array1::zeros(n);
        for i in 0..n {
            x[self.perm[i]] = z[i];
        }
        Ok(x)
    }

    /// The modified Hessian H + E = P^T L L^T P.
    pub fn reconstruct(&self) -> Array2<f64> {
        let n = self.perm.len();
        let llt = self.l.dot(&self.l.t());
        let mut a = Array2::zeros((n, n));
        for i in 0..n {
            for j in 0..n {
                a[[self.perm[i], self.perm[j]]] = llt[[i, j]];
            }
        }
        a
    }

    /// Largest diagonal perturbation
    pub fn max_perturbation(&self) -> f64 {
        self.e.iter().fold(0.0, |m: f64, x| m.max(x.abs()))
    }
}

/// Strategy turning a possibly indefinite Hessian into a positive definite one.
pub trait HessianModifier {
    fn factorise(&self, h: &Array2<f64>) -> Result<ModifiedCholesky, MinimizerError>;

    fn kind(&self) -> HessianModKind;
}

/// Build the modifier for a kind, `None` when the Hessian is used unmodified
pub fn hessian_mod_from_kind(kind: HessianModKind, mach_acc: f64) -> Option<Box<dyn HessianModifier>> {
    match kind {
        HessianModKind::Gmw => Some(Box::new(Gmw::new(mach_acc))),
        HessianModKind::Se99 => Some(Box::new(Se99::new(mach_acc))),
        HessianModKind::AddedIdentity => Some(Box::new(AddedIdentity::default())),
        HessianModKind::NoMod => None,
    }
}

/// Input checks shared by the modifiers.
pub(crate) fn check_symmetric_input(h: &Array2<f64>) -> Result<usize, MinimizerError> {
    let n = h.nrows();
    if n == 0 || h.ncols() != n {
        return Err(MinimizerError::InvalidDimension);
    }
    if !Matrix::is_finite(h) {
        return Err(MinimizerError::SingularSystem(
            "the Hessian has non-finite entries".to_string(),
        ));
    }
    Ok(n)
}

/// Symmetric swap of rows and columns i and j
pub(crate) fn swap_symmetric(a: &mut Array2<f64>, i: usize, j: usize) {
    if i == j {
        return;
    }
    let n = a.nrows();
    for k in 0..n {
        a.swap((i, k), (j, k));
    }
    for k in 0..n {
        a.swap((k, i), (k, j));
    }
}

/// Newton direction p solving H p = -g.
///
/// With a modifier the solve runs through the modified Cholesky factor, which
/// is always positive definite. Without one, H is used as is through Gaussian
/// elimination.
pub fn newton_direction(
    modifier: Option<&dyn HessianModifier>,
    h: &Array2<f64>,
    g: &Array1<f64>,
) -> Result<Array1<f64>, MinimizerError> {
    let neg_g = -g;
    match modifier {
        Some(m) => {
            let factor = m.factorise(h)?;
            trace!(
                "{} factorisation, max perturbation {}",
                m.kind(),
                factor.max_perturbation()
            );
            let p = factor.solve(&neg_g)?;
            if !Vector::is_finite(&p) {
                return Err(MinimizerError::SingularSystem(
                    "non-finite Newton direction".to_string(),
                ));
            }
            Ok(p)
        }
        None => Matrix::solve_linear_system(h, &neg_g),
    }
}
