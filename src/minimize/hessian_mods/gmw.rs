use crate::minimize::{
    MinimizerError,
    hessian_mods::{HessianModifier, ModifiedCholesky, check_symmetric_input, swap_symmetric},
    options::HessianModKind,
};
use log::trace;
use ndarray::prelude::*;

/// Gill, Murray and Wright (1981) modified Cholesky factorisation.
///
/// Factorises P (H + E) P^T = L D L^T with symmetric diagonal pivoting on the
/// largest remaining diagonal. Each pivot is raised to
/// d_j = max(|c_jj|, (theta_j / beta)^2, delta) so that the elements of
/// L D^(1/2) stay bounded by beta.
#[derive(Debug, Clone)]
pub struct Gmw {
    pub mach_acc: f64,
}

impl Gmw {
    pub fn new(mach_acc: f64) -> Self {
        Gmw { mach_acc }
    }
}

impl Default for Gmw {
    fn default() -> Self {
        Gmw::new(1e-16)
    }
}

impl HessianModifier for Gmw {
    fn factorise(&self, h: &Array2<f64>) -> Result<ModifiedCholesky, MinimizerError> {
        let n = check_symmetric_input(h)?;
        let eps = self.mach_acc;

        let gamma = (0..n).fold(0.0_f64, |m, i| m.max(h[[i, i]].abs()));
        let mut xi = 0.0_f64;
        for i in 0..n {
            for j in 0..i {
                xi = xi.max(h[[i, j]].abs());
            }
        }
        let delta = eps * (gamma + xi).max(1.0);
        let beta2 = if n > 1 {
            gamma.max(xi / ((n * n - 1) as f64).sqrt()).max(eps)
        } else {
            gamma.max(eps)
        };
        trace!("GMW gamma: {} xi: {} delta: {} beta^2: {}", gamma, xi, delta, beta2);

        // The strict lower triangle of c accumulates the c_ij of processed columns
        let mut c = h.clone();
        let mut perm: Vec<usize> = (0..n).collect();
        let mut d = Array1::<f64>::zeros(n);
        let mut e = Array1::<f64>::zeros(n);

        for j in 0..n {
            // Pivot on the largest remaining |c_ii|, ties going to the last index
            let mut q = j;
            let mut max_diag = c[[j, j]].abs();
            for i in j + 1..n {
                if c[[i, i]].abs() >= max_diag {
                    max_diag = c[[i, i]].abs();
                    q = i;
                }
            }
            swap_symmetric(&mut c, j, q);
            perm.swap(j, q);

            // Column j of C
            for i in j + 1..n {
                let mut cij = c[[i, j]];
                for s in 0..j {
                    cij -= c[[j, s]] / d[s] * c[[i, s]];
                }
                c[[i, j]] = cij;
            }

            let theta = (j + 1..n).fold(0.0_f64, |m, i| m.max(c[[i, j]].abs()));
            d[j] = c[[j, j]].abs().max(theta * theta / beta2).max(delta);
            e[j] = d[j] - c[[j, j]];

            for i in j + 1..n {
                c[[i, i]] -= c[[i, j]] * c[[i, j]] / d[j];
            }
        }

        // L D^(1/2)
        let mut l = Array2::<f64>::zeros((n, n));
        for j in 0..n {
            let sqrt_d = d[j].sqrt();
            l[[j, j]] = sqrt_d;
            for i in j + 1..n {
                l[[i, j]] = c[[i, j]] / d[j] * sqrt_d;
            }
        }

        let mut e_orig = Array1::zeros(n);
        for j in 0..n {
            e_orig[perm[j]] = e[j];
        }

        Ok(ModifiedCholesky {
            l,
            perm,
            e: e_orig,
        })
    }

    fn kind(&self) -> HessianModKind {
        HessianModKind::Gmw
    }
}

#[cfg(test)]
mod minimize_gmw_tests {
    use super::*;
    use crate::minimize::hessian_mods::minimize_hessian_mods_tests::{
        assert_valid_factor, random_symmetric, test_matrices,
    };
    use crate::minimize::linalg::Matrix;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_gmw_positive_definite_unchanged() {
        let h = array![[4.0, 2.0, 0.4], [2.0, 5.0, 1.0], [0.4, 1.0, 3.0]];
        let factor = Gmw::default().factorise(&h).unwrap();
        assert_eq!(factor.max_perturbation(), 0.0);
        assert_valid_factor(&h, &factor, 0.0);
    }

    #[test]
    fn test_gmw_pivots_largest_diagonal() {
        let h = array![[1.0, 0.0, 0.0], [0.0, 9.0, 0.0], [0.0, 0.0, 4.0]];
        let factor = Gmw::default().factorise(&h).unwrap();
        assert_eq!(factor.perm, vec![1, 2, 0]);
        assert_eq!(factor.l[[0, 0]], 3.0);
        assert_eq!(factor.l[[1, 1]], 2.0);
        assert_eq!(factor.l[[2, 2]], 1.0);
    }

    #[test]
    fn test_gmw_indefinite_2x2() {
        // gamma = 0, xi = 1, beta^2 = 1 / sqrt(3)
        let h = array![[0.0, 1.0], [1.0, 0.0]];
        let factor = Gmw::default().factorise(&h).unwrap();
        let beta2 = 1.0 / 3.0_f64.sqrt();
        assert!((factor.e[1] - 1.0 / beta2).abs() < 1e-12);
        // c_11 = -beta^2 after the first column, raised to +beta^2
        assert!((factor.e[0] - 2.0 * beta2).abs() < 1e-12);
        assert_valid_factor(&h, &factor, 10.0);
    }

    #[test]
    fn test_gmw_test_matrices() {
        for h in test_matrices() {
            let factor = Gmw::default().factorise(&h).unwrap();
            assert_valid_factor(&h, &factor, 10.0);
        }
    }

    #[test]
    fn test_gmw_random_matrices() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for n in 1..8 {
            for _ in 0..10 {
                let h = random_symmetric(n, &mut rng);
                let factor = Gmw::default().factorise(&h).unwrap();
                assert_valid_factor(&h, &factor, 10.0 * n as f64);
                assert!(Matrix::is_finite(&factor.l));
            }
        }
    }

    #[test]
    fn test_gmw_rejects_non_square() {
        let h = Array2::<f64>::zeros((2, 3));
        assert_eq!(
            Gmw::default().factorise(&h).unwrap_err(),
            MinimizerError::InvalidDimension
        );
    }
}
