use crate::minimize::{
    MinimizerError,
    hessian_mods::{HessianModifier, ModifiedCholesky, check_symmetric_input, swap_symmetric},
    options::HessianModKind,
};
use log::trace;
use ndarray::prelude::*;

/// Revised modified Cholesky factorisation of Schnabel and Eskow (1999).
///
/// Phase 1 is a standard pivoted Cholesky that runs while the matrix looks
/// safely positive definite. Phase 2 takes over on the remaining submatrix and
/// picks the perturbation of each pivot from Gershgorin lower bounds, with the
/// final 2x2 block handled through its eigenvalues.
#[derive(Debug, Clone)]
pub struct Se99 {
    pub mach_acc: f64,
}

impl Se99 {
    pub fn new(mach_acc: f64) -> Self {
        Se99 { mach_acc }
    }
}

impl Default for Se99 {
    fn default() -> Self {
        Se99::new(1e-16)
    }
}

/// Working storage of the factorisation
struct Work {
    a: Array2<f64>,
    l: Array2<f64>,
    perm: Vec<usize>,
    e: Array1<f64>,
}

impl Work {
    /// Move index q into position j
    fn pivot(&mut self, j: usize, q: usize) {
        if j == q {
            return;
        }
        swap_symmetric(&mut self.a, j, q);
        for s in 0..j {
            self.l.swap((j, s), (q, s));
        }
        self.perm.swap(j, q);
        self.e.swap(j, q);
    }

    /// One column of Cholesky with the trailing submatrix updated.
    fn eliminate(&mut self, j: usize) {
        let n = self.a.nrows();
        let ljj = self.a[[j, j]].sqrt();
        self.l[[j, j]] = ljj;
        for i in j + 1..n {
            self.l[[i, j]] = self.a[[i, j]] / ljj;
        }
        for i in j + 1..n {
            for k in j + 1..=i {
                let v = self.a[[i, k]] - self.l[[i, j]] * self.l[[k, j]];
                self.a[[i, k]] = v;
                self.a[[k, i]] = v;
            }
        }
    }

    fn perturb(&mut self, j: usize, delta: f64) {
        self.a[[j, j]] += delta;
        self.e[j] += delta;
    }
}

impl HessianModifier for Se99 {
    fn factorise(&self, h: &Array2<f64>) -> Result<ModifiedCholesky, MinimizerError> {
        let n = check_symmetric_input(h)?;
        let tau = self.mach_acc.powf(1.0 / 3.0);
        let tau_bar = self.mach_acc.powf(2.0 / 3.0);
        let mu = 0.1;

        let gamma = (0..n).fold(0.0_f64, |m, i| m.max(h[[i, i]].abs()));
        // A zero matrix still needs a positive floor for the perturbation
        let gamma = if gamma > 0.0 { gamma } else { 1.0 };

        let mut w = Work {
            a: h.clone(),
            l: Array2::zeros((n, n)),
            perm: (0..n).collect(),
            e: Array1::zeros(n),
        };

        // Phase 1
        let mut j = 0;
        while j < n {
            let q = (j..n).fold(j, |q, i| if w.a[[i, i]] > w.a[[q, q]] { i } else { q });
            w.pivot(j, q);

            let ajj = w.a[[j, j]];
            if ajj <= 0.0 || ajj < tau_bar * gamma {
                break;
            }
            let look_ahead = (j + 1..n)
                .map(|i| w.a[[i, i]] - w.a[[i, j]] * w.a[[i, j]] / ajj)
                .fold(f64::INFINITY, f64::min);
            if look_ahead < -mu * gamma {
                break;
            }
            w.eliminate(j);
            j += 1;
        }
        trace!("SE99 phase 1 finished after {} columns", j);

        // Phase 2
        if j < n {
            let mut delta_prev = 0.0_f64;

            if j == n - 1 {
                let a = w.a[[j, j]];
                let delta = -a + (tau * -a / (1.0 - tau)).max(tau_bar * gamma);
                w.perturb(j, delta);
                w.l[[j, j]] = w.a[[j, j]].sqrt();
            } else {
                // Gershgorin lower bounds of the remaining submatrix
                let mut g = Array1::<f64>::zeros(n);
                for i in j..n {
                    let off: f64 = (j..n).filter(|&k| k != i).map(|k| w.a[[i, k]].abs()).sum();
                    g[i] = w.a[[i, i]] - off;
                }

                while j + 2 < n {
                    let q = (j..n).fold(j, |q, i| if g[i] > g[q] { i } else { q });
                    w.pivot(j, q);
                    g.swap(j, q);

                    let norm_j: f64 = (j + 1..n).map(|i| w.a[[i, j]].abs()).sum();
                    let delta = 0.0_f64
                        .max(-w.a[[j, j]] + norm_j.max(tau_bar * gamma))
                        .max(delta_prev);
                    if delta > 0.0 {
                        w.perturb(j, delta);
                        delta_prev = delta;
                    }

                    let ajj = w.a[[j, j]];
                    if ajj != norm_j {
                        let temp = 1.0 - norm_j / ajj;
                        for i in j + 1..n {
                            g[i] += w.a[[i, j]].abs() * temp;
                        }
                    }
                    w.eliminate(j);
                    j += 1;
                }

                // Final 2x2 block from its eigenvalues
                let (p, r, s) = (w.a[[j, j]], w.a[[j + 1, j]], w.a[[j + 1, j + 1]]);
                let mean = 0.5 * (p + s);
                let radius = (0.25 * (p - s) * (p - s) + r * r).sqrt();
                let (lo, hi) = (mean - radius, mean + radius);
                let delta = 0.0_f64
                    .max(-lo + (tau * (hi - lo) / (1.0 - tau)).max(tau_bar * gamma))
                    .max(delta_prev);
                if delta > 0.0 {
                    w.perturb(j, delta);
                    w.perturb(j + 1, delta);
                }
                trace!("SE99 final block eigenvalues {} {}, delta {}", lo, hi, delta);

                w.eliminate(j);
                let v = w.a[[j + 1, j + 1]];
                w.l[[j + 1, j + 1]] = v.sqrt();
            }
        }

        if (0..n).any(|i| !(w.l[[i, i]] > 0.0)) {
            return Err(MinimizerError::SingularSystem(
                "SE99 produced a non-positive pivot".to_string(),
            ));
        }

        let mut e_orig = Array1::zeros(n);
        for i in 0..n {
            e_orig[w.perm[i]] = w.e[i];
        }

        Ok(ModifiedCholesky {
            l: w.l,
            perm: w.perm,
            e: e_orig,
        })
    }

    fn kind(&self) -> HessianModKind {
        HessianModKind::Se99
    }
}
