use crate::minimize::{
    MinimizerError, MinimizerWarning,
    line_search::{LineFn, LineSearch, LineSearchResult},
    objective::Evaluator,
    options::{LineSearchKind, LineSearchParams},
};
use log::trace;
use ndarray::prelude::*;

const XTRAPL: f64 = 1.1;
const XTRAPU: f64 = 4.0;
const P66: f64 = 0.66;

/// More and Thuente (1994) line search with guaranteed sufficient decrease.
///
/// Works on phi until a step with psi(a) <= 0 and phi'(a) >= 0 is found, where
/// psi(a) = phi(a) - phi(0) - mu a phi'(0), then on phi itself. Trial steps come
/// from the safeguarded cubic, quadratic and secant steps of [`dcstep`].
#[derive(Debug, Clone)]
pub struct MoreThuente {
    pub mu: f64,
    pub eta: f64,
    pub xtol: f64,
    pub a_min: f64,
    pub max_iter: usize,
}

impl MoreThuente {
    pub fn new(params: &LineSearchParams) -> Self {
        MoreThuente {
            mu: params.mu,
            eta: params.eta,
            xtol: 1e-14,
            a_min: 0.0,
            max_iter: params.max_iter,
        }
    }
}

impl Default for MoreThuente {
    fn default() -> Self {
        MoreThuente::new(&LineSearchParams::default())
    }
}

/// An end point of the interval of uncertainty
#[derive(Debug, Clone, Copy)]
struct End {
    a: f64,
    f: f64,
    d: f64,
}

/// Safeguarded step from the end points and the trial (a, f, d).
///
/// Returns the next trial step and updates the interval of uncertainty
/// `[x, y]` and the bracketing flag.
fn dcstep(
    x: &mut End,
    y: &mut End,
    trial: End,
    brackt: &mut bool,
    stpmin: f64,
    stpmax: f64,
) -> f64 {
    let (stx, fx, dx) = (x.a, x.f, x.d);
    let (sty, fy, dy) = (y.a, y.f, y.d);
    let (stp, fp, dp) = (trial.a, trial.f, trial.d);
    let sgnd = dp * dx.signum();

    let stpf = if fp > fx {
        // Higher function value, the minimum is bracketed
        let theta = 3.0 * (fx - fp) / (stp - stx) + dx + dp;
        let s = theta.abs().max(dx.abs()).max(dp.abs());
        let mut gamma = s * ((theta / s).powi(2) - (dx / s) * (dp / s)).sqrt();
        if stp < stx {
            gamma = -gamma;
        }
        let p = (gamma - dx) + theta;
        let q = ((gamma - dx) + gamma) + dp;
        let r = p / q;
        let stpc = stx + r * (stp - stx);
        let stpq = stx + ((dx / ((fx - fp) / (stp - stx) + dx)) / 2.0) * (stp - stx);
        *brackt = true;
        if (stpc - stx).abs() < (stpq - stx).abs() {
            stpc
        } else {
            stpc + (stpq - stpc) / 2.0
        }
    } else if sgnd < 0.0 {
        // Derivatives of opposite sign, the minimum is bracketed
        let theta = 3.0 * (fx - fp) / (stp - stx) + dx + dp;
        let s = theta.abs().max(dx.abs()).max(dp.abs());
        let mut gamma = s * ((theta / s).powi(2) - (dx / s) * (dp / s)).sqrt();
        if stp > stx {
            gamma = -gamma;
        }
        let p = (gamma - dp) + theta;
        let q = ((gamma - dp) + gamma) + dx;
        let r = p / q;
        let stpc = stp + r * (stx - stp);
        let stpq = stp + (dp / (dp - dx)) * (stx - stp);
        *brackt = true;
        if (stpc - stp).abs() > (stpq - stp).abs() {
            stpc
        } else {
            stpq
        }
    } else if dp.abs() < dx.abs() {
        // Same sign, decreasing derivative magnitude
        let theta = 3.0 * (fx - fp) / (stp - stx) + dx + dp;
        let s = theta.abs().max(dx.abs()).max(dp.abs());
        let mut gamma = s * 0.0_f64.max((theta / s).powi(2) - (dx / s) * (dp / s)).sqrt();
        if stp > stx {
            gamma = -gamma;
        }
        let p = (gamma - dp) + theta;
        let q = (gamma + (dx - dp)) + gamma;
        let r = p / q;
        let stpc = if r < 0.0 && gamma != 0.0 {
            stp + r * (stx - stp)
        } else if stp > stx {
            stpmax
        } else {
            stpmin
        };
        let stpq = stp + (dp / (dp - dx)) * (stx - stp);

        if *brackt {
            let stpf = if (stpc - stp).abs() < (stpq - stp).abs() {
                stpc
            } else {
                stpq
            };
            if stp > stx {
                stpf.min(stp + P66 * (sty - stp))
            } else {
                stpf.max(stp + P66 * (sty - stp))
            }
        } else {
            let stpf = if (stpc - stp).abs() > (stpq - stp).abs() {
                stpc
            } else {
                stpq
            };
            stpf.min(stpmax).max(stpmin)
        }
    } else {
        // Same sign, derivative magnitude does not decrease
        if *brackt {
            let theta = 3.0 * (fp - fy) / (sty - stp) + dy + dp;
            let s = theta.abs().max(dy.abs()).max(dp.abs());
            let mut gamma = s * ((theta / s).powi(2) - (dy / s) * (dp / s)).sqrt();
            if stp > sty {
                gamma = -gamma;
            }
            let p = (gamma - dp) + theta;
            let q = ((gamma - dp) + gamma) + dy;
            let r = p / q;
            stp + r * (sty - stp)
        } else if stp > stx {
            stpmax
        } else {
            stpmin
        }
    };

    // Interval update
    if fp > fx {
        *y = trial;
    } else {
        if sgnd < 0.0 {
            *y = *x;
        }
        *x = trial;
    }

    stpf
}

impl LineSearch for MoreThuente {
    fn search(
        &self,
        eval: &mut Evaluator,
        xk: &Array1<f64>,
        fk: f64,
        dfk: &Array1<f64>,
        pk: &Array1<f64>,
        a0: f64,
    ) -> Result<LineSearchResult, MinimizerError> {
        let ginit = dfk.dot(pk);
        let finit = fk;
        let gtest = self.mu * ginit;
        let stpmin = self.a_min;
        let stpmax = 4.0 * a0.max(1.0);
        let mut phi = LineFn::new(eval, xk, pk);

        let mut brackt = false;
        let mut stage1 = true;
        let mut width = stpmax - stpmin;
        let mut width1 = 2.0 * width;

        let mut x = End {
            a: 0.0,
            f: finit,
            d: ginit,
        };
        let mut y = x;
        let mut stmin = 0.0;
        let mut stmax = a0 + XTRAPU * a0;
        let mut stp = a0.clamp(stpmin, stpmax);

        let mut best: Option<(f64, f64, Array1<f64>)> = None;

        for _ in 0..self.max_iter {
            let (f, g, grad) = phi.value_and_slope(stp)?;
            let ftest = finit + stp * gtest;
            trace!("More-Thuente a: {} phi(a): {} phi'(a): {}", stp, f, g);

            if best.as_ref().map_or(true, |b| f < b.1) {
                best = Some((stp, f, grad.clone()));
            }

            if stage1 && f <= ftest && g >= 0.0 {
                stage1 = false;
            }

            // Convergence
            if f <= ftest && g.abs() <= self.eta * (-ginit) {
                return Ok(LineSearchResult {
                    alpha: stp,
                    f,
                    g: Some(grad),
                    warning: None,
                });
            }

            // Rounding errors, interval too small or a step bound was hit
            if (brackt && (stp <= stmin || stp >= stmax))
                || (brackt && stmax - stmin <= self.xtol * stmax)
                || (stp == stpmax && f <= ftest && g <= gtest)
                || (stp == stpmin && (f > ftest || g >= gtest))
            {
                trace!("More-Thuente stalled at a: {}", stp);
                break;
            }

            let trial = End { a: stp, f, d: g };
            if stage1 && f <= x.f && f > ftest {
                // Modified function psi
                let shift = |e: End| End {
                    a: e.a,
                    f: e.f - e.a * gtest,
                    d: e.d - gtest,
                };
                let unshift = |e: End| End {
                    a: e.a,
                    f: e.f + e.a * gtest,
                    d: e.d + gtest,
                };
                let mut xm = shift(x);
                let mut ym = shift(y);
                stp = dcstep(&mut xm, &mut ym, shift(trial), &mut brackt, stmin, stmax);
                x = unshift(xm);
                y = unshift(ym);
            } else {
                stp = dcstep(&mut x, &mut y, trial, &mut brackt, stmin, stmax);
            }

            // Force a sufficient decrease in the interval width
            if brackt {
                if (y.a - x.a).abs() >= P66 * width1 {
                    stp = x.a + 0.5 * (y.a - x.a);
                }
                width1 = width;
                width = (y.a - x.a).abs();
            }

            if brackt {
                stmin = x.a.min(y.a);
                stmax = x.a.max(y.a);
            } else {
                stmin = stp + XTRAPL * (stp - x.a);
                stmax = stp + XTRAPU * (stp - x.a);
            }

            stp = stp.clamp(stpmin, stpmax);

            // Fall back to the best step when no progress is possible
            if (brackt && (stp <= stmin || stp >= stmax))
                || (brackt && stmax - stmin <= self.xtol * stmax)
            {
                stp = x.a;
            }
        }

        match best {
            Some((alpha, f, g)) => Ok(LineSearchResult {
                alpha,
                f,
                g: Some(g),
                warning: Some(MinimizerWarning::LineSearchStalled),
            }),
            None => Err(MinimizerError::NumericalError(
                "More-Thuente line search made no function evaluations".to_string(),
            )),
        }
    }

    fn kind(&self) -> LineSearchKind {
        LineSearchKind::MoreThuente
    }
}
