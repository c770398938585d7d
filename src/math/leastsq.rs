//! Damped nonlinear least squares (Levenberg–Marquardt).
//!
//! Minimizes `S(p) = Σ r_i(p)²` for a user-supplied residual vector `r`,
//! using a numerically differentiated Jacobian.
//!
//! Implementation notes:
//! - The damping parameter interpolates between Gauss–Newton steps (small λ)
//!   and scaled gradient descent (large λ). λ shrinks on accepted steps and
//!   grows when a step fails to reduce the objective.
//! - Parameters are projected into their box bounds after every step.
//! - The covariance of the solution is estimated from the pseudo-inverse of
//!   `JᵀJ` at the optimum; callers scale it by the reduced chi-square.

use nalgebra::{DMatrix, DVector};

use crate::math::wls::solve_least_squares;

/// Relative step size for forward-difference Jacobian columns.
const JAC_REL_STEP: f64 = 1e-6;
/// Absolute floor for Jacobian step sizes.
const JAC_ABS_STEP: f64 = 1e-12;
/// Maximum consecutive damping increases within one outer iteration.
const MAX_LAMBDA_RAISES: usize = 16;
/// Floor on the damping diagonal, guarding against a zero `JᵀJ` diagonal.
const DAMPING_FLOOR: f64 = 1e-12;

/// Stopping tolerances and iteration limits.
#[derive(Debug, Clone)]
pub struct LmOptions {
    pub max_iter: usize,
    /// Relative chi-square improvement below which the fit is converged.
    pub ftol: f64,
    /// Relative step size below which the fit is converged.
    pub xtol: f64,
    /// Initial damping parameter.
    pub lambda0: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iter: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            lambda0: 1e-3,
        }
    }
}

/// A converged minimizer state.
#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub params: Vec<f64>,
    pub chisq: f64,
    /// Unscaled covariance estimate `(JᵀJ)⁻¹`, when obtainable.
    pub covariance: Option<DMatrix<f64>>,
    pub iterations: usize,
}

/// Minimize `Σ r_i(p)²` starting from `p0`, with box bounds per parameter.
///
/// `residuals` returns the residual vector for a parameter set, or `None`
/// when the model cannot be evaluated there (treated as an uphill step).
/// Returns `None` when the iteration exhausts `max_iter` without meeting the
/// tolerances, or when the objective cannot be evaluated at the start.
pub fn levenberg_marquardt<F>(
    residuals: F,
    p0: &[f64],
    bounds: &[(f64, f64)],
    opts: &LmOptions,
) -> Option<LmOutcome>
where
    F: Fn(&[f64]) -> Option<DVector<f64>> + Sync,
{
    let n_params = p0.len();
    if n_params == 0 || bounds.len() != n_params {
        return None;
    }

    let mut p: Vec<f64> = p0
        .iter()
        .zip(bounds)
        .map(|(&v, &(lo, hi))| v.clamp(lo, hi))
        .collect();
    let mut r = residuals(&p)?;
    let mut chisq = r.norm_squared();
    if !chisq.is_finite() {
        return None;
    }

    let mut lambda = opts.lambda0;
    let mut converged = false;
    let mut iterations = 0;

    while iterations < opts.max_iter && !converged {
        iterations += 1;

        let jac = numeric_jacobian(&residuals, &p, &r)?;
        let jtj = jac.transpose() * &jac;
        let neg_grad = -(jac.transpose() * &r);

        let mut stepped = false;
        for _ in 0..MAX_LAMBDA_RAISES {
            let mut damped = jtj.clone();
            for i in 0..n_params {
                damped[(i, i)] += lambda * jtj[(i, i)].max(DAMPING_FLOOR);
            }

            let Some(delta) = solve_damped_system(&damped, &neg_grad) else {
                lambda *= 10.0;
                continue;
            };

            let trial: Vec<f64> = p
                .iter()
                .enumerate()
                .map(|(i, &v)| (v + delta[i]).clamp(bounds[i].0, bounds[i].1))
                .collect();

            let Some(trial_r) = residuals(&trial) else {
                lambda *= 10.0;
                continue;
            };
            let trial_chisq = trial_r.norm_squared();
            if !trial_chisq.is_finite() || trial_chisq > chisq {
                lambda *= 10.0;
                continue;
            }

            let rel_drop = (chisq - trial_chisq) / chisq.max(f64::MIN_POSITIVE);
            let step_small = trial
                .iter()
                .zip(&p)
                .all(|(new, old)| (new - old).abs() <= opts.xtol * (old.abs() + opts.xtol));

            p = trial;
            r = trial_r;
            chisq = trial_chisq;
            lambda = (lambda / 10.0).max(1e-12);
            stepped = true;

            if rel_drop < opts.ftol || step_small {
                converged = true;
            }
            break;
        }

        // No downhill direction despite strong damping: the gradient is
        // numerically zero, i.e. a stationary point.
        if !stepped {
            converged = true;
        }
    }

    if !converged {
        return None;
    }

    let covariance = numeric_jacobian(&residuals, &p, &r)
        .map(|jac| jac.transpose() * &jac)
        .and_then(|jtj| invert_symmetric(&jtj));

    Some(LmOutcome {
        params: p,
        chisq,
        covariance,
        iterations,
    })
}

/// Forward-difference Jacobian of the residual vector.
fn numeric_jacobian<F>(residuals: &F, p: &[f64], r0: &DVector<f64>) -> Option<DMatrix<f64>>
where
    F: Fn(&[f64]) -> Option<DVector<f64>>,
{
    let n = r0.len();
    let k = p.len();
    let mut jac = DMatrix::<f64>::zeros(n, k);

    let mut probe = p.to_vec();
    for j in 0..k {
        let h = (p[j].abs() * JAC_REL_STEP).max(JAC_ABS_STEP);
        probe[j] = p[j] + h;
        let rj = residuals(&probe)?;
        probe[j] = p[j];
        if rj.len() != n {
            return None;
        }
        for i in 0..n {
            jac[(i, j)] = (rj[i] - r0[i]) / h;
        }
    }

    if jac.iter().all(|v| v.is_finite()) {
        Some(jac)
    } else {
        None
    }
}

/// Solve the damped normal equations `A δ = g`.
///
/// Cholesky first (A is symmetric positive definite when well-conditioned),
/// then an SVD least-squares fallback.
fn solve_damped_system(a: &DMatrix<f64>, g: &DVector<f64>) -> Option<DVector<f64>> {
    if let Some(chol) = a.clone().cholesky() {
        let x = chol.solve(g);
        if x.iter().all(|v| v.is_finite()) {
            return Some(x);
        }
    }
    solve_least_squares(a, g)
}

/// Pseudo-inverse of a symmetric matrix via SVD.
///
/// The cutoff is relative to the largest singular value, so the estimate
/// degrades gracefully for rank-deficient systems instead of exploding.
fn invert_symmetric(a: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let svd = a.clone().svd(true, true);
    let max_sv = svd.singular_values.iter().fold(0.0f64, |m, &v| m.max(v));
    if !(max_sv.is_finite() && max_sv > 0.0) {
        return None;
    }
    let inv = svd.pseudo_inverse(max_sv * 1e-12).ok()?;
    if inv.iter().all(|v| v.is_finite()) {
        Some(inv)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_BOUNDS: (f64, f64) = (f64::NEG_INFINITY, f64::INFINITY);

    #[test]
    fn recovers_exponential_decay_parameters() {
        // y = a * exp(-b t), data generated exactly.
        let a_true = 3.0;
        let b_true = 0.7;
        let t: Vec<f64> = (0..20).map(|i| i as f64 * 0.25).collect();
        let y: Vec<f64> = t.iter().map(|&ti| a_true * (-b_true * ti).exp()).collect();

        let residuals = |p: &[f64]| {
            let r: Vec<f64> = t
                .iter()
                .zip(&y)
                .map(|(&ti, &yi)| yi - p[0] * (-p[1] * ti).exp())
                .collect();
            Some(DVector::from_vec(r))
        };

        let fit = levenberg_marquardt(
            residuals,
            &[1.0, 0.1],
            &[NO_BOUNDS, NO_BOUNDS],
            &LmOptions::default(),
        )
        .unwrap();

        assert!((fit.params[0] - a_true).abs() < 1e-6);
        assert!((fit.params[1] - b_true).abs() < 1e-6);
        assert!(fit.chisq < 1e-12);
    }

    #[test]
    fn respects_box_bounds() {
        // Unconstrained minimum at p = -2; the bound keeps p >= 0.
        let residuals = |p: &[f64]| Some(DVector::from_vec(vec![p[0] + 2.0]));
        let fit = levenberg_marquardt(
            residuals,
            &[5.0],
            &[(0.0, f64::INFINITY)],
            &LmOptions::default(),
        )
        .unwrap();
        assert!(fit.params[0] >= 0.0);
        assert!(fit.params[0] < 1e-6);
    }

    #[test]
    fn covariance_matches_linear_model() {
        // r_i = y_i - p0: JᵀJ = n, covariance = 1/n.
        let y = [1.0, 2.0, 3.0, 4.0];
        let residuals = |p: &[f64]| {
            Some(DVector::from_vec(y.iter().map(|&yi| yi - p[0]).collect()))
        };
        let fit =
            levenberg_marquardt(residuals, &[0.0], &[NO_BOUNDS], &LmOptions::default()).unwrap();
        assert!((fit.params[0] - 2.5).abs() < 1e-8);
        let cov = fit.covariance.unwrap();
        assert!((cov[(0, 0)] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn unevaluable_start_returns_none() {
        let residuals = |_p: &[f64]| -> Option<DVector<f64>> { None };
        assert!(
            levenberg_marquardt(residuals, &[1.0], &[NO_BOUNDS], &LmOptions::default()).is_none()
        );
    }
}
