//! Weighted least squares solver.
//!
//! Small linear regression problems show up in two places:
//!
//! ```text
//! minimize Σ w_i (y_i - x_i^T β)^2
//! ```
//!
//! - the log-space power-law fit used as the initial guess for the nonlinear
//!   optimizer
//! - the damped normal equations inside each Levenberg–Marquardt step
//!
//! Implementation choices:
//! - We scale rows by `sqrt(w_i)` and solve an ordinary least squares problem.
//! - We use SVD to solve the least-squares problem robustly even when the
//!   design matrix is tall (more rows than columns).
//!   (Nalgebra's `QR::solve` is intended for square systems and will panic for
//!   non-square matrices.)
//! - Parameter dimension is tiny (2 columns for the log-space guess), so SVD
//!   performance is a non-issue.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails. SED samples
    // spanning a narrow wavelength range can produce nearly collinear design
    // columns, so the tolerance balances numerical stability with solution
    // acceptance.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve `minimize Σ w_i (y_i - x_i^T β)^2` by scaling rows with `sqrt(w_i)`.
///
/// Rows with non-finite or non-positive weight are given zero influence.
pub fn solve_weighted_least_squares(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    w: &[f64],
) -> Option<DVector<f64>> {
    if x.nrows() != y.len() || x.nrows() != w.len() {
        return None;
    }

    let mut xw = x.clone();
    let mut yw = y.clone();
    for i in 0..x.nrows() {
        let sw = if w[i].is_finite() && w[i] > 0.0 {
            w[i].sqrt()
        } else {
            0.0
        };
        for j in 0..x.ncols() {
            xw[(i, j)] *= sw;
        }
        yw[i] *= sw;
    }

    solve_least_squares(&xw, &yw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn weights_control_which_rows_matter() {
        // Two inconsistent observations of a constant; the heavier one wins.
        let x = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        let y = DVector::from_row_slice(&[0.0, 10.0]);

        let beta = solve_weighted_least_squares(&x, &y, &[1e6, 1.0]).unwrap();
        assert!(beta[0] < 0.1, "heavy row should dominate, got {}", beta[0]);

        let beta = solve_weighted_least_squares(&x, &y, &[1.0, 1.0]).unwrap();
        assert!((beta[0] - 5.0).abs() < 1e-9);
    }
}
