//! Linear least squares solver.
//!
//! Each Levenberg–Marquardt iteration solves a small damped linear problem:
//!
//! ```text
//! minimize |r - J δ|² + λ |D δ|²
//! ```
//!
//! which we express as an ordinary least squares problem on the augmented
//! system `[J; sqrt(λ) D] δ = [r; 0]`.
//!
//! Implementation choices:
//! - SVD solve, because the augmented system is tall (more rows than columns)
//!   and nalgebra's `QR::solve` is meant for square systems.
//! - Parameter counts are tiny (3–6 columns), so SVD cost is negligible.

use nalgebra::{DMatrix, DVector};

const SVD_MAX_ITER: usize = 10_000;

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    // SVD does not converge on NaN/inf entries.
    if !(x.iter().all(|v| v.is_finite()) && y.iter().all(|v| v.is_finite())) {
        return None;
    }
    let svd = x.clone().try_svd(true, true, f64::EPSILON, SVD_MAX_ITER)?;

    // Growth parameters live on very different scales (y0 ~ 0.01, K ~ 1,
    // r ~ 1, v ~ 10), so retry with looser tolerances before giving up.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve the damped normal step `[J; sqrt(λ) D] δ = [r; 0]`.
///
/// `scale` holds the diagonal of `D` (Marquardt scaling, `sqrt(diag(JᵀJ))`).
pub fn solve_damped(
    jac: &DMatrix<f64>,
    resid: &DVector<f64>,
    lambda: f64,
    scale: &[f64],
) -> Option<DVector<f64>> {
    let (n, p) = jac.shape();
    let mut a = DMatrix::<f64>::zeros(n + p, p);
    a.view_mut((0, 0), (n, p)).copy_from(jac);
    let damp = lambda.max(0.0).sqrt();
    for (j, &s) in scale.iter().enumerate().take(p) {
        a[(n + j, j)] = damp * s.max(1e-12);
    }

    let mut b = DVector::<f64>::zeros(n + p);
    b.rows_mut(0, n).copy_from(resid);

    solve_least_squares(&a, &b)
}

/// Inverse of `JᵀJ` (unscaled parameter covariance), if it is invertible.
pub fn normal_inverse(jac: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let jtj = jac.transpose() * jac;
    let inv = jtj.try_inverse()?;
    if inv.iter().all(|v| v.is_finite()) {
        Some(inv)
    } else {
        None
    }
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
    fn damping_shrinks_the_step() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);
        let scale = [1.0, 1.0];

        let free = solve_damped(&x, &y, 0.0, &scale).unwrap();
        let damped = solve_damped(&x, &y, 100.0, &scale).unwrap();
        assert!((free[1] - 3.0).abs() < 1e-10);
        assert!(damped.norm() < free.norm());
    }

    #[test]
    fn normal_inverse_of_identity_design() {
        let x = DMatrix::<f64>::identity(3, 3);
        let inv = normal_inverse(&x).unwrap();
        assert!((inv[(1, 1)] - 1.0).abs() < 1e-12);

        let singular = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(normal_inverse(&singular).is_none());
    }
}
