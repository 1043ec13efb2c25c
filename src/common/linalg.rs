//! Linear algebra utilities
//!
//! Small fixed-size helpers for the 5-parameter track model measured in two
//! local coordinates.

use nalgebra::{Matrix2, Matrix5, SMatrix, Vector2, Vector5};

/// Projection of the 5-parameter state onto the measured (y, z) coordinates
pub type Projection = SMatrix<f64, 2, 5>;

/// Kalman gain for a 2D measurement of the 5-parameter state
pub type Gain = SMatrix<f64, 5, 2>;

/// Relative determinant threshold below which a 2x2 covariance is treated as singular
const SINGULAR_TOLERANCE: f64 = 1e-14;

/// The (y, z) measurement matrix `H`
#[inline]
pub fn position_projection() -> Projection {
    #[rustfmt::skip]
    let h = Projection::new(
        1.0, 0.0, 0.0, 0.0, 0.0,
        0.0, 1.0, 0.0, 0.0, 0.0,
    );
    h
}

/// Invert a symmetric 2x2 covariance
///
/// Returns `None` when the matrix is singular relative to its diagonal or not
/// positive definite.
pub fn invert_covariance_2d(s: &Matrix2<f64>) -> Option<Matrix2<f64>> {
    let det = s[(0, 0)] * s[(1, 1)] - s[(0, 1)] * s[(1, 0)];
    let scale = (s[(0, 0)] * s[(1, 1)]).abs();
    if !det.is_finite() || s[(0, 0)] <= 0.0 || det <= SINGULAR_TOLERANCE * scale.max(f64::MIN_POSITIVE) {
        return None;
    }
    #[rustfmt::skip]
    let inv = Matrix2::new(
         s[(1, 1)] / det, -s[(0, 1)] / det,
        -s[(1, 0)] / det,  s[(0, 0)] / det,
    );
    Some(inv)
}

/// Squared Mahalanobis distance `rᵀ S⁻¹ r`
///
/// Returns `None` for a degenerate `S`.
pub fn chi2_2d(residual: &Vector2<f64>, s: &Matrix2<f64>) -> Option<f64> {
    invert_covariance_2d(s).map(|s_inv| residual.dot(&(s_inv * residual)))
}

/// Kalman filter update for a (y, z) measurement
///
/// Uses the Joseph form for the covariance so the result stays positive
/// semi-definite, then re-symmetrizes it.
///
/// # Returns
/// Tuple of (updated parameters, updated covariance, chi2), or `None` when the
/// innovation covariance is degenerate.
pub fn kalman_update(
    params: &Vector5<f64>,
    covariance: &Matrix5<f64>,
    measurement: &Vector2<f64>,
    measurement_cov: &Matrix2<f64>,
) -> Option<(Vector5<f64>, Matrix5<f64>, f64)> {
    let h = position_projection();
    let residual = measurement - h * params;
    let s = h * covariance * h.transpose() + measurement_cov;
    let s_inv = invert_covariance_2d(&s)?;

    let gain: Gain = covariance * h.transpose() * s_inv;
    let updated = params + gain * residual;

    let i_minus_kh = Matrix5::identity() - gain * h;
    let cov = i_minus_kh * covariance * i_minus_kh.transpose()
        + gain * measurement_cov * gain.transpose();

    let chi2 = residual.dot(&(s_inv * residual));
    Some((updated, symmetrize(&cov), chi2))
}

/// Make matrix symmetric
///
/// Ensures a matrix is symmetric by averaging with its transpose
#[inline]
pub fn symmetrize(matrix: &Matrix5<f64>) -> Matrix5<f64> {
    0.5 * (matrix + matrix.transpose())
}

/// Check that a covariance is symmetric positive semi-definite
///
/// Eigenvalues may dip below zero by `tolerance` times the largest eigenvalue.
pub fn is_positive_semidefinite(matrix: &Matrix5<f64>, tolerance: f64) -> bool {
    if (matrix - matrix.transpose()).amax() > tolerance * matrix.amax().max(1.0) {
        return false;
    }
    let eigen = matrix.symmetric_eigen();
    let largest = eigen.eigenvalues.amax();
    eigen
        .eigenvalues
        .iter()
        .all(|&ev| ev >= -tolerance * largest.max(f64::MIN_POSITIVE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invert_covariance_2d() {
        let s = Matrix2::new(4.0, 1.0, 1.0, 2.0);
        let inv = invert_covariance_2d(&s).unwrap();
        let product = s * inv;
        assert!((product - Matrix2::identity()).amax() < 1e-12);
    }

    #[test]
    fn test_singular_covariance_rejected() {
        let s = Matrix2::new(1.0, 1.0, 1.0, 1.0);
        assert!(invert_covariance_2d(&s).is_none());
        assert!(invert_covariance_2d(&Matrix2::zeros()).is_none());
        assert!(chi2_2d(&Vector2::new(1.0, 1.0), &s).is_none());
    }

    #[test]
    fn test_chi2_diagonal() {
        let s = Matrix2::new(4.0, 0.0, 0.0, 9.0);
        let chi2 = chi2_2d(&Vector2::new(2.0, 3.0), &s).unwrap();
        assert!((chi2 - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_kalman_update_pulls_towards_measurement() {
        let params = Vector5::zeros();
        let cov = Matrix5::identity();
        let meas = Vector2::new(1.0, -1.0);
        let v = Matrix2::identity();

        let (updated, new_cov, chi2) = kalman_update(&params, &cov, &meas, &v).unwrap();

        // Equal weights: halfway between prediction and measurement
        assert!((updated[0] - 0.5).abs() < 1e-12);
        assert!((updated[1] + 0.5).abs() < 1e-12);
        assert!((new_cov[(0, 0)] - 0.5).abs() < 1e-12);
        assert!((chi2 - 1.0).abs() < 1e-12);
        assert!(is_positive_semidefinite(&new_cov, 1e-9));
    }

    #[test]
    fn test_positive_semidefinite_detection() {
        assert!(is_positive_semidefinite(&Matrix5::identity(), 1e-12));
        let mut m = Matrix5::identity();
        m[(2, 2)] = -1.0;
        assert!(!is_positive_semidefinite(&m, 1e-12));
        let mut asym = Matrix5::identity();
        asym[(0, 1)] = 0.5;
        assert!(!is_positive_semidefinite(&asym, 1e-12));
    }
}
