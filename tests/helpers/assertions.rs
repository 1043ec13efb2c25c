//! Assertion functions for numerical comparisons with tolerance

use nalgebra::Matrix5;

use siltrack::common::linalg::is_positive_semidefinite;

/// Compare scalar values with tolerance
pub fn assert_scalar_close(actual: f64, expected: f64, tolerance: f64, field_name: &str) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= tolerance,
        "{}: expected {}, got {} (diff: {}, tolerance: {})",
        field_name,
        expected,
        actual,
        diff,
        tolerance
    );
}

/// Compare vector slices element-wise with tolerance
pub fn assert_vec_close(actual: &[f64], expected: &[f64], tolerance: f64, field_name: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{}: length mismatch (actual: {}, expected: {})",
        field_name,
        actual.len(),
        expected.len()
    );
    for (i, (&a, &e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert_scalar_close(a, e, tolerance, &format!("{}[{}]", field_name, i));
    }
}

/// Symmetric within `tolerance` and positive semi-definite
pub fn assert_valid_covariance(cov: &Matrix5<f64>, tolerance: f64, field_name: &str) {
    let asymmetry = (cov - cov.transpose()).amax();
    assert!(
        asymmetry <= tolerance,
        "{}: asymmetric by {}",
        field_name,
        asymmetry
    );
    assert!(
        is_positive_semidefinite(cov, tolerance),
        "{}: not positive semi-definite: {}",
        field_name,
        cov
    );
}
