//! Small linear-algebra helpers shared by the strategies.
//!
//! Covariance and weight matrices must be positive definite. Inversions go through a
//! Cholesky factorization only, so an indefinite or singular input is reported as `None`.

use nalgebra::{DMatrix, DVector, Matrix3, Point3, Vector3};

/// Invert a symmetric positive definite matrix.
///
/// Return `None` when the Cholesky factorization fails or the result is not finite.
pub(crate) fn invert_positive_definite(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if !m.is_square() {
        return None;
    }
    if m.nrows() == 0 {
        return Some(m.clone());
    }
    let inv = symmetrize(&m.clone().cholesky()?.inverse());
    inv.iter().all(|v| v.is_finite()).then_some(inv)
}

/// 3×3 counterpart of [`invert_positive_definite`].
pub(crate) fn invert_positive_definite3(m: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let inv = symmetrize3(&m.cholesky()?.inverse());
    inv.iter().all(|v| v.is_finite()).then_some(inv)
}

/// Average a matrix with its transpose.
pub(crate) fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

pub(crate) fn symmetrize3(m: &Matrix3<f64>) -> Matrix3<f64> {
    (m + m.transpose()) * 0.5
}

/// Coordinates of a point as a dynamically sized vector.
pub(crate) fn point_to_dvector(p: &Point3<f64>) -> DVector<f64> {
    DVector::from_column_slice(p.coords.as_slice())
}

/// Copy a length-3 dynamically sized vector into a static one.
pub(crate) fn to_vector3(v: &DVector<f64>) -> Vector3<f64> {
    Vector3::from_column_slice(v.as_slice())
}

/// Copy a 3×3 dynamically sized matrix into a static one.
///
/// The caller guarantees the 3×3 shape.
pub(crate) fn to_matrix3(m: &DMatrix<f64>) -> Matrix3<f64> {
    Matrix3::from_iterator(m.iter().copied())
}

pub(crate) fn to_dmatrix(m: &Matrix3<f64>) -> DMatrix<f64> {
    DMatrix::from_column_slice(3, 3, m.as_slice())
}

/// Check that a 3×3 matrix is symmetric and has no eigenvalue below `-tol`.
///
/// The symmetry test is relative to the largest absolute entry.
pub fn is_symmetric_positive_semi_definite(m: &Matrix3<f64>, tol: f64) -> bool {
    if !m.iter().all(|v| v.is_finite()) {
        return false;
    }
    let scale = m.amax().max(1.0);
    if (m - m.transpose()).amax() > tol * scale {
        return false;
    }
    m.symmetric_eigen()
        .eigenvalues
        .iter()
        .all(|&lambda| lambda >= -tol * scale)
}
