//! Small 2x2 helpers shared by the convolution and gradient code

use crate::error::RenderError;

use nalgebra::Matrix2;

/// Indices of the unique entries of a flattened symmetric 2x2 matrix: `[0, 0]`, `[0, 1]`, `[1, 1]`
pub const SYMMETRIC_UNIQUE_INDICES: [(usize, usize); 3] = [(0, 0), (0, 1), (1, 1)];

/// Invert a symmetric matrix which must be positive-definite
pub(crate) fn invert_positive_definite(
    matrix: &Matrix2<f64>,
    what: &'static str,
) -> Result<Matrix2<f64>, RenderError> {
    check_finite(matrix, what)?;
    let determinant = matrix.determinant();
    if !(determinant > 0.0 && matrix[(0, 0)] > 0.0) {
        return Err(RenderError::SingularMatrix { what, determinant });
    }
    let inverse = matrix
        .try_inverse()
        .ok_or(RenderError::SingularMatrix { what, determinant })?;
    check_finite(&inverse, what)?;
    Ok(inverse)
}

/// Invert a general matrix, zero determinant is an error
pub(crate) fn invert(matrix: &Matrix2<f64>, what: &'static str) -> Result<Matrix2<f64>, RenderError> {
    check_finite(matrix, what)?;
    let determinant = matrix.determinant();
    if determinant == 0.0 || !determinant.is_finite() {
        return Err(RenderError::SingularMatrix { what, determinant });
    }
    let inverse = matrix
        .try_inverse()
        .ok_or(RenderError::SingularMatrix { what, determinant })?;
    check_finite(&inverse, what)?;
    Ok(inverse)
}

pub(crate) fn check_finite(matrix: &Matrix2<f64>, what: &'static str) -> Result<(), RenderError> {
    if matrix.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(RenderError::NumericalOverflow(what))
    }
}

pub(crate) fn check_finite_value(x: f64, what: &'static str) -> Result<f64, RenderError> {
    if x.is_finite() {
        Ok(x)
    } else {
        Err(RenderError::NumericalOverflow(what))
    }
}

/// `[xx, xy, yy]` entries of a symmetric matrix
#[inline]
pub fn unique_entries(matrix: &Matrix2<f64>) -> [f64; 3] {
    SYMMETRIC_UNIQUE_INDICES.map(|idx| matrix[idx])
}
