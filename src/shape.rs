//! Shape transform: axis-ratio scaling and position-angle rotation

use crate::error::RenderError;

use nalgebra::Matrix2;

/// Scale matrix `diag(1/q, q)`
///
/// `q` must be positive and finite, otherwise [RenderError::InvalidParameter] is returned.
pub fn scale_matrix(q: f64) -> Result<Matrix2<f64>, RenderError> {
    check_axis_ratio(q)?;
    Ok(Matrix2::new(q.recip(), 0.0, 0.0, q))
}

/// Derivative of [scale_matrix] with respect to `q`: `diag(-1/q^2, 1)`
pub fn scale_matrix_deriv(q: f64) -> Result<Matrix2<f64>, RenderError> {
    check_axis_ratio(q)?;
    Ok(Matrix2::new(-(q * q).recip(), 0.0, 0.0, 1.0))
}

/// Counter-clockwise rotation by `phi` radians
pub fn rotation_matrix(phi: f64) -> Matrix2<f64> {
    let (s, c) = phi.sin_cos();
    Matrix2::new(c, -s, s, c)
}

/// Derivative of [rotation_matrix] with respect to `phi`
pub fn rotation_matrix_deriv(phi: f64) -> Matrix2<f64> {
    let (s, c) = phi.sin_cos();
    Matrix2::new(-s, -c, c, -s)
}

fn check_axis_ratio(q: f64) -> Result<(), RenderError> {
    if q.is_finite() && q > 0.0 {
        Ok(())
    } else {
        Err(RenderError::InvalidParameter {
            name: "q",
            value: q,
            reason: "axis ratio must be positive",
        })
    }
}

/// Combined source-to-pixel transform `T = D R(phi) S(q)` and its derivatives
#[derive(Clone, Debug, PartialEq)]
pub struct ShapeTransform {
    pub t: Matrix2<f64>,
    pub dt_dq: Matrix2<f64>,
    pub dt_dphi: Matrix2<f64>,
}

impl ShapeTransform {
    pub fn new(distortion: &Matrix2<f64>, q: f64, phi: f64) -> Result<Self, RenderError> {
        let r = rotation_matrix(phi);
        let s = scale_matrix(q)?;
        Ok(Self {
            t: distortion * r * s,
            dt_dq: distortion * r * scale_matrix_deriv(q)?,
            dt_dphi: distortion * rotation_matrix_deriv(phi) * s,
        })
    }

    /// Transform without shape: `T = D`, all shape derivatives vanish
    pub fn distortion_only(distortion: &Matrix2<f64>) -> Self {
        Self {
            t: *distortion,
            dt_dq: Matrix2::zeros(),
            dt_dphi: Matrix2::zeros(),
        }
    }
}
