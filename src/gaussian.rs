//! Image-plane Gaussians and their sparse Jacobian over scene parameters

use crate::source::{NPARAMS, SceneParameter};

use nalgebra::Matrix2;
use ndarray::Array2;

/// Number of raw parameters of an [ImageGaussian]: `[amp, xcen, ycen, fxx, fyy, fxy]`
pub const NRAW: usize = 6;

/// Index scheme of the raw-parameter gradient returned by the per-pixel evaluator
pub mod raw_index {
    pub const AMP: usize = 0;
    pub const XCEN: usize = 1;
    pub const YCEN: usize = 2;
    pub const FXX: usize = 3;
    pub const FYY: usize = 4;
    pub const FXY: usize = 5;
}

/// Length of the stored [GaussianJacobian]
pub const NDERIV: usize = 15;

/// Index scheme of [GaussianJacobian]
///
/// `[dA/dpsi, dA/dq, dA/dphi, dA/dn, dA/dr, D00, D01, D10, D11, dF/dq (xx, xy, yy),
/// dF/dphi (xx, xy, yy)]`, where `A` is the amplitude, `F` the precision matrix and `D` the
/// distortion matrix. Pixel center derivatives over `(ra, dec)` are the columns of `D`.
pub mod deriv_index {
    pub const DA_DPSI: usize = 0;
    pub const DA_DQ: usize = 1;
    pub const DA_DPHI: usize = 2;
    pub const DA_DN: usize = 3;
    pub const DA_DR: usize = 4;
    pub const DISTORTION: usize = 5;
    pub const DF_DQ: usize = 9;
    pub const DF_DPHI: usize = 12;
}

/// Sparse derivatives of one [ImageGaussian] over the scene parameters of its source
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussianJacobian(pub [f64; NDERIV]);

impl GaussianJacobian {
    pub fn new(
        amplitude: [f64; 5],
        distortion: &Matrix2<f64>,
        df_dq: [f64; 3],
        df_dphi: [f64; 3],
    ) -> Self {
        use deriv_index::*;

        let mut derivs = [0.0; NDERIV];
        derivs[DA_DPSI..DISTORTION].copy_from_slice(&amplitude);
        derivs[DISTORTION..DF_DQ].copy_from_slice(&[
            distortion[(0, 0)],
            distortion[(0, 1)],
            distortion[(1, 0)],
            distortion[(1, 1)],
        ]);
        derivs[DF_DQ..DF_DPHI].copy_from_slice(&df_dq);
        derivs[DF_DPHI..].copy_from_slice(&df_dphi);
        Self(derivs)
    }

    #[inline]
    pub fn distortion(&self) -> Matrix2<f64> {
        let d = &self.0[deriv_index::DISTORTION..deriv_index::DF_DQ];
        Matrix2::new(d[0], d[1], d[2], d[3])
    }

    /// Chain a raw-parameter gradient into the gradient over the source's scene parameters
    pub fn scene_gradient(&self, raw: &[f64; NRAW]) -> [f64; NPARAMS] {
        use deriv_index::*;
        use raw_index::*;

        let j = &self.0;
        let precision = |offset: usize| {
            raw[FXX] * j[offset] + raw[FXY] * j[offset + 1] + raw[FYY] * j[offset + 2]
        };

        let mut grad = [0.0; NPARAMS];
        grad[SceneParameter::Flux.index()] = raw[AMP] * j[DA_DPSI];
        grad[SceneParameter::Ra.index()] =
            raw[XCEN] * j[DISTORTION] + raw[YCEN] * j[DISTORTION + 2];
        grad[SceneParameter::Dec.index()] =
            raw[XCEN] * j[DISTORTION + 1] + raw[YCEN] * j[DISTORTION + 3];
        grad[SceneParameter::AxisRatio.index()] = raw[AMP] * j[DA_DQ] + precision(DF_DQ);
        grad[SceneParameter::PositionAngle.index()] = raw[AMP] * j[DA_DPHI] + precision(DF_DPHI);
        grad[SceneParameter::SersicIndex.index()] = raw[AMP] * j[DA_DN];
        grad[SceneParameter::HalfLightRadius.index()] = raw[AMP] * j[DA_DR];
        grad
    }
}

/// One source component convolved with one PSF component, in pixel space
///
/// The Gaussian is `amp * exp(-0.5 d^T F d)` with `d = (x - xcen, y - ycen)` and the precision
/// matrix `F = [[fxx, fxy], [fxy, fyy]]`. `derivs` is attached once by the gradient assembly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImageGaussian {
    pub amp: f64,
    pub xcen: f64,
    pub ycen: f64,
    pub fxx: f64,
    pub fxy: f64,
    pub fyy: f64,
    pub derivs: Option<GaussianJacobian>,
}

impl ImageGaussian {
    #[inline]
    pub fn precision(&self) -> Matrix2<f64> {
        Matrix2::new(self.fxx, self.fxy, self.fxy, self.fyy)
    }
}

/// All image-plane Gaussians of one (source, stamp) pair, indexed by
/// `(source component, PSF component)`
#[derive(Clone, Debug, PartialEq)]
pub struct ImageGaussianGrid {
    pub source_id: usize,
    pub gaussians: Array2<ImageGaussian>,
}

impl ImageGaussianGrid {
    #[inline]
    pub fn ngauss_source(&self) -> usize {
        self.gaussians.nrows()
    }

    #[inline]
    pub fn ngauss_psf(&self) -> usize {
        self.gaussians.ncols()
    }

    /// Gaussians in the fixed `(i, j)` order used for summation
    pub fn iter(&self) -> impl Iterator<Item = &ImageGaussian> {
        self.gaussians.iter()
    }
}
