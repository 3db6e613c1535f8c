//! Mixture convolution: source components times PSF components as image-plane Gaussians

use crate::error::RenderError;
use crate::gaussian::{ImageGaussian, ImageGaussianGrid};
use crate::linalg::{check_finite_value, invert_positive_definite};
use crate::profile::{ProfileMixture, ProfileTrait};
use crate::shape::ShapeTransform;
use crate::source::SceneSource;
use crate::stamp::PostageStamp;

use itertools::iproduct;
use nalgebra::{Matrix2, Vector2};
use ndarray::Array2;
use std::f64::consts::PI;

/// Everything the convolution needs to know about a source on a given stamp
pub(crate) struct SourceGeometry {
    pub transform: ShapeTransform,
    pub center: Vector2<f64>,
    pub mixture: ProfileMixture,
}

impl SourceGeometry {
    pub fn new(source: &SceneSource, stamp: &PostageStamp) -> Result<Self, RenderError> {
        let params = source.params();
        params.check_finite()?;

        let astrometry = stamp.astrometry();
        let transform = if source.profile().has_shape() {
            ShapeTransform::new(astrometry.distortion(), params.q, params.phi)?
        } else {
            ShapeTransform::distortion_only(astrometry.distortion())
        };
        let center = astrometry.sky_to_pix(&Vector2::new(params.ra, params.dec));
        let mixture = source.profile().mixture(params.n, params.r)?;
        Ok(Self {
            transform,
            center,
            mixture,
        })
    }

    /// Source component covariance in pixel space, `T Cov T^T`
    pub fn pixel_covariance(&self, i: usize) -> Matrix2<f64> {
        let t = &self.transform.t;
        symmetrize(t * self.mixture.covariances[i] * t.transpose())
    }
}

/// Convolved covariance of a source component and a PSF component, with its inverse
pub(crate) struct ConvolvedPair {
    pub sigma: Matrix2<f64>,
    pub precision: Matrix2<f64>,
    pub det_precision: f64,
    /// `sqrt(det F) / 2 pi`, the normalization of the convolved Gaussian
    pub norm: f64,
}

impl ConvolvedPair {
    pub fn new(
        source_covariance: &Matrix2<f64>,
        psf_covariance: &Matrix2<f64>,
    ) -> Result<Self, RenderError> {
        let sigma = symmetrize(source_covariance + psf_covariance);
        let precision = symmetrize(invert_positive_definite(&sigma, "convolved covariance")?);
        let det_precision = precision.determinant();
        if !(det_precision > 0.0) {
            return Err(RenderError::SingularMatrix {
                what: "convolved precision matrix",
                determinant: det_precision,
            });
        }
        let norm = check_finite_value(
            det_precision.sqrt() / (2.0 * PI),
            "convolved Gaussian normalization",
        )?;
        Ok(Self {
            sigma,
            precision,
            det_precision,
            norm,
        })
    }
}

#[inline]
pub(crate) fn symmetrize(m: Matrix2<f64>) -> Matrix2<f64> {
    let off = 0.5 * (m[(0, 1)] + m[(1, 0)]);
    Matrix2::new(m[(0, 0)], off, off, m[(1, 1)])
}

/// Convolve every source component with every PSF component of the stamp
///
/// The result is a `ngauss_source × ngauss_psf` grid of Gaussians without derivatives.
pub fn convert_to_gaussians(
    source: &SceneSource,
    stamp: &PostageStamp,
) -> Result<ImageGaussianGrid, RenderError> {
    let geometry = SourceGeometry::new(source, stamp)?;
    let psf = stamp.psf();
    let psi = source.params().psi;

    let shape = (geometry.mixture.ngauss(), psf.ngauss());
    let gaussians = iproduct!(0..shape.0, 0..shape.1)
        .map(|(i, j)| {
            let component = &psf.components()[j];
            let pair = ConvolvedPair::new(&geometry.pixel_covariance(i), &component.covariance)?;
            let center = geometry.center + component.mean;
            let amp = psi * geometry.mixture.amplitudes[i] * component.amplitude * pair.norm;
            Ok(ImageGaussian {
                amp: check_finite_value(amp, "image Gaussian amplitude")?,
                xcen: check_finite_value(center.x, "image Gaussian center")?,
                ycen: check_finite_value(center.y, "image Gaussian center")?,
                fxx: pair.precision[(0, 0)],
                fxy: pair.precision[(0, 1)],
                fyy: pair.precision[(1, 1)],
                derivs: None,
            })
        })
        .collect::<Result<Vec<_>, RenderError>>()?;

    Ok(ImageGaussianGrid {
        source_id: source.id,
        gaussians: Array2::from_shape_vec(shape, gaussians)
            .map_err(|_| RenderError::NumericalOverflow("image Gaussian grid"))?,
    })
}
