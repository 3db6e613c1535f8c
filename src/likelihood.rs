//! Gaussian likelihood of stamp data given a scene

use crate::error::RenderError;
use crate::linalg::check_finite_value;
use crate::render::RenderOptions;
use crate::scene::Scene;
use crate::stamp::PostageStamp;

use ndarray::{Array1, Array3, Axis, Zip};

/// Objective function for an external optimizer
///
/// `lnlike = -1/2 sum(((data - model) * ierr)^2)` over the stamp pixels, with the model rendered
/// from the scene whose free parameters are replaced by `theta`.
#[derive(Clone, Debug)]
pub struct StampLikelihood {
    pub scene: Scene,
    pub stamp: PostageStamp,
    pub options: RenderOptions,
}

impl StampLikelihood {
    pub fn new(scene: Scene, stamp: PostageStamp) -> Self {
        Self {
            scene,
            stamp,
            options: RenderOptions::default(),
        }
    }

    pub fn with_second_order(mut self, second_order: bool) -> Self {
        self.options.second_order = second_order;
        self
    }

    #[inline]
    pub fn n_free(&self) -> usize {
        self.scene.n_free()
    }

    /// `(-lnlike, -d lnlike / d theta)`
    pub fn negative_ln_like(&self, theta: &[f64]) -> Result<(f64, Array1<f64>), RenderError> {
        let scene = self.scene.with_free_values(theta)?;
        let rendered = scene.render(&self.stamp, &self.options.with_deriv())?;
        let gradient = rendered
            .gradient
            .ok_or(RenderError::NumericalOverflow("model gradient"))?;

        // (data - model) * ierr^2
        let mut weighted = self.stamp.pixel_values() - &rendered.image;
        let mut chi2 = 0.0;
        Zip::from(&mut weighted)
            .and(self.stamp.ierr())
            .for_each(|w, &ierr| {
                chi2 += (*w * ierr).powi(2);
                *w *= ierr * ierr;
            });

        let grad: Array1<f64> = gradient
            .axis_iter(Axis(0))
            .map(|dmodel| -(&dmodel * &weighted).sum())
            .collect();
        let value = check_finite_value(0.5 * chi2, "negative log-likelihood")?;
        if grad.iter().any(|x| !x.is_finite()) {
            return Err(RenderError::NumericalOverflow("likelihood gradient"));
        }
        Ok((value, grad))
    }

    /// `-lnlike` without rendering derivatives
    pub fn negative_ln_like_nograd(&self, theta: &[f64]) -> Result<f64, RenderError> {
        let scene = self.scene.with_free_values(theta)?;
        let rendered = scene.render(&self.stamp, &self.options.without_deriv())?;
        let chi2 = Zip::from(self.stamp.pixel_values())
            .and(&rendered.image)
            .and(self.stamp.ierr())
            .fold(0.0, |acc, &data, &model, &ierr| {
                acc + ((data - model) * ierr).powi(2)
            });
        check_finite_value(0.5 * chi2, "negative log-likelihood")
    }
}

/// Centered finite-difference derivatives of the rendered image over the free parameters
///
/// Returns an `(n_free, nx, ny)` array comparable to [RenderedImage::gradient](crate::RenderedImage).
pub fn numerical_image_gradients(
    scene: &Scene,
    stamp: &PostageStamp,
    theta: &[f64],
    delta: f64,
    options: &RenderOptions,
) -> Result<Array3<f64>, RenderError> {
    if !(delta.is_finite() && delta > 0.0) {
        return Err(RenderError::InvalidParameter {
            name: "delta",
            value: delta,
            reason: "finite-difference step must be positive",
        });
    }
    let options = options.without_deriv();
    let mut gradient = Array3::zeros((theta.len(), stamp.nx(), stamp.ny()));
    let mut shifted = theta.to_vec();
    for (k, mut out) in gradient.axis_iter_mut(Axis(0)).enumerate() {
        shifted[k] = theta[k] + delta;
        let plus = scene.with_free_values(&shifted)?.render(stamp, &options)?;
        shifted[k] = theta[k] - delta;
        let minus = scene.with_free_values(&shifted)?.render(stamp, &options)?;
        shifted[k] = theta[k];
        Zip::from(&mut out)
            .and(&plus.image)
            .and(&minus.image)
            .for_each(|o, &p, &m| *o = (p - m) / (2.0 * delta));
    }
    Ok(gradient)
}
