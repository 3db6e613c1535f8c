use forced_photometry::nalgebra::{Matrix2, Vector2};
use forced_photometry::ndarray::Array2;
use forced_photometry::{Astrometry, PointSpreadFunction, PostageStamp, RenderOptions, Scene};

use rand::Rng;
use rand_distr::StandardNormal;
use std::sync::Arc;

/// Stamp with unit distortion whose reference pixel `(nx / 2, ny / 2)` is at sky `(0, 0)`
pub fn centered_stamp(
    nx: usize,
    ny: usize,
    psf: impl Into<Arc<PointSpreadFunction>>,
) -> PostageStamp {
    let crpix = Vector2::new((nx / 2) as f64, (ny / 2) as f64);
    let astrometry = Astrometry::new(Matrix2::identity(), Vector2::zeros(), crpix).unwrap();
    PostageStamp::new(nx, ny, astrometry, psf)
}

/// Render `scene` onto `stamp` and add Gaussian noise of the given standard deviation
pub fn mock_stamp(
    scene: &Scene,
    stamp: PostageStamp,
    noise_sigma: f64,
    rng: &mut impl Rng,
) -> PostageStamp {
    let options = RenderOptions::default().without_deriv();
    let image = scene.render(&stamp, &options).unwrap().image;
    let noisy = image.mapv(|x| x + noise_sigma * rng.sample::<f64, _>(StandardNormal));
    let ierr = Array2::from_elem(noisy.dim(), 1.0 / noise_sigma);
    stamp
        .with_pixel_values(noisy)
        .unwrap()
        .with_ierr(ierr)
        .unwrap()
}
