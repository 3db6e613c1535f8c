use crate::convolve::convert_to_gaussians;
use crate::error::RenderError;
use crate::evaluate::compute_gaussian_array;
use crate::gaussian::NRAW;
use crate::gradients::get_gaussian_gradients;
use crate::source::{NPARAMS, SceneSource};
use crate::stamp::PostageStamp;

use conv::ConvUtil;
use log::trace;
use ndarray::{Array2, Array3, Axis, Zip};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Rendering flags
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct RenderOptions {
    /// Apply the second-order pixel-integration correction
    pub second_order: bool,
    /// Compute gradients over the scene parameters
    pub compute_deriv: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            second_order: true,
            compute_deriv: true,
        }
    }
}

impl RenderOptions {
    pub fn without_deriv(self) -> Self {
        Self {
            compute_deriv: false,
            ..self
        }
    }

    pub fn with_deriv(self) -> Self {
        Self {
            compute_deriv: true,
            ..self
        }
    }
}

/// Image of a single source, with the gradient over its full parameter vector
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedSource {
    pub source_id: usize,
    /// `(nx, ny)` counts
    pub image: Array2<f64>,
    /// `(NPARAMS, nx, ny)`, indexed by [SceneParameter::index](crate::SceneParameter::index)
    pub gradient: Option<Array3<f64>>,
}

/// Pixel coordinates of the stamp grid, `(x, y)` arrays of shape `(nx, ny)`
pub fn pixel_grid(stamp: &PostageStamp) -> Result<(Array2<f64>, Array2<f64>), RenderError> {
    let coords = |n: usize| {
        (0..n)
            .map(|i| {
                i.value_as::<f64>()
                    .map_err(|_| RenderError::NumericalOverflow("pixel coordinate"))
            })
            .collect::<Result<Vec<_>, _>>()
    };
    let xs = coords(stamp.nx())?;
    let ys = coords(stamp.ny())?;
    let xpix = Array2::from_shape_fn(stamp.dim(), |(x, _)| xs[x]);
    let ypix = Array2::from_shape_fn(stamp.dim(), |(_, y)| ys[y]);
    Ok((xpix, ypix))
}

/// Render a single source onto the stamp grid
///
/// Contributions of the `(source component, PSF component)` Gaussians are accumulated in
/// row-major `(i, j)` order, so the result is reproducible bit to bit.
pub fn render_source(
    source: &SceneSource,
    stamp: &PostageStamp,
    options: &RenderOptions,
) -> Result<RenderedSource, RenderError> {
    let mut grid = convert_to_gaussians(source, stamp)?;
    if options.compute_deriv {
        get_gaussian_gradients(source, stamp, &mut grid)?;
    }
    trace!(
        "rendering source {} on stamp {}: {}x{} Gaussians over {}x{} pixels",
        source.id,
        stamp.id,
        grid.ngauss_source(),
        grid.ngauss_psf(),
        stamp.nx(),
        stamp.ny(),
    );

    let (xpix, ypix) = pixel_grid(stamp)?;
    let (nx, ny) = stamp.dim();
    let mut image = Array2::zeros((nx, ny));
    let mut gradient = options
        .compute_deriv
        .then(|| Array3::zeros((NPARAMS, nx, ny)));

    for g in grid.iter() {
        let (counts, raw_gradient) = compute_gaussian_array(g, xpix.view(), ypix.view(), options);
        image += &counts;

        if let (Some(gradient), Some(raw_gradient)) = (gradient.as_mut(), raw_gradient) {
            let jacobian = g
                .derivs
                .ok_or(RenderError::NumericalOverflow("image Gaussian without derivatives"))?;
            Zip::from(gradient.lanes_mut(Axis(0)))
                .and(raw_gradient.lanes(Axis(0)))
                .for_each(|mut out, raw| {
                    let raw: [f64; NRAW] = std::array::from_fn(|k| raw[k]);
                    out.iter_mut()
                        .zip(jacobian.scene_gradient(&raw))
                        .for_each(|(o, d)| *o += d);
                });
        }
    }

    if image.iter().any(|x| !x.is_finite()) {
        return Err(RenderError::NumericalOverflow("rendered image"));
    }
    if let Some(gradient) = &gradient {
        if gradient.iter().any(|x: &f64| !x.is_finite()) {
            return Err(RenderError::NumericalOverflow("rendered gradient"));
        }
    }

    Ok(RenderedSource {
        source_id: source.id,
        image,
        gradient,
    })
}
