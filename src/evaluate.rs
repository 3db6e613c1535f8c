//! Per-pixel evaluation of an image-plane Gaussian and its raw-parameter gradient

use crate::gaussian::{ImageGaussian, NRAW, raw_index};
use crate::render::RenderOptions;

use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};

/// Counts of a single Gaussian at pixel `(x, y)`, and the gradient over
/// `[amp, xcen, ycen, fxx, fyy, fxy]` if `options.compute_deriv` is set
///
/// The Gaussian is sampled at the pixel center. With `options.second_order` the value is
/// multiplied by `H = 1 + (vx² + vy² - fxx - fyy) / 24`, the second-order Taylor correction
/// for the integral over the unit pixel, where `v = F (x - xcen, y - ycen)`.
pub fn compute_gaussian(
    g: &ImageGaussian,
    x: f64,
    y: f64,
    options: &RenderOptions,
) -> (f64, Option<[f64; NRAW]>) {
    let dx = x - g.xcen;
    let dy = y - g.ycen;
    let vx = g.fxx * dx + g.fxy * dy;
    let vy = g.fyy * dy + g.fxy * dx;
    let gp = f64::exp(-0.5 * (dx * vx + dy * vy));
    let h = if options.second_order {
        1.0 + (vx * vx + vy * vy - g.fxx - g.fyy) / 24.0
    } else {
        1.0
    };
    let c_h = g.amp * gp;
    let counts = c_h * h;
    if !options.compute_deriv {
        return (counts, None);
    }

    let mut grad = [0.0; NRAW];
    grad[raw_index::AMP] = gp * h;
    grad[raw_index::XCEN] = counts * vx;
    grad[raw_index::YCEN] = counts * vy;
    grad[raw_index::FXX] = -0.5 * counts * dx * dx;
    grad[raw_index::FYY] = -0.5 * counts * dy * dy;
    grad[raw_index::FXY] = -counts * dx * dy;
    if options.second_order {
        let k = c_h / 24.0;
        grad[raw_index::XCEN] -= k * 2.0 * (g.fxx * vx + g.fxy * vy);
        grad[raw_index::YCEN] -= k * 2.0 * (g.fyy * vy + g.fxy * vx);
        grad[raw_index::FXX] += k * (2.0 * dx * vx - 1.0);
        grad[raw_index::FYY] += k * (2.0 * dy * vy - 1.0);
        grad[raw_index::FXY] += k * 2.0 * (vx * dy + vy * dx);
    }
    (counts, Some(grad))
}

/// [compute_gaussian] over arrays of pixel coordinates
///
/// The gradient, if requested, has shape `(NRAW, rows, cols)`.
pub fn compute_gaussian_array(
    g: &ImageGaussian,
    xpix: ArrayView2<f64>,
    ypix: ArrayView2<f64>,
    options: &RenderOptions,
) -> (Array2<f64>, Option<Array3<f64>>) {
    let dim = xpix.dim();
    let mut counts = Array2::zeros(dim);
    if !options.compute_deriv {
        Zip::from(&mut counts)
            .and(&xpix)
            .and(&ypix)
            .for_each(|c, &x, &y| *c = compute_gaussian(g, x, y, options).0);
        return (counts, None);
    }

    let mut gradient = Array3::zeros((NRAW, dim.0, dim.1));
    Zip::from(&mut counts)
        .and(gradient.lanes_mut(Axis(0)))
        .and(&xpix)
        .and(&ypix)
        .for_each(|c, mut lane, &x, &y| {
            let (value, grad) = compute_gaussian(g, x, y, options);
            *c = value;
            if let Some(grad) = grad {
                lane.iter_mut().zip(grad).for_each(|(l, dg)| *l = dg);
            }
        });
    (counts, Some(gradient))
}
