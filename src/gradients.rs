//! Analytic derivatives of image-plane Gaussians over the scene parameters
//!
//! For a source component with covariance $C$ transformed by $T = D R(\phi) S(q)$ and convolved
//! with a PSF component $P$:
//!
//! $$
//! \Sigma = T C T^T + P, \qquad F = \Sigma^{-1}, \qquad A = \psi a_i a_j \frac{\sqrt{\det F}}{2\pi}.
//! $$
//!
//! The precision derivative follows from the derivative of a matrix inverse,
//! $\partial F = -F (\partial\Sigma) F$, and the amplitude derivative from Jacobi's formula,
//! $\partial \det F = \det F \, \mathrm{tr}(\Sigma \, \partial F)$.

use crate::convolve::{ConvolvedPair, SourceGeometry, convert_to_gaussians, symmetrize};
use crate::error::RenderError;
use crate::gaussian::{GaussianJacobian, ImageGaussian, ImageGaussianGrid};
use crate::linalg::unique_entries;
use crate::source::SceneSource;
use crate::stamp::PostageStamp;

use nalgebra::{Matrix2, Vector2};

/// Attach a [GaussianJacobian] to every Gaussian of `grid`
///
/// `grid` must have been produced by [convert_to_gaussians] for the same source and stamp,
/// otherwise [RenderError::GridMismatch] is returned and `grid` is left untouched. Derivatives
/// already attached are recomputed, so calling this twice gives the same grid.
pub fn get_gaussian_gradients(
    source: &SceneSource,
    stamp: &PostageStamp,
    grid: &mut ImageGaussianGrid,
) -> Result<(), RenderError> {
    let geometry = SourceGeometry::new(source, stamp)?;
    let psf = stamp.psf();
    let psi = source.params().psi;
    let transform = &geometry.transform;
    let distortion = stamp.astrometry().distortion();

    let expected = (geometry.mixture.ngauss(), psf.ngauss());
    if grid.gaussians.dim() != expected {
        return Err(RenderError::WrongShape {
            what: "image Gaussian grid",
            expected: vec![expected.0, expected.1],
            actual: grid.gaussians.shape().to_vec(),
        });
    }
    if grid.source_id != source.id {
        return Err(RenderError::GridMismatch("source id"));
    }

    let mut jacobians = Vec::with_capacity(grid.gaussians.len());
    for ((i, j), gaussian) in grid.gaussians.indexed_iter() {
        let covariance = &geometry.mixture.covariances[i];
        let component = &psf.components()[j];
        let pair = ConvolvedPair::new(&geometry.pixel_covariance(i), &component.covariance)?;

        let dsigma_dq = covariance_derivative(&transform.t, covariance, &transform.dt_dq);
        let dsigma_dphi = covariance_derivative(&transform.t, covariance, &transform.dt_dphi);
        let df_dq = symmetrize(-pair.precision * dsigma_dq * pair.precision);
        let df_dphi = symmetrize(-pair.precision * dsigma_dphi * pair.precision);

        let a_i = geometry.mixture.amplitudes[i];
        let a_j = component.amplitude;
        let amp = psi * a_i * a_j * pair.norm;
        check_matches(gaussian, amp, &(geometry.center + component.mean), &pair.precision)?;
        // dA/dx = A / (2 det F) * d(det F)/dx = A / 2 * tr(Sigma dF/dx)
        let da_dq = 0.5 * amp * (pair.sigma * df_dq).trace();
        let da_dphi = 0.5 * amp * (pair.sigma * df_dphi).trace();
        let da_dpsi = a_i * a_j * pair.norm;
        let da_dn = psi * a_j * pair.norm * geometry.mixture.damplitude_dn[i];
        let da_dr = psi * a_j * pair.norm * geometry.mixture.damplitude_dr[i];

        let jacobian = GaussianJacobian::new(
            [da_dpsi, da_dq, da_dphi, da_dn, da_dr],
            distortion,
            unique_entries(&df_dq),
            unique_entries(&df_dphi),
        );
        if jacobian.0.iter().any(|x| !x.is_finite()) {
            return Err(RenderError::NumericalOverflow("image Gaussian derivatives"));
        }
        debug_assert!(pair.det_precision > 0.0);
        jacobians.push(jacobian);
    }
    for (gaussian, jacobian) in grid.gaussians.iter_mut().zip(jacobians) {
        gaussian.derivs = Some(jacobian);
    }
    Ok(())
}

/// Recomputed values are bitwise equal to the ones of [convert_to_gaussians] for the same input
fn check_matches(
    gaussian: &ImageGaussian,
    amp: f64,
    center: &Vector2<f64>,
    precision: &Matrix2<f64>,
) -> Result<(), RenderError> {
    if gaussian.amp != amp {
        return Err(RenderError::GridMismatch("amplitude"));
    }
    if gaussian.xcen != center.x || gaussian.ycen != center.y {
        return Err(RenderError::GridMismatch("center"));
    }
    if gaussian.precision() != *precision {
        return Err(RenderError::GridMismatch("precision matrix"));
    }
    Ok(())
}

/// `T C dT^T + dT C T^T`
fn covariance_derivative(t: &Matrix2<f64>, c: &Matrix2<f64>, dt: &Matrix2<f64>) -> Matrix2<f64> {
    let half = t * c * dt.transpose();
    half + half.transpose()
}

/// [convert_to_gaussians] followed by [get_gaussian_gradients]
pub fn convert_to_gaussians_with_gradients(
    source: &SceneSource,
    stamp: &PostageStamp,
) -> Result<ImageGaussianGrid, RenderError> {
    let mut grid = convert_to_gaussians(source, stamp)?;
    get_gaussian_gradients(source, stamp, &mut grid)?;
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::astrometry::Astrometry;
    use crate::gaussian::deriv_index;
    use crate::profile::{SersicProfile, SersicTable};
    use crate::psf::PointSpreadFunction;
    use crate::source::{SceneParameter, SourceParameters};

    use approx::assert_relative_eq;

    fn table() -> SersicTable {
        SersicTable::from_fn(
            vec![1.0, 2.0, 3.0],
            vec![0.5, 1.5, 2.5],
            vec![0.3, 1.0, 2.5],
            |n, r| {
                let w = [1.0 + n, r * r, 0.5 * n * r];
                let sum: f64 = w.iter().sum();
                w.iter().map(|x| x / sum).collect()
            },
        )
        .unwrap()
    }

    fn stamp() -> PostageStamp {
        let astrometry = Astrometry::new(
            Matrix2::new(1.3, 0.2, -0.1, 1.1),
            Vector2::new(0.0, 0.0),
            Vector2::new(10.0, 10.0),
        )
        .unwrap();
        let psf = PointSpreadFunction::new(
            &[0.7, 0.3],
            &[[0.0, 0.0], [0.2, -0.1]],
            &[[[0.8, 0.1], [0.1, 0.9]], [[2.5, -0.3], [-0.3, 2.0]]],
        )
        .unwrap();
        PostageStamp::new(20, 20, astrometry, psf)
    }

    fn galaxy(params: SourceParameters) -> SceneSource {
        SceneSource::galaxy(0, params, SersicProfile::new(table()).into())
    }

    fn base_params() -> SourceParameters {
        SourceParameters {
            psi: 30.0,
            ra: 0.4,
            dec: -0.3,
            q: 0.6,
            phi: 0.7,
            n: 1.7,
            r: 1.2,
        }
    }

    /// Centered differences of amplitude and precision over one scene parameter
    fn numerical(param: SceneParameter) -> Vec<[f64; 4]> {
        const H: f64 = 1e-6;
        let stamp = stamp();
        let eval = |sign: f64| {
            let mut params = base_params();
            params.set(param, params.get(param) + sign * H);
            convert_to_gaussians(&galaxy(params), &stamp).unwrap()
        };
        let (plus, minus) = (eval(1.0), eval(-1.0));
        plus.iter()
            .zip(minus.iter())
            .map(|(p, m)| {
                [
                    (p.amp - m.amp) / (2.0 * H),
                    (p.fxx - m.fxx) / (2.0 * H),
                    (p.fxy - m.fxy) / (2.0 * H),
                    (p.fyy - m.fyy) / (2.0 * H),
                ]
            })
            .collect()
    }

    #[test]
    fn amplitude_and_precision_derivatives() {
        let grid = convert_to_gaussians_with_gradients(&galaxy(base_params()), &stamp()).unwrap();
        let checks = [
            (SceneParameter::Flux, deriv_index::DA_DPSI, None),
            (SceneParameter::AxisRatio, deriv_index::DA_DQ, Some(deriv_index::DF_DQ)),
            (SceneParameter::PositionAngle, deriv_index::DA_DPHI, Some(deriv_index::DF_DPHI)),
            (SceneParameter::SersicIndex, deriv_index::DA_DN, None),
            (SceneParameter::HalfLightRadius, deriv_index::DA_DR, None),
        ];
        for (param, da_index, df_index) in checks {
            let desired = numerical(param);
            for (g, desired) in grid.iter().zip(desired) {
                let jac = g.derivs.unwrap().0;
                assert_relative_eq!(jac[da_index], desired[0], max_relative = 1e-5, epsilon = 1e-7);
                if let Some(df) = df_index {
                    for k in 0..3 {
                        assert_relative_eq!(
                            jac[df + k],
                            desired[1 + k],
                            max_relative = 1e-5,
                            epsilon = 1e-7
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn point_source_has_no_shape_derivatives() {
        let stamp = stamp();
        let source = SceneSource::point(0, 10.0, 0.1, 0.2);
        let grid = convert_to_gaussians_with_gradients(&source, &stamp).unwrap();
        for g in grid.iter() {
            let jac = g.derivs.unwrap().0;
            for index in [
                deriv_index::DA_DQ,
                deriv_index::DA_DPHI,
                deriv_index::DA_DN,
                deriv_index::DA_DR,
            ] {
                assert_eq!(jac[index], 0.0);
            }
            assert!(jac[deriv_index::DF_DQ..].iter().all(|&x| x == 0.0));
            assert_eq!(g.derivs.unwrap().distortion(), *stamp.astrometry().distortion());
        }
    }

    #[test]
    fn grid_of_another_source() {
        let stamp = stamp();
        let source = galaxy(base_params());
        let mut grid = convert_to_gaussians(&source, &stamp).unwrap();
        let other = SceneSource::galaxy(7, base_params(), SersicProfile::new(table()).into());
        assert_eq!(
            get_gaussian_gradients(&other, &stamp, &mut grid),
            Err(RenderError::GridMismatch("source id"))
        );

        let mut params = base_params();
        params.psi *= 2.0;
        assert_eq!(
            get_gaussian_gradients(&galaxy(params), &stamp, &mut grid),
            Err(RenderError::GridMismatch("amplitude"))
        );
        params = base_params();
        params.ra += 0.1;
        assert_eq!(
            get_gaussian_gradients(&galaxy(params), &stamp, &mut grid),
            Err(RenderError::GridMismatch("center"))
        );
        params = base_params();
        params.q = 0.5;
        assert!(matches!(
            get_gaussian_gradients(&galaxy(params), &stamp, &mut grid),
            Err(RenderError::GridMismatch(_))
        ));
        // rejected grids are left untouched
        assert!(grid.iter().all(|g| g.derivs.is_none()));
    }

    #[test]
    fn attaching_twice_is_idempotent() {
        let stamp = stamp();
        let source = galaxy(base_params());
        let mut grid = convert_to_gaussians_with_gradients(&source, &stamp).unwrap();
        let first = grid.clone();
        get_gaussian_gradients(&source, &stamp, &mut grid).unwrap();
        assert_eq!(grid, first);
    }

    #[test]
    fn derivative_overflow() {
        // Strongly elongated source on a fine pixel scale: dA/dq is several times A
        let astrometry = Astrometry::new(
            Matrix2::new(0.01, 0.0, 0.0, 0.01),
            Vector2::zeros(),
            Vector2::new(10.0, 10.0),
        )
        .unwrap();
        let stamp = PostageStamp::new(20, 20, astrometry, PointSpreadFunction::gaussian(0.01).unwrap());
        let params = SourceParameters {
            psi: 1.0,
            ra: 0.0,
            dec: 0.0,
            q: 0.1,
            phi: 0.0,
            n: 2.0,
            r: 1.5,
        };
        let max_amp = convert_to_gaussians(&galaxy(params), &stamp)
            .unwrap()
            .iter()
            .map(|g| g.amp)
            .fold(0.0, f64::max);
        let params = SourceParameters {
            psi: f64::MAX / (2.0 * max_amp),
            ..params
        };
        let source = galaxy(params);
        let mut grid = convert_to_gaussians(&source, &stamp).unwrap();
        assert!(grid.iter().all(|g| g.amp.is_finite()));
        assert_eq!(
            get_gaussian_gradients(&source, &stamp, &mut grid),
            Err(RenderError::NumericalOverflow("image Gaussian derivatives"))
        );
    }

    #[test]
    fn out_of_table_domain() {
        let mut params = base_params();
        params.n = 5.0;
        let mut grid = convert_to_gaussians(&galaxy(base_params()), &stamp()).unwrap();
        assert!(matches!(
            get_gaussian_gradients(&galaxy(params), &stamp(), &mut grid),
            Err(RenderError::OutOfTableDomain { name: "n", .. })
        ));
    }
}
