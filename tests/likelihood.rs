use forced_photometry::{
    RenderError, Scene, SceneParameter, SceneSource, SersicProfile, SourceParameters,
    StampLikelihood,
};
use forced_photometry_test_util::{SERSIC_TABLE, centered_stamp, mock_stamp, six_component_psf};

use approx::assert_relative_eq;
use rand::prelude::*;

const NOISE_SIGMA: f64 = 0.5;

fn truth() -> Scene {
    let params = SourceParameters {
        psi: 400.0,
        ra: -0.3,
        dec: 0.2,
        q: 0.8,
        phi: 1.1,
        n: 1.5,
        r: 1.2,
    };
    Scene::new(vec![
        SceneSource::galaxy(0, params, SersicProfile::new(SERSIC_TABLE.clone()).into()),
        SceneSource::point(1, 120.0, 9.0, -10.0),
    ])
}

fn likelihood(seed: u64) -> StampLikelihood {
    let mut rng = StdRng::seed_from_u64(seed);
    let scene = truth();
    let stamp = mock_stamp(
        &scene,
        centered_stamp(50, 50, six_component_psf()),
        NOISE_SIGMA,
        &mut rng,
    );
    StampLikelihood::new(scene, stamp)
}

#[test]
fn chi2_of_truth_follows_noise() {
    let likelihood = likelihood(0);
    let theta = likelihood.scene.free_values().to_vec();
    let value = likelihood.negative_ln_like_nograd(&theta).unwrap();
    // -lnlike = chi2 / 2 and E[chi2] = npix
    let npix = likelihood.stamp.npix() as f64;
    assert_relative_eq!(value, 0.5 * npix, max_relative = 0.1);
}

#[test]
fn truth_is_better_than_perturbed() {
    let likelihood = likelihood(1);
    let truth = likelihood.scene.free_values().to_vec();
    let at_truth = likelihood.negative_ln_like_nograd(&truth).unwrap();
    for k in 0..truth.len() {
        let mut theta = truth.clone();
        theta[k] *= 1.3;
        theta[k] += 0.3;
        let perturbed = likelihood.negative_ln_like_nograd(&theta).unwrap();
        assert!(
            perturbed > at_truth,
            "parameter {k}: {perturbed} <= {at_truth}"
        );
    }
}

#[test]
fn gradient_matches_finite_differences() {
    const H: f64 = 1e-6;
    let likelihood = likelihood(2);
    let mut theta = likelihood.scene.free_values().to_vec();
    // move away from the optimum so that the gradient is not dominated by noise
    theta.iter_mut().for_each(|x| *x = 1.05 * *x + 0.02);

    let (value, grad) = likelihood.negative_ln_like(&theta).unwrap();
    assert_relative_eq!(
        value,
        likelihood.negative_ln_like_nograd(&theta).unwrap(),
        max_relative = 1e-12
    );
    for k in 0..theta.len() {
        let mut plus = theta.clone();
        plus[k] += H;
        let mut minus = theta.clone();
        minus[k] -= H;
        let desired = (likelihood.negative_ln_like_nograd(&plus).unwrap()
            - likelihood.negative_ln_like_nograd(&minus).unwrap())
            / (2.0 * H);
        assert_relative_eq!(grad[k], desired, max_relative = 1e-4, epsilon = 1e-3);
    }
}

#[test]
fn first_order_and_second_order_differ() {
    let likelihood = likelihood(3);
    let theta = likelihood.scene.free_values().to_vec();
    let second = likelihood.negative_ln_like_nograd(&theta).unwrap();
    let first = likelihood
        .with_second_order(false)
        .negative_ln_like_nograd(&theta)
        .unwrap();
    assert!(first > second);
}

#[test]
fn out_of_table_domain_is_reported() {
    let likelihood = likelihood(4);
    let mut theta = likelihood.scene.free_values().to_vec();
    let free = likelihood.scene.free_parameters();
    let n_index = free
        .iter()
        .position(|p| p.param == SceneParameter::SersicIndex)
        .unwrap();
    theta[n_index] = 100.0;
    assert!(matches!(
        likelihood.negative_ln_like(&theta),
        Err(RenderError::OutOfTableDomain { name: "n", .. })
    ));
}

#[test]
fn non_positive_axis_ratio_is_reported() {
    let likelihood = likelihood(5);
    let mut theta = likelihood.scene.free_values().to_vec();
    let q_index = likelihood
        .scene
        .free_parameters()
        .iter()
        .position(|p| p.param == SceneParameter::AxisRatio)
        .unwrap();
    theta[q_index] = 0.0;
    assert!(matches!(
        likelihood.negative_ln_like(&theta),
        Err(RenderError::InvalidParameter { name: "q", .. })
    ));
}

#[test]
fn overflowing_flux_is_reported() {
    let likelihood = likelihood(6);
    let mut theta = likelihood.scene.free_values().to_vec();
    let flux_index = likelihood
        .scene
        .free_parameters()
        .iter()
        .position(|p| p.source == 1 && p.param == SceneParameter::Flux)
        .unwrap();
    theta[flux_index] = 1e200;
    assert!(matches!(
        likelihood.negative_ln_like(&theta),
        Err(RenderError::NumericalOverflow(_))
    ));
    assert!(matches!(
        likelihood.negative_ln_like_nograd(&theta),
        Err(RenderError::NumericalOverflow(_))
    ));
}
