use forced_photometry::nalgebra::{Matrix2, Vector2};
use forced_photometry::ndarray::Axis;
use forced_photometry::{
    Astrometry, PointSpreadFunction, PostageStamp, PsfLibrary, RenderOptions, Scene,
    SceneParameter, SceneSource, SersicProfile, SourceParameters, convert_to_gaussians,
    numerical_image_gradients, render_source,
};
use forced_photometry_test_util::{
    PSF_LIBRARY, SERSIC_TABLE, assert_gradients_close, centered_stamp, six_component_psf,
};

use approx::assert_relative_eq;
use std::f64::consts::PI;

fn galaxy(id: usize, params: SourceParameters) -> SceneSource {
    SceneSource::galaxy(id, params, SersicProfile::new(SERSIC_TABLE.clone()).into())
}

fn galaxy_params() -> SourceParameters {
    SourceParameters {
        psi: 300.0,
        ra: 0.4,
        dec: -0.7,
        q: 0.7,
        phi: 0.45,
        n: 2.5,
        r: 1.8,
    }
}

fn distorted_stamp(nx: usize, ny: usize, psf: PointSpreadFunction) -> PostageStamp {
    let astrometry = Astrometry::new(
        Matrix2::new(1.1, 0.2, -0.15, 0.95),
        Vector2::new(0.1, 0.2),
        Vector2::new(0.5 * nx as f64, 0.5 * ny as f64),
    )
    .unwrap();
    PostageStamp::new(nx, ny, astrometry, psf)
}

#[test]
fn six_component_point_source_on_50x50_stamp() {
    let psf = six_component_psf();
    let stamp = centered_stamp(50, 50, psf.clone());
    let source = SceneSource::point(0, 100.0, 0.0, 0.0);
    let options = RenderOptions {
        second_order: false,
        compute_deriv: false,
    };
    let image = render_source(&source, &stamp, &options).unwrap().image;

    // Peak density of every source-PSF pair: point covariance is the identity
    let expected_peak: f64 = psf
        .components()
        .iter()
        .map(|c| {
            let precision = (Matrix2::identity() + c.covariance).try_inverse().unwrap();
            100.0 * c.amplitude * precision.determinant().sqrt() / (2.0 * PI)
        })
        .sum();
    let peak = image.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(image[(25, 25)], peak);
    assert_relative_eq!(peak, expected_peak, max_relative = 0.01);
    assert_relative_eq!(image.sum(), 100.0, max_relative = 0.01);
}

#[test]
fn point_source_flux_normalization_with_identity_psf() {
    let stamp = centered_stamp(40, 40, PointSpreadFunction::identity());
    let source = SceneSource::point(0, 42.0, 0.3, -0.4);
    for second_order in [false, true] {
        let options = RenderOptions {
            second_order,
            compute_deriv: false,
        };
        let image = render_source(&source, &stamp, &options).unwrap().image;
        assert_relative_eq!(image.sum(), 42.0, max_relative = 1e-4);
    }
}

#[test]
fn galaxy_flux_normalization() {
    let stamp = centered_stamp(90, 90, PointSpreadFunction::gaussian(1.0).unwrap());
    let image = render_source(
        &galaxy(0, galaxy_params()),
        &stamp,
        &RenderOptions::default().without_deriv(),
    )
    .unwrap()
    .image;
    assert_relative_eq!(image.sum(), 300.0, max_relative = 1e-3);
}

#[test]
fn zero_rotation_unit_axis_ratio_convolution() {
    let stamp = distorted_stamp(30, 30, (*six_component_psf()).clone());
    let params = SourceParameters {
        q: 1.0,
        phi: 0.0,
        ..galaxy_params()
    };
    let source = galaxy(0, params);
    let grid = convert_to_gaussians(&source, &stamp).unwrap();
    let mixture = SERSIC_TABLE.lookup(params.n, params.r).unwrap();
    let d = stamp.astrometry().distortion();
    for ((i, j), g) in grid.gaussians.indexed_iter() {
        let sigma = d * mixture.covariances[i] * d.transpose() + stamp.psf().components()[j].covariance;
        assert_relative_eq!(
            g.precision().try_inverse().unwrap(),
            sigma,
            max_relative = 1e-10
        );
    }
}

fn check_scene_gradient(scene: &Scene, stamp: &PostageStamp, second_order: bool) {
    let options = RenderOptions {
        second_order,
        compute_deriv: true,
    };
    let analytic = scene.render(stamp, &options).unwrap().gradient.unwrap();
    let theta = scene.free_values().to_vec();
    let numerical = numerical_image_gradients(scene, stamp, &theta, 1e-6, &options).unwrap();
    let names: Vec<_> = scene
        .free_parameters()
        .iter()
        .map(|p| format!("source {} {}", p.source, p.param.name()))
        .collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    assert_gradients_close(&analytic, &numerical, 1e-4, &names);
}

#[test]
fn galaxy_gradient_matches_finite_differences() {
    let scene = Scene::new(vec![galaxy(0, galaxy_params())]);
    assert_eq!(scene.n_free(), 7);
    let stamp = distorted_stamp(40, 36, (*six_component_psf()).clone());
    check_scene_gradient(&scene, &stamp, false);
    check_scene_gradient(&scene, &stamp, true);
}

#[test]
fn galaxy_gradient_at_table_node() {
    // n = 2 and r = 1.5 are nodes of the synthetic table
    let params = SourceParameters {
        n: 2.0,
        r: 1.5,
        ..galaxy_params()
    };
    let scene = Scene::new(vec![galaxy(0, params)]);
    let stamp = distorted_stamp(40, 36, (*six_component_psf()).clone());
    check_scene_gradient(&scene, &stamp, true);
}

#[test]
fn mixed_scene_gradient_matches_finite_differences() {
    let scene = Scene::new(vec![
        galaxy(0, galaxy_params()).with_fixed(SceneParameter::SersicIndex, true),
        SceneSource::point(1, 80.0, -6.0, 5.0),
        SceneSource::point(2, 30.0, 7.0, 8.0).with_fixed(SceneParameter::Flux, true),
    ]);
    assert_eq!(scene.n_free(), 6 + 3 + 2);
    let stamp = distorted_stamp(40, 40, PointSpreadFunction::gaussian(1.4).unwrap());
    check_scene_gradient(&scene, &stamp, true);
}

#[test]
fn point_source_gradient_has_no_shape_terms() {
    let stamp = centered_stamp(30, 30, six_component_psf());
    let rendered = render_source(
        &SceneSource::point(0, 10.0, 1.0, 1.0),
        &stamp,
        &RenderOptions::default(),
    )
    .unwrap();
    let gradient = rendered.gradient.unwrap();
    for param in SceneParameter::ALL.into_iter().filter(|p| p.is_shape()) {
        assert!(
            gradient
                .index_axis(Axis(0), param.index())
                .iter()
                .all(|&x| x == 0.0)
        );
    }
}

#[test]
fn psf_artifact_global_library() {
    assert_eq!(PSF_LIBRARY.sizes(), vec![1, 6]);
    let installed = PSF_LIBRARY.clone().install().unwrap();
    assert_eq!(PsfLibrary::global(), Some(installed));
    let psf = installed.mixture(6).unwrap();
    assert_relative_eq!(psf.amplitudes().sum::<f64>(), 1.0, epsilon = 1e-12);
    assert!(installed.mixture(3).is_err());
    assert!(PSF_LIBRARY.clone().install().is_err());
}
