use forced_photometry::ndarray::{Array3, Axis};

use itertools::Itertools;

/// Maximum absolute difference of each gradient slice, relative to the slice's largest value
pub fn gradient_mismatch(analytic: &Array3<f64>, numerical: &Array3<f64>) -> Vec<f64> {
    assert_eq!(analytic.dim(), numerical.dim());
    analytic
        .axis_iter(Axis(0))
        .zip(numerical.axis_iter(Axis(0)))
        .map(|(a, n)| {
            let scale = n.iter().map(|x| x.abs()).fold(0.0, f64::max);
            let diff = a
                .iter()
                .zip(n.iter())
                .map(|(x, y)| (x - y).abs())
                .fold(0.0, f64::max);
            if scale > 0.0 { diff / scale } else { diff }
        })
        .collect()
}

pub fn assert_gradients_close(
    analytic: &Array3<f64>,
    numerical: &Array3<f64>,
    tolerance: f64,
    names: &[&str],
) {
    let mismatch = gradient_mismatch(analytic, numerical);
    let failed = mismatch
        .iter()
        .zip(names)
        .filter(|&(&m, _)| !(m <= tolerance))
        .map(|(m, name)| format!("{name}: {m:.3e}"))
        .join(", ");
    assert!(
        failed.is_empty(),
        "gradients differ by more than {tolerance:e}: {failed}"
    );
}
