use forced_photometry::SersicTable;

use conv::ConvUtil;
use lazy_static::lazy_static;
use std::sync::Arc;

const NGAUSS: usize = 8;

/// Smooth mixture table over `n in [0.5, 6]`, `r in [0.1, 5]`
///
/// Components sit at logarithmically spaced radii. Node weights are a Gaussian in log-radius
/// centered at `r`, widened with `n` to mimic the extended wings of high-index profiles.
pub fn synthetic_sersic_table() -> SersicTable {
    let n_grid = vec![0.5, 1.0, 1.5, 2.0, 3.0, 4.0, 5.0, 6.0];
    let r_grid = vec![0.1, 0.25, 0.5, 1.0, 1.5, 2.0, 3.0, 5.0];
    let radii: Vec<f64> = (0..NGAUSS)
        .map(|k| 0.05 * f64::powf(2.0, k.value_as::<f64>().unwrap()))
        .collect();
    let log_radii: Vec<f64> = radii.iter().map(|rad| rad.ln()).collect();
    SersicTable::from_fn(n_grid, r_grid, radii, |n, r| {
        let width = 0.5 + 0.3 * n;
        let weights: Vec<f64> = log_radii
            .iter()
            .map(|&lr| f64::exp(-0.5 * ((lr - r.ln()) / width).powi(2)))
            .collect();
        let sum: f64 = weights.iter().sum();
        weights.into_iter().map(|w| w / sum).collect()
    })
    .unwrap()
}

lazy_static! {
    pub static ref SERSIC_TABLE: Arc<SersicTable> = Arc::new(synthetic_sersic_table());
}
