use crate::error::{RenderError, SersicTableError};
use crate::profile::{ProfileMixture, ProfileTrait};

use itertools::iproduct;
use nalgebra::Matrix2;
use ndarray::{Array3, ArrayView1, s};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tolerance of the per-node amplitude normalization
const NORMALIZATION_TOLERANCE: f64 = 1e-6;

/// Precomputed Gaussian-mixture approximation of Sersic profiles
///
/// Amplitudes of `radii.len()` isotropic components are tabulated on a rectangular
/// `n_grid × r_grid` grid of Sersic index and half-light radius. Queries use the tensor product
/// of cubic Hermite interpolants along both axes, which is continuously differentiable across grid
/// nodes, and the returned derivatives are those of the interpolant. Every node must be normalized,
/// so interpolated amplitudes always sum to unity and their derivatives sum to zero; interpolated
/// amplitudes may overshoot slightly below zero between strongly varying nodes.
/// Queries outside of the grid are rejected, nothing is extrapolated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SersicTableRecord", into = "SersicTableRecord")]
pub struct SersicTable {
    n_grid: Vec<f64>,
    r_grid: Vec<f64>,
    radii: Vec<f64>,
    // (n, r, component)
    amplitudes: Array3<f64>,
}

impl SersicTable {
    pub fn new(
        n_grid: Vec<f64>,
        r_grid: Vec<f64>,
        radii: Vec<f64>,
        amplitudes: Array3<f64>,
    ) -> Result<Self, SersicTableError> {
        check_grid(&n_grid, "n")?;
        check_grid(&r_grid, "r")?;
        if radii.is_empty() || radii.iter().any(|&x| !(x.is_finite() && x > 0.0)) {
            return Err(SersicTableError::InvalidRadii);
        }
        let expected = [n_grid.len(), r_grid.len(), radii.len()];
        if amplitudes.shape() != expected {
            return Err(SersicTableError::WrongShape {
                expected,
                actual: amplitudes.shape().to_vec(),
            });
        }
        for (i, j) in iproduct!(0..n_grid.len(), 0..r_grid.len()) {
            let node = amplitudes.slice(s![i, j, ..]);
            let sum = node.sum();
            if (sum - 1.0).abs() > NORMALIZATION_TOLERANCE
                || node.iter().any(|&a| !(a.is_finite() && a >= 0.0))
            {
                return Err(SersicTableError::NotNormalized {
                    n: n_grid[i],
                    r: r_grid[j],
                    sum,
                });
            }
        }
        Ok(Self {
            n_grid,
            r_grid,
            radii,
            amplitudes,
        })
    }

    /// Tabulate `f(n, r)`, which must return `radii.len()` normalized amplitudes
    pub fn from_fn<F>(
        n_grid: Vec<f64>,
        r_grid: Vec<f64>,
        radii: Vec<f64>,
        f: F,
    ) -> Result<Self, SersicTableError>
    where
        F: Fn(f64, f64) -> Vec<f64>,
    {
        let shape = [n_grid.len(), r_grid.len(), radii.len()];
        let mut amplitudes = Array3::zeros(shape);
        for (i, &n) in n_grid.iter().enumerate() {
            for (j, &r) in r_grid.iter().enumerate() {
                let node = f(n, r);
                if node.len() != radii.len() {
                    return Err(SersicTableError::WrongShape {
                        expected: shape,
                        actual: vec![n_grid.len(), r_grid.len(), node.len()],
                    });
                }
                amplitudes
                    .slice_mut(s![i, j, ..])
                    .assign(&ArrayView1::from(&node));
            }
        }
        Self::new(n_grid, r_grid, radii, amplitudes)
    }

    #[inline]
    pub fn ngauss(&self) -> usize {
        self.radii.len()
    }

    #[inline]
    pub fn radii(&self) -> &[f64] {
        &self.radii
    }

    pub fn n_domain(&self) -> (f64, f64) {
        domain(&self.n_grid)
    }

    pub fn r_domain(&self) -> (f64, f64) {
        domain(&self.r_grid)
    }

    /// Interpolated amplitudes and their derivatives over `n` and `r`
    pub fn lookup(&self, n: f64, r: f64) -> Result<ProfileMixture, RenderError> {
        let n_weights = HermiteWeights::new(&self.n_grid, n, "n")?;
        let r_weights = HermiteWeights::new(&self.r_grid, r, "r")?;

        let ngauss = self.ngauss();
        let mut mixture = ProfileMixture {
            amplitudes: vec![0.0; ngauss],
            damplitude_dn: vec![0.0; ngauss],
            damplitude_dr: vec![0.0; ngauss],
            covariances: self.covariances(),
        };
        for (&(i, wn, dwn), &(j, wr, dwr)) in
            iproduct!(n_weights.nonzero.iter(), r_weights.nonzero.iter())
        {
            let node = self.amplitudes.slice(s![i, j, ..]);
            for (k, &a) in node.iter().enumerate() {
                mixture.amplitudes[k] += wn * wr * a;
                mixture.damplitude_dn[k] += dwn * wr * a;
                mixture.damplitude_dr[k] += wn * dwr * a;
            }
        }
        Ok(mixture)
    }

    /// Isotropic component covariances `radii[k]^2 I`, they don't depend on `(n, r)`
    pub fn covariances(&self) -> Vec<Matrix2<f64>> {
        self.radii
            .iter()
            .map(|&radius| Matrix2::identity() * (radius * radius))
            .collect()
    }
}

fn check_grid(grid: &[f64], name: &'static str) -> Result<(), SersicTableError> {
    if grid.len() < 2 {
        return Err(SersicTableError::ShortGrid(name));
    }
    if grid.iter().any(|x| !x.is_finite()) || grid.windows(2).any(|w| w[0] >= w[1]) {
        return Err(SersicTableError::UnsortedGrid(name));
    }
    Ok(())
}

fn domain(grid: &[f64]) -> (f64, f64) {
    (grid[0], grid[grid.len() - 1])
}

/// Node weights of the cubic Hermite interpolant and of its derivative at a point
///
/// Node slopes are the three-point finite-difference estimates (one-sided at the grid ends), so
/// the interpolant is continuously differentiable and linear in the node values. Constant node
/// values are reproduced exactly: weights sum to unity and derivative weights sum to zero.
struct HermiteWeights {
    // (node index, weight, derivative weight)
    nonzero: Vec<(usize, f64, f64)>,
}

impl HermiteWeights {
    fn new(grid: &[f64], x: f64, name: &'static str) -> Result<Self, RenderError> {
        let (i, t, h) = locate(grid, x, name)?;
        let (t2, t3) = (t * t, t * t * t);
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h10 = t3 - 2.0 * t2 + t;
        let h11 = t3 - t2;
        let dh00 = 6.0 * t2 - 6.0 * t;
        let dh01 = -dh00;
        let dh10 = 3.0 * t2 - 4.0 * t + 1.0;
        let dh11 = 3.0 * t2 - 2.0 * t;

        let mut nonzero = vec![(i, h00, dh00 / h), (i + 1, h01, dh01 / h)];
        // d(h * h1x(t))/dx = h1x'(t)
        for (node, w, dw) in [(i, h * h10, dh10), (i + 1, h * h11, dh11)] {
            nonzero.extend(
                slope_weights(grid, node)
                    .into_iter()
                    .map(|(j, s)| (j, w * s, dw * s)),
            );
        }
        Ok(Self { nonzero })
    }
}

/// Weights of node values in the slope estimate at node `k`
fn slope_weights(grid: &[f64], k: usize) -> Vec<(usize, f64)> {
    let last = grid.len() - 1;
    if k == 0 || k == last {
        let i = k.min(last - 1);
        let h = grid[i + 1] - grid[i];
        return vec![(i, -h.recip()), (i + 1, h.recip())];
    }
    let hl = grid[k] - grid[k - 1];
    let hr = grid[k + 1] - grid[k];
    let sum = hl + hr;
    vec![
        (k - 1, -hr / (hl * sum)),
        (k, (hr / hl - hl / hr) / sum),
        (k + 1, hl / (hr * sum)),
    ]
}

/// Cell index, relative position inside the cell and the cell width
fn locate(grid: &[f64], x: f64, name: &'static str) -> Result<(usize, f64, f64), RenderError> {
    let (min, max) = domain(grid);
    if !(min..=max).contains(&x) {
        return Err(RenderError::OutOfTableDomain {
            name,
            value: x,
            min,
            max,
        });
    }
    let i = grid
        .partition_point(|&node| node <= x)
        .saturating_sub(1)
        .min(grid.len() - 2);
    let h = grid[i + 1] - grid[i];
    Ok((i, (x - grid[i]) / h, h))
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename = "SersicTable")]
struct SersicTableRecord {
    n_grid: Vec<f64>,
    r_grid: Vec<f64>,
    radii: Vec<f64>,
    amplitudes: Vec<Vec<Vec<f64>>>,
}

impl From<SersicTable> for SersicTableRecord {
    fn from(table: SersicTable) -> Self {
        let amplitudes = table
            .amplitudes
            .outer_iter()
            .map(|by_r| by_r.outer_iter().map(|node| node.to_vec()).collect())
            .collect();
        Self {
            n_grid: table.n_grid,
            r_grid: table.r_grid,
            radii: table.radii,
            amplitudes,
        }
    }
}

impl TryFrom<SersicTableRecord> for SersicTable {
    type Error = SersicTableError;

    fn try_from(record: SersicTableRecord) -> Result<Self, Self::Error> {
        let expected = [record.n_grid.len(), record.r_grid.len(), record.radii.len()];
        let wrong_shape = |actual: Vec<usize>| SersicTableError::WrongShape { expected, actual };
        if record.amplitudes.len() != expected[0] {
            return Err(wrong_shape(vec![record.amplitudes.len()]));
        }
        let mut flat = Vec::with_capacity(expected.iter().product());
        for by_r in record.amplitudes {
            if by_r.len() != expected[1] {
                return Err(wrong_shape(vec![expected[0], by_r.len()]));
            }
            for node in by_r {
                if node.len() != expected[2] {
                    return Err(wrong_shape(vec![expected[0], expected[1], node.len()]));
                }
                flat.extend(node);
            }
        }
        let amplitudes = Array3::from_shape_vec(expected, flat)
            .map_err(|_| wrong_shape(expected.to_vec()))?;
        Self::new(record.n_grid, record.r_grid, record.radii, amplitudes)
    }
}

impl JsonSchema for SersicTable {
    fn is_referenceable() -> bool {
        false
    }

    fn schema_name() -> String {
        SersicTableRecord::schema_name()
    }

    fn json_schema(r#gen: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        SersicTableRecord::json_schema(r#gen)
    }
}

/// Sersic galaxy profile backed by a shared [SersicTable]
///
/// The table is serialized inline, so every galaxy of a serialized [Scene](crate::Scene) carries
/// its own copy and deserialized galaxies own separate tables. Use
/// [Scene::share_profile_tables](crate::Scene::share_profile_tables) to share them again.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SersicProfile {
    table: Arc<SersicTable>,
}

impl SersicProfile {
    pub fn new(table: impl Into<Arc<SersicTable>>) -> Self {
        Self {
            table: table.into(),
        }
    }

    #[inline]
    pub fn table(&self) -> &SersicTable {
        &self.table
    }

    #[inline]
    pub fn shared_table(&self) -> &Arc<SersicTable> {
        &self.table
    }

    pub(crate) fn set_shared_table(&mut self, table: Arc<SersicTable>) {
        self.table = table;
    }
}

impl ProfileTrait for SersicProfile {
    fn ngauss(&self) -> usize {
        self.table.ngauss()
    }

    fn has_shape(&self) -> bool {
        true
    }

    fn mixture(&self, n: f64, r: f64) -> Result<ProfileMixture, RenderError> {
        self.table.lookup(n, r)
    }
}
