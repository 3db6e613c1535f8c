//! Gaussian-mixture point-spread function and its serialized artifacts

use crate::error::PsfError;

use log::debug;
use nalgebra::{Matrix2, Vector2};
use once_cell::sync::OnceCell;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

/// Maximum allowed deviation of the mixture amplitude sum from unity
pub const AMPLITUDE_SUM_TOLERANCE: f64 = 1e-3;

/// One component of a [PointSpreadFunction], in pixel space
#[derive(Clone, Debug, PartialEq)]
pub struct PsfComponent {
    pub amplitude: f64,
    pub mean: Vector2<f64>,
    pub covariance: Matrix2<f64>,
}

/// Normalized mixture of Gaussians approximating the PSF of a postage stamp
///
/// The mixture is read-only after construction, stamps share it through [Arc].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PsfMixtureRecord", into = "PsfMixtureRecord")]
pub struct PointSpreadFunction {
    components: Vec<PsfComponent>,
}

impl PointSpreadFunction {
    /// Build a mixture from per-component arrays of the same length
    ///
    /// Amplitudes must be non-negative and sum to unity within [AMPLITUDE_SUM_TOLERANCE],
    /// covariances must be symmetric positive semi-definite.
    pub fn new(
        amplitudes: &[f64],
        means: &[[f64; 2]],
        covariances: &[[[f64; 2]; 2]],
    ) -> Result<Self, PsfError> {
        if amplitudes.is_empty() {
            return Err(PsfError::InvalidMixture("mixture is empty".into()));
        }
        if amplitudes.len() != means.len() || amplitudes.len() != covariances.len() {
            return Err(PsfError::InvalidMixture(format!(
                "{} amplitudes, {} means and {} covariances",
                amplitudes.len(),
                means.len(),
                covariances.len()
            )));
        }

        let components = amplitudes
            .iter()
            .zip(means)
            .zip(covariances)
            .enumerate()
            .map(|(i, ((&amplitude, mean), covariance))| {
                let [[xx, xy], [yx, yy]] = *covariance;
                let component = PsfComponent {
                    amplitude,
                    mean: Vector2::from(*mean),
                    covariance: Matrix2::new(xx, xy, yx, yy),
                };
                validate_component(i, &component)?;
                Ok(component)
            })
            .collect::<Result<Vec<_>, PsfError>>()?;

        let sum: f64 = components.iter().map(|c| c.amplitude).sum();
        if (sum - 1.0).abs() > AMPLITUDE_SUM_TOLERANCE {
            return Err(PsfError::InvalidMixture(format!(
                "amplitudes sum to {sum}, unity is expected"
            )));
        }

        Ok(Self { components })
    }

    /// Delta-function PSF: one unit-amplitude component with zero mean and zero covariance
    pub fn identity() -> Self {
        Self {
            components: vec![PsfComponent {
                amplitude: 1.0,
                mean: Vector2::zeros(),
                covariance: Matrix2::zeros(),
            }],
        }
    }

    /// Single circular Gaussian with standard deviation `sigma` pixels
    pub fn gaussian(sigma: f64) -> Result<Self, PsfError> {
        let var = sigma * sigma;
        Self::new(&[1.0], &[[0.0, 0.0]], &[[[var, 0.0], [0.0, var]]])
    }

    #[inline]
    pub fn ngauss(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn components(&self) -> &[PsfComponent] {
        &self.components
    }

    pub fn amplitudes(&self) -> impl Iterator<Item = f64> + '_ {
        self.components.iter().map(|c| c.amplitude)
    }
}

fn validate_component(i: usize, c: &PsfComponent) -> Result<(), PsfError> {
    let finite = c.amplitude.is_finite()
        && c.mean.iter().all(|x| x.is_finite())
        && c.covariance.iter().all(|x| x.is_finite());
    if !finite {
        return Err(PsfError::InvalidMixture(format!(
            "component {i} has non-finite values"
        )));
    }
    if c.amplitude < 0.0 {
        return Err(PsfError::InvalidMixture(format!(
            "component {i} has negative amplitude {}",
            c.amplitude
        )));
    }
    let cov = &c.covariance;
    let scale = cov[(0, 0)].abs().max(cov[(1, 1)].abs()).max(f64::MIN_POSITIVE);
    if (cov[(0, 1)] - cov[(1, 0)]).abs() > 1e-12 * scale {
        return Err(PsfError::InvalidMixture(format!(
            "component {i} covariance is not symmetric"
        )));
    }
    if cov[(0, 0)] < 0.0 || cov[(1, 1)] < 0.0 || cov.determinant() < -1e-12 * scale * scale {
        return Err(PsfError::InvalidMixture(format!(
            "component {i} covariance is not positive semi-definite"
        )));
    }
    Ok(())
}

/// Serialized form of one mixture, extra keys of the artifact are ignored
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename = "PointSpreadFunction")]
pub struct PsfMixtureRecord {
    pub amplitudes: Vec<f64>,
    pub means: Vec<[f64; 2]>,
    pub covariances: Vec<[[f64; 2]; 2]>,
}

impl From<PointSpreadFunction> for PsfMixtureRecord {
    fn from(psf: PointSpreadFunction) -> Self {
        Self {
            amplitudes: psf.amplitudes().collect(),
            means: psf.components.iter().map(|c| c.mean.into()).collect(),
            covariances: psf
                .components
                .iter()
                .map(|c| {
                    let m = &c.covariance;
                    [[m[(0, 0)], m[(0, 1)]], [m[(1, 0)], m[(1, 1)]]]
                })
                .collect(),
        }
    }
}

impl TryFrom<PsfMixtureRecord> for PointSpreadFunction {
    type Error = PsfError;

    fn try_from(record: PsfMixtureRecord) -> Result<Self, Self::Error> {
        Self::new(&record.amplitudes, &record.means, &record.covariances)
    }
}

impl JsonSchema for PointSpreadFunction {
    fn is_referenceable() -> bool {
        false
    }

    fn schema_name() -> String {
        PsfMixtureRecord::schema_name()
    }

    fn json_schema(r#gen: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        PsfMixtureRecord::json_schema(r#gen)
    }
}

static GLOBAL_PSF_LIBRARY: OnceCell<PsfLibrary> = OnceCell::new();

/// PSF mixtures of different sizes loaded from one artifact
///
/// The artifact is a JSON object keyed by the number of mixture components, e.g.
/// `{"6": {"amplitudes": [...], "means": [...], "covariances": [...]}}`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PsfLibrary {
    mixtures: BTreeMap<usize, Arc<PointSpreadFunction>>,
}

impl PsfLibrary {
    pub fn from_json_str(s: &str) -> Result<Self, PsfError> {
        Self::from_records(serde_json::from_str(s)?)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, PsfError> {
        Self::from_records(serde_json::from_reader(reader)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PsfError> {
        let path = path.as_ref();
        let library = Self::from_reader(BufReader::new(File::open(path)?))?;
        debug!(
            "loaded PSF mixtures of sizes {:?} from {}",
            library.sizes(),
            path.display()
        );
        Ok(library)
    }

    fn from_records(records: BTreeMap<String, PsfMixtureRecord>) -> Result<Self, PsfError> {
        let mixtures = records
            .into_iter()
            .map(|(key, record)| {
                let ngauss: usize = key.trim().parse().map_err(|_| {
                    PsfError::InvalidMixture(format!("mixture key {key:?} is not a component count"))
                })?;
                let psf = PointSpreadFunction::try_from(record)?;
                if psf.ngauss() != ngauss {
                    return Err(PsfError::InvalidMixture(format!(
                        "mixture keyed {ngauss} has {} components",
                        psf.ngauss()
                    )));
                }
                Ok((ngauss, Arc::new(psf)))
            })
            .collect::<Result<_, PsfError>>()?;
        Ok(Self { mixtures })
    }

    pub fn insert(&mut self, psf: PointSpreadFunction) -> Option<Arc<PointSpreadFunction>> {
        self.mixtures.insert(psf.ngauss(), Arc::new(psf))
    }

    /// Mixture with `ngauss` components
    pub fn mixture(&self, ngauss: usize) -> Result<Arc<PointSpreadFunction>, PsfError> {
        self.mixtures
            .get(&ngauss)
            .cloned()
            .ok_or_else(|| PsfError::MissingMixture {
                ngauss,
                available: self.sizes(),
            })
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.mixtures.keys().copied().collect()
    }

    pub fn to_json_string(&self) -> Result<String, PsfError> {
        let records: BTreeMap<String, &PointSpreadFunction> = self
            .mixtures
            .iter()
            .map(|(ngauss, psf)| (ngauss.to_string(), psf.as_ref()))
            .collect();
        Ok(serde_json::to_string(&records)?)
    }

    /// Make this library the process-wide one
    ///
    /// Can be done only once, the installed library is never mutated afterwards.
    pub fn install(self) -> Result<&'static Self, PsfError> {
        let sizes = self.sizes();
        GLOBAL_PSF_LIBRARY
            .set(self)
            .map_err(|_| PsfError::AlreadyInstalled)?;
        debug!("installed global PSF library with mixture sizes {sizes:?}");
        GLOBAL_PSF_LIBRARY.get().ok_or(PsfError::AlreadyInstalled)
    }

    /// Process-wide library, `None` until [PsfLibrary::install] is called
    pub fn global() -> Option<&'static Self> {
        GLOBAL_PSF_LIBRARY.get()
    }
}
