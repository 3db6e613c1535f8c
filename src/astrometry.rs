use crate::error::RenderError;
use crate::linalg::invert;

use nalgebra::{Matrix2, Vector2};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Local affine astrometric solution of a postage stamp
///
/// Pixel coordinates are $x = D (c - c_0) + x_0$, where $x_0$ is the reference pixel `crpix`,
/// $c_0$ is its celestial coordinate `crval` and $D$ is the `distortion` matrix.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "AstrometryParameters", into = "AstrometryParameters")]
pub struct Astrometry {
    distortion: Matrix2<f64>,
    inv_distortion: Matrix2<f64>,
    crval: Vector2<f64>,
    crpix: Vector2<f64>,
}

impl Astrometry {
    /// Fails with [RenderError::SingularMatrix] if `distortion` cannot be inverted
    pub fn new(
        distortion: Matrix2<f64>,
        crval: Vector2<f64>,
        crpix: Vector2<f64>,
    ) -> Result<Self, RenderError> {
        let inv_distortion = invert(&distortion, "distortion matrix")?;
        Ok(Self {
            distortion,
            inv_distortion,
            crval,
            crpix,
        })
    }

    /// Unit distortion, both reference points at the origin
    pub fn identity() -> Self {
        Self {
            distortion: Matrix2::identity(),
            inv_distortion: Matrix2::identity(),
            crval: Vector2::zeros(),
            crpix: Vector2::zeros(),
        }
    }

    #[inline]
    pub fn distortion(&self) -> &Matrix2<f64> {
        &self.distortion
    }

    #[inline]
    pub fn crval(&self) -> &Vector2<f64> {
        &self.crval
    }

    #[inline]
    pub fn crpix(&self) -> &Vector2<f64> {
        &self.crpix
    }

    pub fn sky_to_pix(&self, sky: &Vector2<f64>) -> Vector2<f64> {
        self.distortion * (sky - self.crval) + self.crpix
    }

    pub fn pix_to_sky(&self, pix: &Vector2<f64>) -> Vector2<f64> {
        self.inv_distortion * (pix - self.crpix) + self.crval
    }
}

impl Default for Astrometry {
    fn default() -> Self {
        Self::identity()
    }
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename = "Astrometry")]
struct AstrometryParameters {
    distortion: [[f64; 2]; 2],
    crval: [f64; 2],
    crpix: [f64; 2],
}

impl From<Astrometry> for AstrometryParameters {
    fn from(a: Astrometry) -> Self {
        let d = a.distortion;
        Self {
            distortion: [[d[(0, 0)], d[(0, 1)]], [d[(1, 0)], d[(1, 1)]]],
            crval: a.crval.into(),
            crpix: a.crpix.into(),
        }
    }
}

impl TryFrom<AstrometryParameters> for Astrometry {
    type Error = RenderError;

    fn try_from(p: AstrometryParameters) -> Result<Self, Self::Error> {
        let [[d00, d01], [d10, d11]] = p.distortion;
        Self::new(
            Matrix2::new(d00, d01, d10, d11),
            p.crval.into(),
            p.crpix.into(),
        )
    }
}

impl JsonSchema for Astrometry {
    fn is_referenceable() -> bool {
        false
    }

    fn schema_name() -> String {
        AstrometryParameters::schema_name()
    }

    fn json_schema(r#gen: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        AstrometryParameters::json_schema(r#gen)
    }
}
