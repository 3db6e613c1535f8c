use crate::error::RenderError;
use crate::profile::{ProfileMixture, ProfileTrait};

use nalgebra::Matrix2;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Point source: single isotropic component of a fixed radius
///
/// The default radius is unity. Zero radius gives a true delta function which can be rendered
/// only through a PSF with non-degenerate covariance.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PointProfile {
    radius: f64,
}

impl PointProfile {
    pub fn new(radius: f64) -> Result<Self, RenderError> {
        if radius.is_finite() && radius >= 0.0 {
            Ok(Self { radius })
        } else {
            Err(RenderError::InvalidParameter {
                name: "radius",
                value: radius,
                reason: "point source radius must be non-negative",
            })
        }
    }

    #[inline]
    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl Default for PointProfile {
    fn default() -> Self {
        Self { radius: 1.0 }
    }
}

impl ProfileTrait for PointProfile {
    fn ngauss(&self) -> usize {
        1
    }

    fn has_shape(&self) -> bool {
        false
    }

    fn mixture(&self, _n: f64, _r: f64) -> Result<ProfileMixture, RenderError> {
        Ok(ProfileMixture {
            amplitudes: vec![1.0],
            damplitude_dn: vec![0.0],
            damplitude_dr: vec![0.0],
            covariances: vec![Matrix2::identity() * self.radius.powi(2)],
        })
    }
}
