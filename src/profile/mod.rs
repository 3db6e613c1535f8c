//! Radial profiles of scene sources as Gaussian mixtures
//!
//! A profile maps the Sersic index `n` and the half-light radius `r` to per-component amplitudes,
//! their derivatives over `n` and `r`, and component covariances in the source frame. Profiles are
//! swappable capabilities, see [SourceProfile].

use crate::error::RenderError;

use enum_dispatch::enum_dispatch;
use nalgebra::Matrix2;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod point;
pub use point::PointProfile;

mod sersic;
pub use sersic::{SersicProfile, SersicTable};

/// Gaussian mixture of a profile evaluated at given `(n, r)`
#[derive(Clone, Debug, PartialEq)]
pub struct ProfileMixture {
    pub amplitudes: Vec<f64>,
    pub damplitude_dn: Vec<f64>,
    pub damplitude_dr: Vec<f64>,
    pub covariances: Vec<Matrix2<f64>>,
}

impl ProfileMixture {
    #[inline]
    pub fn ngauss(&self) -> usize {
        self.amplitudes.len()
    }
}

#[enum_dispatch]
pub trait ProfileTrait {
    /// Number of mixture components
    fn ngauss(&self) -> usize;

    /// Whether axis ratio and position angle change the rendered source
    ///
    /// If `false` the shape transform is skipped and its derivatives vanish.
    fn has_shape(&self) -> bool;

    /// Evaluate the mixture, `(n, r)` out of the supported domain is an error
    fn mixture(&self, n: f64, r: f64) -> Result<ProfileMixture, RenderError>;
}

/// Profile of a scene source
#[enum_dispatch(ProfileTrait)]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[non_exhaustive]
pub enum SourceProfile {
    Point(PointProfile),
    Sersic(SersicProfile),
}

impl SourceProfile {
    pub fn point() -> Self {
        PointProfile::default().into()
    }
}

impl Default for SourceProfile {
    fn default() -> Self {
        Self::point()
    }
}
