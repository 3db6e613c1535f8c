use crate::error::RenderError;
use crate::profile::{PointProfile, ProfileTrait, SourceProfile};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Number of scene parameters of a single source
pub const NPARAMS: usize = 7;

/// Scene parameters of a source, in the order of the per-source parameter vector
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum SceneParameter {
    /// Total flux `psi`
    Flux,
    /// Right ascension, degrees
    Ra,
    /// Declination, degrees
    Dec,
    /// Axis ratio `q`
    AxisRatio,
    /// Position angle `phi`, radians
    PositionAngle,
    /// Sersic index `n`
    SersicIndex,
    /// Half-light radius `r`
    HalfLightRadius,
}

impl SceneParameter {
    pub const ALL: [Self; NPARAMS] = [
        Self::Flux,
        Self::Ra,
        Self::Dec,
        Self::AxisRatio,
        Self::PositionAngle,
        Self::SersicIndex,
        Self::HalfLightRadius,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Flux => "psi",
            Self::Ra => "ra",
            Self::Dec => "dec",
            Self::AxisRatio => "q",
            Self::PositionAngle => "phi",
            Self::SersicIndex => "n",
            Self::HalfLightRadius => "r",
        }
    }

    /// Parameters which only shape the source and have no effect on point sources
    pub fn is_shape(self) -> bool {
        !matches!(self, Self::Flux | Self::Ra | Self::Dec)
    }
}

/// Values of the scene parameters of a single source
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SourceParameters {
    pub psi: f64,
    pub ra: f64,
    pub dec: f64,
    pub q: f64,
    pub phi: f64,
    pub n: f64,
    pub r: f64,
}

impl SourceParameters {
    /// Round source at the given position, `n` and `r` are zero
    pub fn new(psi: f64, ra: f64, dec: f64) -> Self {
        Self {
            psi,
            ra,
            dec,
            q: 1.0,
            phi: 0.0,
            n: 0.0,
            r: 0.0,
        }
    }

    pub fn get(&self, param: SceneParameter) -> f64 {
        match param {
            SceneParameter::Flux => self.psi,
            SceneParameter::Ra => self.ra,
            SceneParameter::Dec => self.dec,
            SceneParameter::AxisRatio => self.q,
            SceneParameter::PositionAngle => self.phi,
            SceneParameter::SersicIndex => self.n,
            SceneParameter::HalfLightRadius => self.r,
        }
    }

    pub fn set(&mut self, param: SceneParameter, value: f64) {
        let x = match param {
            SceneParameter::Flux => &mut self.psi,
            SceneParameter::Ra => &mut self.ra,
            SceneParameter::Dec => &mut self.dec,
            SceneParameter::AxisRatio => &mut self.q,
            SceneParameter::PositionAngle => &mut self.phi,
            SceneParameter::SersicIndex => &mut self.n,
            SceneParameter::HalfLightRadius => &mut self.r,
        };
        *x = value;
    }

    pub fn to_array(&self) -> [f64; NPARAMS] {
        SceneParameter::ALL.map(|p| self.get(p))
    }

    pub fn from_array(values: [f64; NPARAMS]) -> Self {
        let mut params = Self::new(0.0, 0.0, 0.0);
        for (p, x) in SceneParameter::ALL.into_iter().zip(values) {
            params.set(p, x);
        }
        params
    }

    pub(crate) fn check_finite(&self) -> Result<(), RenderError> {
        for p in SceneParameter::ALL {
            let value = self.get(p);
            if !value.is_finite() {
                return Err(RenderError::InvalidParameter {
                    name: p.name(),
                    value,
                    reason: "parameter must be finite",
                });
            }
        }
        Ok(())
    }
}

/// A source of the scene: its parameters, which of them are fixed, and its profile
///
/// Every source owns its parameters, nothing is shared between instances.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SceneSource {
    pub id: usize,
    params: SourceParameters,
    fixed: [bool; NPARAMS],
    profile: SourceProfile,
}

impl SceneSource {
    /// Point source with free flux and position
    pub fn point(id: usize, psi: f64, ra: f64, dec: f64) -> Self {
        Self::new(
            id,
            SourceParameters::new(psi, ra, dec),
            PointProfile::default().into(),
        )
    }

    /// Galaxy with all parameters free
    pub fn galaxy(id: usize, params: SourceParameters, profile: SourceProfile) -> Self {
        Self::new(id, params, profile)
    }

    pub fn new(id: usize, params: SourceParameters, profile: SourceProfile) -> Self {
        Self {
            id,
            params,
            fixed: [false; NPARAMS],
            profile,
        }
    }

    /// Fix or free a parameter, shape parameters of shapeless profiles stay fixed anyway
    pub fn with_fixed(mut self, param: SceneParameter, fixed: bool) -> Self {
        self.fixed[param.index()] = fixed;
        self
    }

    pub fn with_all_fixed(mut self, fixed: bool) -> Self {
        self.fixed = [fixed; NPARAMS];
        self
    }

    pub fn with_params(mut self, params: SourceParameters) -> Self {
        self.params = params;
        self
    }

    #[inline]
    pub fn params(&self) -> &SourceParameters {
        &self.params
    }

    #[inline]
    pub fn params_mut(&mut self) -> &mut SourceParameters {
        &mut self.params
    }

    #[inline]
    pub fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    pub(crate) fn profile_mut(&mut self) -> &mut SourceProfile {
        &mut self.profile
    }

    #[inline]
    pub fn ngauss(&self) -> usize {
        self.profile.ngauss()
    }

    pub fn is_fixed(&self, param: SceneParameter) -> bool {
        self.fixed[param.index()] || (param.is_shape() && !self.profile.has_shape())
    }

    /// Free parameters in the per-source order
    pub fn free_parameters(&self) -> impl Iterator<Item = SceneParameter> + '_ {
        SceneParameter::ALL
            .into_iter()
            .filter(|&p| !self.is_fixed(p))
    }
}
