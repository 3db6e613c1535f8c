use crate::error::RenderError;
use crate::profile::{SersicTable, SourceProfile};
use crate::render::{RenderOptions, render_source};
use crate::source::{SceneParameter, SceneSource};
use crate::stamp::PostageStamp;

use ndarray::{Array1, Array2, Array3, Axis};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A free parameter of a [Scene]: index of the source and the parameter of that source
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct FreeParameter {
    pub source: usize,
    pub param: SceneParameter,
}

/// Collection of sources rendered together onto a stamp
///
/// The free-parameter vector `theta` lists free parameters source by source, and within a
/// source in the [SceneParameter::ALL] order.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Scene {
    pub sources: Vec<SceneSource>,
}

/// Scene image with the gradient over the free parameters
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedImage {
    /// `(nx, ny)` counts
    pub image: Array2<f64>,
    /// `(n_free, nx, ny)`, in the order of [Scene::free_parameters]
    pub gradient: Option<Array3<f64>>,
}

impl Scene {
    pub fn new(sources: Vec<SceneSource>) -> Self {
        Self { sources }
    }

    pub fn free_parameters(&self) -> Vec<FreeParameter> {
        self.sources
            .iter()
            .enumerate()
            .flat_map(|(source, s)| {
                s.free_parameters()
                    .map(move |param| FreeParameter { source, param })
            })
            .collect()
    }

    pub fn n_free(&self) -> usize {
        self.sources
            .iter()
            .map(|s| s.free_parameters().count())
            .sum()
    }

    pub fn free_values(&self) -> Array1<f64> {
        self.free_parameters()
            .into_iter()
            .map(|FreeParameter { source, param }| self.sources[source].params().get(param))
            .collect()
    }

    /// Copy of the scene with free parameters taken from `theta`
    pub fn with_free_values(&self, theta: &[f64]) -> Result<Self, RenderError> {
        let free = self.free_parameters();
        if free.len() != theta.len() {
            return Err(RenderError::WrongParameterCount {
                expected: free.len(),
                actual: theta.len(),
            });
        }
        let mut scene = self.clone();
        for (FreeParameter { source, param }, &value) in free.into_iter().zip(theta) {
            scene.sources[source].params_mut().set(param, value);
        }
        Ok(scene)
    }

    /// Make galaxies with equal Sersic tables share a single allocation
    ///
    /// Deserialization gives every galaxy its own table, this restores the sharing.
    pub fn share_profile_tables(&mut self) {
        let mut tables: Vec<Arc<SersicTable>> = vec![];
        for source in self.sources.iter_mut() {
            if let SourceProfile::Sersic(profile) = source.profile_mut() {
                match tables.iter().find(|table| table.as_ref() == profile.table()) {
                    Some(table) => profile.set_shared_table(Arc::clone(table)),
                    None => tables.push(Arc::clone(profile.shared_table())),
                }
            }
        }
    }

    /// Sum of all sources' images, with the gradient over the free parameters if requested
    pub fn render(
        &self,
        stamp: &PostageStamp,
        options: &RenderOptions,
    ) -> Result<RenderedImage, RenderError> {
        let (nx, ny) = stamp.dim();
        let mut image = Array2::zeros((nx, ny));
        let mut gradient = options
            .compute_deriv
            .then(|| Array3::zeros((self.n_free(), nx, ny)));

        let mut offset = 0;
        for source in self.sources.iter() {
            let rendered = render_source(source, stamp, options)?;
            image += &rendered.image;
            if let (Some(gradient), Some(source_gradient)) = (gradient.as_mut(), rendered.gradient)
            {
                for param in source.free_parameters() {
                    gradient
                        .index_axis_mut(Axis(0), offset)
                        .assign(&source_gradient.index_axis(Axis(0), param.index()));
                    offset += 1;
                }
            }
        }
        Ok(RenderedImage { image, gradient })
    }
}

impl FromIterator<SceneSource> for Scene {
    fn from_iter<I: IntoIterator<Item = SceneSource>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
