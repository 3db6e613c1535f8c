#![doc = include_str!("../README.md")]

mod astrometry;
pub use astrometry::Astrometry;

mod convolve;
pub use convolve::convert_to_gaussians;

mod error;
pub use error::{PsfError, RenderError, SersicTableError};

mod evaluate;
pub use evaluate::{compute_gaussian, compute_gaussian_array};

mod gaussian;
pub use gaussian::{
    GaussianJacobian, ImageGaussian, ImageGaussianGrid, NDERIV, NRAW, deriv_index, raw_index,
};

mod gradients;
pub use gradients::{convert_to_gaussians_with_gradients, get_gaussian_gradients};

mod likelihood;
pub use likelihood::{StampLikelihood, numerical_image_gradients};

mod linalg;
pub use linalg::unique_entries;

pub mod prelude;

pub mod profile;
pub use profile::{PointProfile, ProfileMixture, ProfileTrait, SersicProfile, SersicTable, SourceProfile};

mod psf;
pub use psf::{AMPLITUDE_SUM_TOLERANCE, PointSpreadFunction, PsfComponent, PsfLibrary};

mod render;
pub use render::{RenderOptions, RenderedSource, pixel_grid, render_source};

mod scene;
pub use scene::{FreeParameter, RenderedImage, Scene};

pub mod shape;
pub use shape::ShapeTransform;

mod source;
pub use source::{NPARAMS, SceneParameter, SceneSource, SourceParameters};

mod stamp;
pub use stamp::PostageStamp;

pub use nalgebra;
pub use ndarray;
