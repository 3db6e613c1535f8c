use forced_photometry::{PointSpreadFunction, PsfLibrary};

use include_dir::{Dir, include_dir};
use lazy_static::lazy_static;
use std::sync::Arc;

const PSF_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/../test-data/psf");

/// Raw JSON of the fixed PSF artifact with 1- and 6-component mixtures
pub fn psf_artifact() -> &'static str {
    PSF_DIR
        .get_file("mixtures.json")
        .and_then(|file| file.contents_utf8())
        .unwrap()
}

lazy_static! {
    pub static ref PSF_LIBRARY: PsfLibrary = PsfLibrary::from_json_str(psf_artifact()).unwrap();
}

pub fn six_component_psf() -> Arc<PointSpreadFunction> {
    PSF_LIBRARY.mixture(6).unwrap()
}
