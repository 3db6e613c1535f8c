pub use fixtures::psf::{PSF_LIBRARY, psf_artifact, six_component_psf};
pub use fixtures::sersic::{SERSIC_TABLE, synthetic_sersic_table};
pub use fixtures::stamp::{centered_stamp, mock_stamp};
pub use gradient_check::{assert_gradients_close, gradient_mismatch};

mod fixtures;
mod gradient_check;
