pub(crate) mod psf;
pub(crate) mod sersic;
pub(crate) mod stamp;
