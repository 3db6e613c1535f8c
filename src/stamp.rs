use crate::astrometry::Astrometry;
use crate::error::RenderError;
use crate::psf::PointSpreadFunction;

use ndarray::Array2;
use std::sync::Arc;

/// Postage stamp: a pixel grid with its astrometry, PSF and observed data
///
/// Images are indexed as `[x, y]` with `x in 0..nx`, `y in 0..ny`; pixel `[x, y]` is centered at
/// pixel coordinates `(x, y)`. `ierr` is the per-pixel inverse error of `pixel_values`.
#[derive(Clone, Debug)]
pub struct PostageStamp {
    pub id: usize,
    nx: usize,
    ny: usize,
    astrometry: Astrometry,
    psf: Arc<PointSpreadFunction>,
    pixel_values: Array2<f64>,
    ierr: Array2<f64>,
}

impl PostageStamp {
    /// Stamp with zero data and unity inverse errors
    pub fn new(
        nx: usize,
        ny: usize,
        astrometry: Astrometry,
        psf: impl Into<Arc<PointSpreadFunction>>,
    ) -> Self {
        Self {
            id: 0,
            nx,
            ny,
            astrometry,
            psf: psf.into(),
            pixel_values: Array2::zeros((nx, ny)),
            ierr: Array2::ones((nx, ny)),
        }
    }

    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    pub fn with_pixel_values(mut self, pixel_values: Array2<f64>) -> Result<Self, RenderError> {
        self.check_shape("pixel_values", &pixel_values)?;
        self.pixel_values = pixel_values;
        Ok(self)
    }

    pub fn with_ierr(mut self, ierr: Array2<f64>) -> Result<Self, RenderError> {
        self.check_shape("ierr", &ierr)?;
        self.ierr = ierr;
        Ok(self)
    }

    fn check_shape(&self, what: &'static str, a: &Array2<f64>) -> Result<(), RenderError> {
        if a.dim() == self.dim() {
            Ok(())
        } else {
            Err(RenderError::WrongShape {
                what,
                expected: vec![self.nx, self.ny],
                actual: a.shape().to_vec(),
            })
        }
    }

    #[inline]
    pub fn nx(&self) -> usize {
        self.nx
    }

    #[inline]
    pub fn ny(&self) -> usize {
        self.ny
    }

    #[inline]
    pub fn dim(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    #[inline]
    pub fn npix(&self) -> usize {
        self.nx * self.ny
    }

    #[inline]
    pub fn astrometry(&self) -> &Astrometry {
        &self.astrometry
    }

    #[inline]
    pub fn psf(&self) -> &PointSpreadFunction {
        &self.psf
    }

    #[inline]
    pub fn shared_psf(&self) -> Arc<PointSpreadFunction> {
        Arc::clone(&self.psf)
    }

    #[inline]
    pub fn pixel_values(&self) -> &Array2<f64> {
        &self.pixel_values
    }

    #[inline]
    pub fn ierr(&self) -> &Array2<f64> {
        &self.ierr
    }
}
