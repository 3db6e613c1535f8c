/// Error returned from the rendering chain
///
/// Every variant is surfaced to the caller as-is: the renderer never clamps, masks or substitutes
/// a default value, the optimizer decides whether to reject the step.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum RenderError {
    #[error("invalid value {value} of parameter {name}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("parameter {name} = {value} is outside of the lookup table domain [{min}, {max}]")]
    OutOfTableDomain {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{what} is singular or not positive-definite, determinant is {determinant:e}")]
    SingularMatrix {
        what: &'static str,
        determinant: f64,
    },

    #[error("non-finite value produced while computing {0}")]
    NumericalOverflow(&'static str),

    #[error("parameter vector has length {actual}, {expected} is expected")]
    WrongParameterCount { expected: usize, actual: usize },

    #[error("{what} has shape {actual:?}, {expected:?} is expected")]
    WrongShape {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("image Gaussian grid was not produced for this source and stamp: {0} differs")]
    GridMismatch(&'static str),
}

/// Error returned when a PSF mixture artifact cannot be used
#[derive(Debug, thiserror::Error)]
pub enum PsfError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("PSF artifact has no {ngauss}-component mixture, available sizes are {available:?}")]
    MissingMixture { ngauss: usize, available: Vec<usize> },

    #[error("invalid PSF mixture: {0}")]
    InvalidMixture(String),

    #[error("global PSF library is already installed")]
    AlreadyInstalled,
}

/// Error returned from [SersicTable](crate::SersicTable) constructors
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SersicTableError {
    #[error("{0} grid must have at least two nodes")]
    ShortGrid(&'static str),

    #[error("{0} grid must be finite and strictly increasing")]
    UnsortedGrid(&'static str),

    #[error("amplitude table has shape {actual:?}, {expected:?} is expected")]
    WrongShape {
        expected: [usize; 3],
        actual: Vec<usize>,
    },

    #[error("radii must be finite and positive")]
    InvalidRadii,

    #[error("amplitudes at node (n = {n}, r = {r}) must be non-negative and sum to unity, sum is {sum}")]
    NotNormalized { n: f64, r: f64, sum: f64 },
}
