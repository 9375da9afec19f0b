use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire crate.
pub type Result<T> = std::result::Result<T, VisErr>;

/// The crate's error type.
#[derive(Debug)]
pub enum VisErr {
    /// An out-of-range hyperparameter. The committed config is left untouched.
    Validation {
        field: &'static str,
        reason: String,
    },
    /// Topology, activations and dataset disagree on a size.
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// There's no predictor, dataset or sample to work with yet.
    NotReady(&'static str),
    /// A non-finite value showed up in an activation or a loss.
    NumericInstability {
        stage: &'static str,
        layer: usize,
        index: usize,
    },
    /// Propagated verbatim from the training boundary.
    TrainingFailed(String),
    /// A training task was cancelled before finishing.
    Cancelled,
    InvalidDimensions {
        width: f64,
        height: f64,
    },
    InvalidTopology,
    EmptyTrace,
    UnsupportedFormat(String),
    EmptyOrMalformed(String),
    SizeLimitExceeded {
        size: usize,
        limit: usize,
    },
    Io(io::Error),
    Json(serde_json::Error),
}

impl VisErr {
    /// Whether this error should be reported to the user as a recoverable notice
    /// rather than a failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, VisErr::Validation { .. } | VisErr::NotReady(_))
    }
}

impl Display for VisErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisErr::Validation { field, reason } => write!(f, "invalid {field}: {reason}"),
            VisErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch in {what}, got {got} and expected {expected}"
            ),
            VisErr::NotReady(what) => write!(f, "not ready: {what}"),
            VisErr::NumericInstability {
                stage,
                layer,
                index,
            } => write!(
                f,
                "non-finite value during {stage} at layer {layer}, index {index}"
            ),
            VisErr::TrainingFailed(reason) => write!(f, "training failed: {reason}"),
            VisErr::Cancelled => write!(f, "training was cancelled"),
            VisErr::InvalidDimensions { width, height } => {
                write!(f, "invalid viewport dimensions {width}x{height}")
            }
            VisErr::InvalidTopology => write!(f, "the topology has no layers"),
            VisErr::EmptyTrace => write!(f, "the activation trace has no layers"),
            VisErr::UnsupportedFormat(name) => {
                write!(f, "unsupported dataset format for '{name}', only CSV files are supported")
            }
            VisErr::EmptyOrMalformed(detail) => write!(f, "empty or malformed dataset: {detail}"),
            VisErr::SizeLimitExceeded { size, limit } => write!(
                f,
                "dataset of {size} bytes exceeds the {} MiB limit",
                limit / (1024 * 1024)
            ),
            VisErr::Io(e) => write!(f, "io error: {e}"),
            VisErr::Json(e) => write!(f, "invalid JSON: {e}"),
        }
    }
}

impl Error for VisErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            VisErr::Io(e) => Some(e),
            VisErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for VisErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for VisErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
