use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::proj::csdef::QcError;

pub type CsResult<T> = Result<T, CsError>;

#[derive(Error, Debug)]
pub enum CsError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid file format in {}: {message}", path.display())]
    InvalidFormat { path: PathBuf, message: String },

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Internal consistency violation: {0}")]
    Internal(String),

    #[error("Unknown projection: {0}")]
    UnknownProjection(String),

    #[error("Unknown geodetic transform method: {0}")]
    UnknownTransform(String),

    #[error("Unknown grid file format: {0}")]
    UnknownGridFormat(String),

    #[error("Invalid definition {name}: {errors:?}")]
    InvalidDefinition { name: String, errors: Vec<QcError> },

    #[error("Iteration failed to converge after {iterations} iterations (residual {residual:e})")]
    NoConvergence { iterations: usize, residual: f64 },

    #[error("Duplicate dictionary entry: {0}")]
    DuplicateName(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CsError {
    /// Map an `io::Error` raised while touching `path` onto the taxonomy,
    /// keeping "not found" distinguishable from other I/O failures.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => CsError::FileNotFound(path),
            io::ErrorKind::OutOfMemory => CsError::OutOfMemory(path.display().to_string()),
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => CsError::InvalidFormat {
                path,
                message: source.to_string(),
            },
            _ => CsError::Io { path, source },
        }
    }

    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        CsError::InvalidFormat {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Outcome of a forward or inverse projection.
///
/// Ordered by severity so that a sequence of conversions can report the
/// worst outcome with `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Status {
    /// Exact result.
    #[default]
    Normal,
    /// Valid result, but some output component is undefined (e.g. longitude at a pole).
    Indeterminate,
    /// Input outside the mathematical domain; result clamped to the nearest boundary.
    Range,
}

impl Status {
    pub fn worst(self, other: Status) -> Status {
        self.max(other)
    }

    pub fn is_normal(self) -> bool {
        self == Status::Normal
    }
}

/// Outcome of a datum shift that produced a usable result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ShiftStatus {
    #[default]
    Normal,
    /// Iteration exhausted but residual within the error tolerance.
    Unconverged,
    /// No grid file covers the point; the input was returned unshifted.
    NoCoverage,
}

impl ShiftStatus {
    /// Legacy numeric code: zero for success, +1 for any soft warning.
    pub fn code(self) -> i32 {
        match self {
            ShiftStatus::Normal => 0,
            ShiftStatus::Unconverged | ShiftStatus::NoCoverage => 1,
        }
    }

    pub fn worst(self, other: ShiftStatus) -> ShiftStatus {
        self.max(other)
    }
}
