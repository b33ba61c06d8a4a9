use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported by the browser collaborator.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("timed out after {}ms waiting for {what}", .after.as_millis())]
    Timeout { what: String, after: Duration },
    #[error("element not found: {0}")]
    NotFound(String),
    #[error("script failed: {0}")]
    Script(String),
    #[error("browser failure: {0}")]
    Browser(String),
    #[error("interrupted")]
    Cancelled,
}

impl DriverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::Timeout { .. } => ErrorKind::Timeout,
            DriverError::NotFound(_) => ErrorKind::NotFound,
            DriverError::Script(_) | DriverError::Browser(_) => ErrorKind::Driver,
            DriverError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Why a single field of a session page could not be read.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("label {0:?} not found")]
    LabelNotFound(String),
    #[error("section {0:?} not found")]
    SectionNotFound(String),
    #[error("nothing matches {0:?}")]
    NoMatch(String),
    #[error("{0:?} is empty")]
    Empty(String),
}

pub type Extracted<T> = Result<T, ExtractionError>;

/// Errors that escalate out of a stage instead of being recorded per item.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("cannot reach {surface}: {source}")]
    Fatal {
        surface: String,
        #[source]
        source: DriverError,
    },
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("workbook {path}: {source}")]
    Workbook {
        path: String,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("interrupted")]
    Cancelled,
}

/// Recorded category of a per-item failure. Count mismatches are a flag on
/// the resolved outcome and unreachable portals are `StageError::Fatal`, so
/// neither has a kind here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    Timeout,
    Driver,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Driver => "Driver",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}
