//! Centralized error handling for sci-data-viewer
//!
//! Two layers of errors exist. [`BackendError`] is raised by a single decoding
//! backend while it opens or reads a file; the resolver accumulates these and
//! never lets one escape on its own. [`SdvError`] is what a request finally
//! reports, and each variant maps onto one [`ErrorKind`] of the JSON envelope.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error raised by a decoding backend for one open or read attempt.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend cannot produce this shape (e.g. a tree for a classic file).
    /// The resolver treats this as a request to degrade, not as a failure.
    #[error("not implemented for this backend: {0}")]
    NotImplemented(String),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// NetCDF library errors
    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    /// TIFF decoder errors
    #[cfg(feature = "geotiff")]
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Malformed JSON metadata document
    #[error("invalid metadata document: {0}")]
    Json(#[from] serde_json::Error),

    /// Array shape or dimension error
    #[error("array error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// A dimension is used with two different extents inside one group
    #[error("dimension '{dim}' has conflicting sizes {existing} and {found}")]
    DimensionConflict {
        dim: String,
        existing: usize,
        found: usize,
    },

    /// A variable carries a different number of dimension names than axes
    #[error("variable '{var}' has {names} dimension names for {axes} axes")]
    RankMismatch {
        var: String,
        names: usize,
        axes: usize,
    },

    /// The requested group or variable is not part of the opened file
    #[error("'{0}' not found")]
    NotFound(String),

    /// Structurally invalid or unsupported content
    #[error("{0}")]
    Decode(String),
}

impl BackendError {
    /// Shorthand for a [`BackendError::Decode`] built from any message.
    pub fn decode(message: impl Into<String>) -> Self {
        BackendError::Decode(message.into())
    }

    /// True when the backend signalled that it lacks support for an opening
    /// strategy rather than failing on the file itself.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, BackendError::NotImplemented(_))
    }
}

/// Result type alias for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Error category reported to the caller in the envelope's `errorKind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    UnsupportedFormat,
    MissingDependency,
    DecodeFailure,
    VariableNotFound,
    InvalidRequest,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnsupportedFormat => "UnsupportedFormat",
            ErrorKind::MissingDependency => "MissingDependency",
            ErrorKind::DecodeFailure => "DecodeFailure",
            ErrorKind::VariableNotFound => "VariableNotFound",
            ErrorKind::InvalidRequest => "InvalidRequest",
        };
        f.write_str(name)
    }
}

/// Main error type for info and plot requests
#[derive(Debug, Error)]
pub enum SdvError {
    /// Extension unknown to the format registry
    #[error("Unsupported file format: no backend is registered for '{extension}' files")]
    UnsupportedFormat { extension: String },

    /// Candidates exist for the extension but none of their dependencies is available
    #[error("Missing dependencies for {display_name} files: {}", .missing.join(", "))]
    MissingDependency {
        display_name: String,
        missing: Vec<String>,
    },

    /// Every backend failed, or processing failed after a successful open
    #[error("{message}")]
    DecodeFailure { message: String },

    /// Variable or coordinate path not present in the resolved group
    #[error("Variable '{var}' not found in group '{group}'")]
    VariableNotFound { var: String, group: String },

    /// Caller-supplied argument violates the request contract
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

impl SdvError {
    pub fn decode(message: impl Into<String>) -> Self {
        SdvError::DecodeFailure {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SdvError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            SdvError::MissingDependency { .. } => ErrorKind::MissingDependency,
            SdvError::DecodeFailure { .. } => ErrorKind::DecodeFailure,
            SdvError::VariableNotFound { .. } => ErrorKind::VariableNotFound,
            SdvError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
        }
    }

    /// Human-readable next step shown next to the error.
    pub fn suggestion(&self) -> String {
        match self {
            SdvError::UnsupportedFormat { .. } => {
                "Use one of the supported formats: NetCDF, Zarr, HDF5, GRIB, GeoTIFF or JPEG-2000".to_string()
            }
            SdvError::MissingDependency { missing, .. } => format!(
                "Rebuild with the required backends enabled: cargo build --release --features {}",
                missing.join(",")
            ),
            SdvError::DecodeFailure { .. } => {
                "Check if the file is corrupted or in an unsupported format".to_string()
            }
            SdvError::VariableNotFound { .. } => {
                "Check the variable path against the groups listed by the info command".to_string()
            }
            SdvError::InvalidRequest { .. } => "Check the command arguments".to_string(),
        }
    }
}

impl From<BackendError> for SdvError {
    fn from(error: BackendError) -> Self {
        SdvError::decode(error.to_string())
    }
}

/// Result type alias for request-level operations
pub type Result<T> = std::result::Result<T, SdvError>;
