use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the segmentation pipeline.
///
/// Variants are grouped the way callers need to treat them:
///
/// * input failures (`Decode`, `Fetch`, `FetchTimeout`) are reported back to
///   the caller with a readable reason,
/// * `ModelLoad` is fatal: nothing may be served without a usable model,
/// * `Shape`, `DimensionMismatch` and `PaletteLookup` mean two components were
///   wired together incorrectly and are never recovered from silently.
#[derive(Error, Debug)]
pub enum SegError {
    #[error("Decode error: {reason}")]
    Decode {
        reason: String,
        #[source]
        source: Option<image::ImageError>,
    },

    #[error("Fetch error: {reason} (url: {url})")]
    Fetch {
        url: String,
        reason: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("Fetch timed out after {timeout:?} (url: {url})")]
    FetchTimeout { url: String, timeout: Duration },

    #[error("Model load error: {operation} failed")]
    ModelLoad {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Inference error: {operation} failed")]
    Inference {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Shape error: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },

    #[error(
        "Dimension mismatch: expected {}x{}, got {}x{}",
        .expected.0, .expected.1, .actual.0, .actual.1
    )]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Palette lookup error: class index {index} has no color")]
    PaletteLookup { index: usize },

    #[error("Encode error: {reason}")]
    Encode {
        reason: String,
        #[source]
        source: Option<image::ImageError>,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Background task failed")]
    Task {
        #[source]
        source: tokio::task::JoinError,
    },
}

pub type Result<T> = std::result::Result<T, SegError>;

impl SegError {
    /// Stable name of the error kind, independent of the message text.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "DecodeError",
            Self::Fetch { .. } => "FetchError",
            Self::FetchTimeout { .. } => "FetchTimeoutError",
            Self::ModelLoad { .. } => "ModelLoadError",
            Self::Inference { .. } => "InferenceError",
            Self::Shape { .. } => "ShapeError",
            Self::DimensionMismatch { .. } => "DimensionMismatchError",
            Self::PaletteLookup { .. } => "PaletteLookupError",
            Self::Encode { .. } => "EncodeError",
            Self::Configuration { .. } => "ConfigurationError",
            Self::FileSystem { .. } => "FileSystemError",
            Self::Task { .. } => "TaskError",
        }
    }

    /// Errors that can only come from a bug in the wiring between components.
    pub const fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::Shape { .. } | Self::DimensionMismatch { .. } | Self::PaletteLookup { .. }
        )
    }

    /// Errors after which the process must not accept work.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ModelLoad { .. })
    }

    /// Errors caused by the caller's input rather than by the service.
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::Fetch { .. } | Self::FetchTimeout { .. }
        )
    }

    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn fetch(url: &str, reason: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.to_string(),
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn shape(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::Shape {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub(crate) fn model_load(
        operation: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::ModelLoad {
            operation: operation.into(),
            source: source.into(),
        }
    }
}

/// Serializable failure handed to callers in place of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub kind: String,
    pub reason: String,
}

impl From<&SegError> for FailureReport {
    fn from(err: &SegError) -> Self {
        let mut reason = err.to_string();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            reason.push_str(": ");
            reason.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            kind: err.kind().to_string(),
            reason,
        }
    }
}

/// Convert I/O errors to filesystem errors.
///
/// Callers that know the path and operation should build
/// `SegError::FileSystem` directly; this is the fallback for `?`.
impl From<std::io::Error> for SegError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// ONNX Runtime errors raised after the session is built happen during inference.
impl From<ort::Error> for SegError {
    fn from(err: ort::Error) -> Self {
        Self::Inference {
            operation: "ort operation".to_string(),
            source: err.to_string().into(),
        }
    }
}

/// Tensor reshapes only fail when a model output does not have the layout we expect.
impl From<ndarray::ShapeError> for SegError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Shape {
            expected: "a 4-dimensional NCHW tensor".to_string(),
            actual: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for SegError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task { source: err }
    }
}
