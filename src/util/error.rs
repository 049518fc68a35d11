//! Error types for platealign.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for platealign operations.
pub type AlignResult<T> = std::result::Result<T, AlignError>;

/// Errors that can occur when building or running the alignment engine.
///
/// Construction-time errors (`InvalidConfiguration`, `TemplateUnavailable`,
/// `TemplateTooWeak`) are fatal and prevent the engine from being used.
/// `InvalidFrame` aborts a single `detect` call. Logo-level detection
/// failures are never errors; they become not-found results.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignError {
    /// A configuration field is out of range or inconsistent.
    #[error("invalid configuration: logo={} field={field}: {reason}", .logo.as_deref().unwrap_or("-"))]
    InvalidConfiguration {
        logo: Option<String>,
        field: &'static str,
        reason: String,
    },
    /// A template file is missing, unreadable or failed to decode.
    #[error("template unavailable: logo={logo} path={path}: {reason}")]
    TemplateUnavailable {
        logo: String,
        path: PathBuf,
        reason: String,
    },
    /// Feature extraction on a template produced too few keypoints.
    #[error("template too weak: logo={logo} keypoints={keypoints} minimum={minimum}")]
    TemplateTooWeak {
        logo: String,
        keypoints: usize,
        minimum: usize,
    },
    /// The input frame is empty or has the wrong shape.
    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: &'static str },
    /// A homography matrix is non-finite or singular.
    #[error("invalid homography: {reason}")]
    InvalidHomography { reason: &'static str },
    /// The provided dimensions are invalid (must be non-zero).
    #[error("invalid dimensions: width={width} height={height}")]
    InvalidDimensions { width: usize, height: usize },
    /// The provided stride is smaller than the image width.
    #[error("invalid stride: width={width} stride={stride}")]
    InvalidStride { width: usize, stride: usize },
    /// The backing buffer is too small for the requested view.
    #[error("buffer too small: needed={needed} got={got}")]
    BufferTooSmall { needed: usize, got: usize },
}

impl AlignError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        AlignError::InvalidConfiguration {
            logo: None,
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn logo_config(
        logo: impl Into<String>,
        field: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        AlignError::InvalidConfiguration {
            logo: Some(logo.into()),
            field,
            reason: reason.into(),
        }
    }
}
