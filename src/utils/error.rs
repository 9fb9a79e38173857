//! Error Handling Module
//!
//! Defines the error taxonomy for model loading and diagnosis requests.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Generic disease label returned alongside internal failures
pub const DIAGNOSIS_ERROR_LABEL: &str = "خطأ في التشخيص";

/// Main error type for registry and dispatch operations
#[derive(Error, Debug)]
pub enum DiagnosisError {
    /// Model file for a configured crop does not exist
    #[error("Model file not found at path: {0}")]
    ConfigMissing(PathBuf),

    /// Model or weights could not be loaded (corrupt, incompatible shapes, ...)
    #[error("Failed to load model from '{path}': {reason}")]
    Load { path: PathBuf, reason: String },

    /// No model could be loaded at startup
    #[error("ML Service is unavailable: Models failed to load.")]
    ServiceUnavailable,

    /// Malformed caller input
    #[error("{0}")]
    BadRequest(String),

    /// No model registered for the requested crop
    #[error("Model for crop type '{0}' not found.")]
    NotFound(String),

    /// Image payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Classifier failed on the given input
    #[error("Inference error: {0}")]
    Inference(String),

    /// Request-time failure caught at the dispatch boundary
    #[error("Prediction failed due to an internal server issue. Details: {message}")]
    Internal {
        message: String,
        disease_label: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiagnosisError {
    /// Wrap a per-request failure into an `Internal` error with the generic label
    pub fn internal(source: DiagnosisError) -> Self {
        match source {
            already @ DiagnosisError::Internal { .. } => already,
            other => DiagnosisError::Internal {
                message: other.to_string(),
                disease_label: DIAGNOSIS_ERROR_LABEL.to_string(),
            },
        }
    }

    /// HTTP-style status classification of this error
    pub fn status_code(&self) -> u16 {
        match self {
            DiagnosisError::ServiceUnavailable => 503,
            DiagnosisError::BadRequest(_) => 400,
            DiagnosisError::NotFound(_) => 404,
            _ => 500,
        }
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            DiagnosisError::ConfigMissing(_) => "config_missing",
            DiagnosisError::Load { .. } => "load_error",
            DiagnosisError::ServiceUnavailable => "service_unavailable",
            DiagnosisError::BadRequest(_) => "bad_request",
            DiagnosisError::NotFound(_) => "not_found",
            DiagnosisError::Decode(_) => "decode_error",
            DiagnosisError::Inference(_) => "inference_error",
            DiagnosisError::Internal { .. } => "internal_error",
            DiagnosisError::Config(_) => "config_error",
            DiagnosisError::Io(_) => "io_error",
        }
    }

    /// Disease label to report with this error, if any
    pub fn disease_label(&self) -> Option<&str> {
        match self {
            DiagnosisError::Internal { disease_label, .. } => Some(disease_label),
            _ => None,
        }
    }
}

impl From<image::ImageError> for DiagnosisError {
    fn from(err: image::ImageError) -> Self {
        DiagnosisError::Decode(err.to_string())
    }
}

impl From<base64::DecodeError> for DiagnosisError {
    fn from(err: base64::DecodeError) -> Self {
        DiagnosisError::Decode(format!("invalid base64 payload: {}", err))
    }
}

impl From<toml::de::Error> for DiagnosisError {
    fn from(err: toml::de::Error) -> Self {
        DiagnosisError::Config(err.to_string())
    }
}

/// Convenience Result type for diagnosis operations
pub type Result<T> = std::result::Result<T, DiagnosisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DiagnosisError::NotFound("banana".to_string());
        assert_eq!(format!("{}", err), "Model for crop type 'banana' not found.");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(DiagnosisError::ServiceUnavailable.status_code(), 503);
        assert_eq!(DiagnosisError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(DiagnosisError::NotFound("x".into()).status_code(), 404);
        assert_eq!(DiagnosisError::Decode("x".into()).status_code(), 500);
        assert_eq!(
            DiagnosisError::internal(DiagnosisError::Inference("x".into())).status_code(),
            500
        );
    }

    #[test]
    fn test_internal_wraps_with_generic_label() {
        let err = DiagnosisError::internal(DiagnosisError::Decode("bad bytes".to_string()));
        assert_eq!(err.kind(), "internal_error");
        assert_eq!(err.disease_label(), Some(DIAGNOSIS_ERROR_LABEL));
        assert!(err.to_string().contains("bad bytes"));

        // Wrapping twice keeps the original message
        let twice = DiagnosisError::internal(err);
        assert!(twice.to_string().contains("bad bytes"));
        assert!(!twice.to_string().contains("Details: Prediction failed"));
    }

    #[test]
    fn test_load_error_mentions_path() {
        let err = DiagnosisError::Load {
            path: PathBuf::from("/models/potato.mpk"),
            reason: "shape mismatch".to_string(),
        };
        assert!(format!("{}", err).contains("potato.mpk"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DiagnosisError = io_err.into();
        assert!(matches!(err, DiagnosisError::Io(_)));
    }
}
