//! Utilities module for logging and error handling
//!
//! - Structured logging with tracing
//! - The `DiagnosisError` taxonomy shared by the registry, dispatch and server

pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use error::{DiagnosisError, Result, DIAGNOSIS_ERROR_LABEL};
pub use logging::{init_logging, LogConfig, LogLevel};

/// Format a confidence score as a percentage
pub fn format_confidence(confidence: f32) -> String {
    format!("{:.2}%", confidence * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_confidence() {
        assert_eq!(format_confidence(0.7), "70.00%");
        assert_eq!(format_confidence(1.0), "100.00%");
    }
}
