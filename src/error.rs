//! Error types for character segmentation and dataset curation

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for crate operations
pub type Result<T> = std::result::Result<T, CropError>;

/// Error types for segmentation, cropping and bookkeeping operations
#[derive(Error, Debug)]
pub enum CropError {
    /// Input/output errors (crop writes, ledger saves, file moves)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Source image could not be opened or decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Segmentation backend is not initialized
    #[error("Mask oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// Segmentation backend failed for one image
    #[error("Mask oracle call failed: {0}")]
    OracleCallFailed(String),

    /// Segmentation backend returned inconsistent output
    #[error("Invalid oracle output: {0}")]
    InvalidOracleOutput(String),

    /// Ledger file exists but is not valid JSON
    #[error("Ledger file '{}' is corrupt: {source}", path.display())]
    LedgerCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Sorting workflow errors (unknown bucket, missing file)
    #[error("Sort error: {0}")]
    Sort(String),
}

impl CropError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new oracle-unavailable error
    pub fn oracle_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::OracleUnavailable(msg.into())
    }

    /// Create a new oracle-call error
    pub fn oracle_call_failed<S: Into<String>>(msg: S) -> Self {
        Self::OracleCallFailed(msg.into())
    }

    /// Create a new invalid-oracle-output error
    pub fn invalid_oracle_output<S: Into<String>>(msg: S) -> Self {
        Self::InvalidOracleOutput(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new sort error
    pub fn sort<S: Into<String>>(msg: S) -> Self {
        Self::Sort(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with the valid range
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Whether the error only concerns the image being processed.
    ///
    /// Contained errors are reported and the batch moves on; the rest
    /// (corrupt ledger, bad configuration) abort the run.
    #[must_use]
    pub fn is_contained(&self) -> bool {
        !matches!(self, Self::LedgerCorrupt { .. } | Self::InvalidConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = CropError::oracle_unavailable("model not loaded");
        assert!(matches!(err, CropError::OracleUnavailable(_)));

        let err = CropError::decode("truncated PNG");
        assert!(matches!(err, CropError::Decode(_)));
    }

    #[test]
    fn test_error_display() {
        let err = CropError::invalid_config("grid size must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: grid size must be positive"
        );
    }

    #[test]
    fn test_file_io_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = CropError::file_io_error("write crop", Path::new("/out/m1_char_00.png"), &io_error);
        let message = err.to_string();
        assert!(message.contains("write crop"));
        assert!(message.contains("/out/m1_char_00.png"));
        assert!(message.contains("access denied"));
    }

    #[test]
    fn test_config_value_error() {
        let err = CropError::config_value_error("iou_threshold", 1.5, "0.0-1.0");
        let message = err.to_string();
        assert!(message.contains("iou_threshold"));
        assert!(message.contains("1.5"));
        assert!(message.contains("0.0-1.0"));
    }

    #[test]
    fn test_containment() {
        assert!(CropError::oracle_call_failed("boom").is_contained());
        assert!(CropError::decode("bad header").is_contained());
        assert!(!CropError::invalid_config("bad").is_contained());

        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = CropError::LedgerCorrupt {
            path: PathBuf::from("segmentation_metadata.json"),
            source,
        };
        assert!(!err.is_contained());
        assert!(err.to_string().contains("segmentation_metadata.json"));
    }
}
