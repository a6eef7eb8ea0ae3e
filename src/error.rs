//! Error type shared by every module of the crate.

use thiserror::Error;

/// Errors raised by encoding, training, persistence, and generation.
#[derive(Error, Debug)]
pub enum CharnnError {
    /// No trained model is available where one is required.
    ///
    /// Callers should tell the user to train a model first.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The training corpus cannot yield a single example.
    #[error("corpus has {chars} characters, needs at least {} for window size {window}", .window + 1)]
    EmptyCorpus { chars: usize, window: usize },

    /// Invalid network, training, or alphabet configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Tensor shape disagrees with the model.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type CharnnResult<T> = Result<T, CharnnError>;

impl From<serde_json::Error> for CharnnError {
    fn from(e: serde_json::Error) -> Self {
        CharnnError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CharnnError::ModelNotFound("data/model.json".to_string());
        assert!(err.to_string().contains("model not found"));
        assert!(err.to_string().contains("data/model.json"));

        let err = CharnnError::EmptyCorpus { chars: 3, window: 5 };
        assert_eq!(
            err.to_string(),
            "corpus has 3 characters, needs at least 6 for window size 5"
        );

        let err = CharnnError::InvalidConfig("window_size must be > 0".to_string());
        assert!(err.to_string().contains("invalid config"));

        let err = CharnnError::ShapeMismatch("expected 40 columns".to_string());
        assert!(err.to_string().contains("shape mismatch"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let parse: Result<Vec<f32>, _> = serde_json::from_str("{not json");
        let err: CharnnError = parse.unwrap_err().into();
        assert!(matches!(err, CharnnError::Serialization(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CharnnError = io.into();
        assert!(matches!(err, CharnnError::Io(_)));
    }
}
