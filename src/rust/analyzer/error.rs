use ort::Error as OrtError;
use std::fmt;

/// Represents the different types of errors that can occur while analyzing an image.
#[derive(Debug)]
pub enum AnalysisError {
    /// The input bytes are not a supported, complete image
    Decode(String),
    /// The embedding model could not be loaded or initialized
    ModelUnavailable(String),
    /// The embedding model failed at inference time or returned unusable output
    Embedding(String),
    /// Invalid configuration or input parameters
    Validation(String),
    /// Unexpected failure while running the pipeline stages
    Pipeline(String),
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(msg) => write!(f, "Decode error: {}", msg),
            Self::ModelUnavailable(msg) => write!(f, "Model unavailable: {}", msg),
            Self::Embedding(msg) => write!(f, "Embedding error: {}", msg),
            Self::Validation(msg) => write!(f, "Validation error: {}", msg),
            Self::Pipeline(msg) => write!(f, "Analysis failed: {}", msg),
        }
    }
}

impl std::error::Error for AnalysisError {}

impl From<OrtError> for AnalysisError {
    fn from(err: OrtError) -> Self {
        AnalysisError::ModelUnavailable(err.to_string())
    }
}

impl From<image::ImageError> for AnalysisError {
    fn from(err: image::ImageError) -> Self {
        AnalysisError::Decode(err.to_string())
    }
}
