use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiagnosisError {
    #[error("model not found at {}", path.display())]
    MissingModel { path: PathBuf },
    #[error("cannot load model {}: {message}", path.display())]
    ModelLoad { path: PathBuf, message: String },
    #[error("image not found: {}", path.display())]
    MissingImage { path: PathBuf },
    #[error("failed to decode image {}: unsupported format or corrupt file", path.display())]
    DecodeFailure {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("preprocessing error: {0}")]
    Preprocessing(String),
    #[error("inference error: {0}")]
    Inference(String),
    #[error("display error: {0}")]
    Ui(String),
    #[error("invalid configuration {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
}

impl DiagnosisError {
    /// Errors raised before any image is handled. No shell can recover from these.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            DiagnosisError::MissingModel { .. }
                | DiagnosisError::ModelLoad { .. }
                | DiagnosisError::Config { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DiagnosisError>;
