use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReadoutError>;

#[derive(Debug, Error)]
pub enum ReadoutError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Config file error: {0}")]
    ConfigFile(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Video error: {0}")]
    Video(String),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Model load failed: {0}")]
    ModelLoadFailed(String),
    #[error("Model not loaded")]
    NotLoaded,
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse error classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Io,
    ModelLoad,
    Validation,
}

impl ReadoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReadoutError::Config(_) | ReadoutError::ConfigFile(_) => ErrorKind::Configuration,
            ReadoutError::Io(_) | ReadoutError::Video(_) | ReadoutError::Image(_) => ErrorKind::Io,
            ReadoutError::ModelLoadFailed(_)
            | ReadoutError::NotLoaded
            | ReadoutError::Inference(_) => ErrorKind::ModelLoad,
            ReadoutError::Validation(_) | ReadoutError::Json(_) => ErrorKind::Validation,
        }
    }
}
