use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceCheckError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Unknown detector backend: {0}")]
    UnknownBackend(String),

    #[error("Unknown liveness model: {0}")]
    UnknownModel(String),

    #[error("No face detected in {0}")]
    NoFaceDetected(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FaceCheckError>;
