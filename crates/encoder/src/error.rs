use thiserror::Error;

pub type Result<T> = std::result::Result<T, EncoderError>;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}
