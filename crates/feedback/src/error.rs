use thiserror::Error;

pub type Result<T> = std::result::Result<T, FeedbackError>;

#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
