use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("cannot traverse relation: {0}")]
    Traversal(String),
    #[error("invalid schema: {0}")]
    Schema(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;
