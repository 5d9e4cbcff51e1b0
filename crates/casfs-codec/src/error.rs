use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed directory blob framing: {0}")]
    CorruptStore(String),

    #[error("unknown directory codec format: {0:?}")]
    UnknownFormat(String),

    #[error("encoding error: {0}")]
    EncodingError(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;
