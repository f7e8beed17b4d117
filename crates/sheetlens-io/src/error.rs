use thiserror::Error;

/// Errors produced by the built-in backends.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "json")]
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown sheet '{0}'")]
    UnknownSheet(String),

    #[error("invalid workbook document: {0}")]
    InvalidDocument(String),
}
