//! Unified application error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LogbookError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    View(#[from] crumbview::ViewError),

    #[error("{message}")]
    Data { message: String },
}

impl LogbookError {
    pub fn data(message: impl Into<String>) -> Self {
        LogbookError::Data {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LogbookError>;
