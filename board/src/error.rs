//! Error types for Noteboard
//!
//! All errors use thiserror for structured error handling.
//! Store failures are logged and swallowed by the board; they are
//! returned here so the call site can decide what to log.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoardError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Note not found: {0}")]
    NoteNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BoardError {
    /// True when the store could not be reached or failed to answer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BoardError::Transport(_)
                | BoardError::Database(_)
                | BoardError::Http(_)
                | BoardError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BoardError>;
