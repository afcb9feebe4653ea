use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A required field was empty at save time; nothing was written.
    #[error("{field} must not be empty")]
    Validation { field: &'static str },

    /// The language model could not be reached or returned something unusable.
    #[error("assistant unavailable: {0}")]
    ExternalService(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl Error {
    /// Errors the contributor can fix by simply trying again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ExternalService(_) | Error::Database(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
