//! Error type returned by the extraction operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractorError {
    /// The requested source record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A source record was found but its payload could not be interpreted.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Persistence or storage failure.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ExtractorError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type ExtractorResult<T> = std::result::Result<T, ExtractorError>;
