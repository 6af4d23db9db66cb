use slide_model::ValidationError;
use thiserror::Error;

/// Failures reported by a [`SlideStore`](crate::store::SlideStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A slide with this name is already scheduled; the stored record is untouched.
    #[error("slide already exists: {0}")]
    Duplicate(String),

    /// No slide with this name is scheduled.
    #[error("slide not found: {0}")]
    NotFound(String),

    /// The record was rejected before reaching storage.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// Underlying SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl StoreError {
    /// Backend failures that may succeed on a later attempt.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

/// Failures reported by a [`Broadcaster`](crate::broadcast::Broadcaster).
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// The transport has shut down and will not accept further messages.
    #[error("broadcast transport closed")]
    Closed,
}
