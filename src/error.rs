use crate::model::EntryId;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("remote store failure: {0:#}")]
    Network(#[from] anyhow::Error),

    #[error("entry {0} not found")]
    NotFound(EntryId),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("signed out: writes are disabled")]
    Unauthorized,
}

impl FeedError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        FeedError::Validation(message.into())
    }

    /// True for failures raised before any remote call was attempted.
    pub fn is_client_side(&self) -> bool {
        matches!(self, FeedError::Validation(_) | FeedError::Unauthorized)
    }
}

pub type Result<T, E = FeedError> = std::result::Result<T, E>;
