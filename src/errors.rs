use crate::{auth::AuthError, contents::StoreError, semantic::SearchError};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("content not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(#[from] AuthError),

    #[error("search error: {0}")]
    Search(#[from] SearchError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

/// Reject empty or whitespace-only body text.
pub fn validate_body_not_empty(body: &str) -> Result<(), AppError> {
    if body.trim().is_empty() {
        return Err(AppError::Validation("body cannot be empty".to_string()));
    }
    Ok(())
}
