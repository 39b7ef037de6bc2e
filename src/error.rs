use axum::http::StatusCode;

use crate::{
    slug::SlugError,
    util_resp::{ApiError, FailureResponse},
};

/// Errors raised while writing a row (and running its pre-save hooks).
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error(transparent)]
    Query(#[from] diesel::result::Error),
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error("failed to hash password: {0}")]
    Password(String),
}

impl From<argon2::password_hash::Error> for SaveError {
    fn from(e: argon2::password_hash::Error) -> Self {
        SaveError::Password(e.to_string())
    }
}

impl From<SaveError> for FailureResponse {
    fn from(e: SaveError) -> Self {
        match e {
            SaveError::Query(e) => FailureResponse::from(e),
            e => {
                tracing::error!("failed to save: {e}");
                FailureResponse::ServerError(())
            }
        }
    }
}

impl From<SaveError> for ApiError {
    fn from(e: SaveError) -> Self {
        match e {
            SaveError::Query(e) => ApiError::from(e),
            e => {
                tracing::error!("failed to save: {e}");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Server error.")
            }
        }
    }
}
