use thiserror::Error;

use crate::db::StoreError;
use crate::invoice_gen::RenderError;
use crate::validation::ValidationError;

/// Every failure an API operation can surface to a caller.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("rate limit exceeded, please try again later")]
    RateLimited,

    #[error("{0}")]
    Internal(String),
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, AppError>;
