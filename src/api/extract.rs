use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use uuid::Uuid;

use super::AppState;
use crate::errors::AppError;

/// The authenticated caller, taken from `Authorization: Bearer <token>`.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthenticated("missing authorization header".to_string()))?
            .to_str()
            .map_err(|_| AppError::Unauthenticated("malformed authorization header".to_string()))?;

        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AppError::Unauthenticated("authorization header must be a bearer token".to_string())
            })?;

        let claims = state.auth.authenticate(token)?;
        Ok(AuthUser(claims.sub))
    }
}

/// Parses a path segment as an id, rejecting malformed ones with 400.
pub fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("invalid id: {raw}")))
}
