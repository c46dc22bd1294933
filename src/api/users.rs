use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use super::AppState;
use crate::errors::Result;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub company_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    body: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>)> {
    let Json(req) = body?;
    let user = state
        .auth
        .register(&req.email, &req.password, &req.company_name)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "user registered successfully", "user_id": user.id })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    body: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(req) = body?;
    let token = state.auth.login(&req.email, &req.password).await?;
    Ok(Json(json!({ "token": token })))
}
