use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::{Value, json};

use super::AppState;
use super::extract::{AuthUser, parse_id};
use crate::errors::Result;
use crate::models::Template;
use crate::templates::TemplatePayload;

pub async fn create_template(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    body: std::result::Result<Json<TemplatePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>)> {
    let Json(payload) = body?;
    let template = state.templates.create(caller, payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "template created successfully", "template_id": template.id })),
    ))
}

pub async fn list_templates(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Value>> {
    let templates = state.templates.list(caller).await?;
    Ok(Json(json!({ "templates": templates })))
}

pub async fn get_template(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Template>> {
    Ok(Json(state.templates.get(caller, parse_id(&id)?).await?))
}
