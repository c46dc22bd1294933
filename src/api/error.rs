use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::db::StoreError;
use crate::errors::AppError;
use crate::invoice_gen::RenderError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Render(RenderError::NoTemplate) => StatusCode::BAD_REQUEST,
            Self::Render(RenderError::TemplateNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Render(RenderError::TemplateNotOwned(_)) => StatusCode::FORBIDDEN,
            Self::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converts the error into the body sent to clients. Database and
    /// internal failures get a generic message.
    pub fn body(&self) -> ErrorBody {
        let (error, message, details) = match self {
            Self::Validation(v) => (
                "validation_error",
                v.reason.clone(),
                Some(json!({ "field": v.field })),
            ),
            Self::BadRequest(m) => ("bad_request", m.clone(), None),
            Self::Unauthenticated(m) => ("unauthenticated", m.clone(), None),
            Self::Forbidden(m) => ("forbidden", m.clone(), None),
            Self::NotFound(_) | Self::Store(StoreError::NotFound) => {
                ("not_found", self.to_string(), None)
            }
            Self::Conflict(m) => ("conflict", m.clone(), None),
            Self::Store(StoreError::Conflict(_)) => {
                ("conflict", "resource already exists".to_string(), None)
            }
            Self::Store(_) => (
                "persistence_error",
                "a database error occurred".to_string(),
                None,
            ),
            Self::Render(e) => render_body(e),
            Self::RateLimited => ("rate_limited", self.to_string(), None),
            Self::Internal(_) => (
                "internal_error",
                "an internal error occurred".to_string(),
                None,
            ),
        };
        ErrorBody {
            error,
            message,
            details,
        }
    }
}

fn render_body(err: &RenderError) -> (&'static str, String, Option<Value>) {
    match err {
        RenderError::NoTemplate => ("no_template", err.to_string(), None),
        RenderError::TemplateNotFound(_) => ("template_not_found", err.to_string(), None),
        RenderError::TemplateNotOwned(_) => (
            "forbidden",
            "template belongs to another user".to_string(),
            None,
        ),
        RenderError::Markup(detail) => (
            "render_error",
            "failed to render invoice template".to_string(),
            Some(Value::String(detail.clone())),
        ),
        RenderError::Converter { stderr, .. } => (
            "render_error",
            "failed to generate pdf".to_string(),
            Some(Value::String(stderr.clone())),
        ),
        RenderError::ConverterTimeout(_) => ("render_error", err.to_string(), None),
        RenderError::ConverterUnavailable { .. } | RenderError::DataFetch(_) | RenderError::Io(_) => {
            ("render_error", "failed to generate pdf".to_string(), None)
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = ?self, "request failed");
        } else {
            debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(format!("invalid request body: {}", rejection.body_text()))
    }
}
