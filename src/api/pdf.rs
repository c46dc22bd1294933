use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use super::AppState;
use super::extract::{AuthUser, parse_id};
use crate::errors::{AppError, Result};

#[derive(Clone, Copy)]
enum Disposition {
    Attachment,
    Inline,
}

pub async fn generate_pdf(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let path = state.invoices.generate_pdf(caller, parse_id(&id)?).await?;
    Ok(Json(json!({
        "message": "pdf generated successfully",
        "pdf_path": path.to_string_lossy(),
    })))
}

pub async fn download_pdf(
    state: State<AppState>,
    caller: AuthUser,
    id: Path<String>,
) -> Result<Response> {
    serve_pdf(state, caller, id, Disposition::Attachment).await
}

pub async fn preview_pdf(
    state: State<AppState>,
    caller: AuthUser,
    id: Path<String>,
) -> Result<Response> {
    serve_pdf(state, caller, id, Disposition::Inline).await
}

async fn serve_pdf(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
    disposition: Disposition,
) -> Result<Response> {
    let (invoice, path) = state.invoices.pdf_file(caller, parse_id(&id)?).await?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AppError::NotFound("invoice pdf"),
        _ => AppError::Internal(format!("failed to read {}: {e}", path.display())),
    })?;

    let filename = format!("invoice_{}.pdf", safe_filename(&invoice.invoice_number));
    let kind = match disposition {
        Disposition::Attachment => "attachment",
        Disposition::Inline => "inline",
    };
    let content_type = HeaderValue::from_str(mime::APPLICATION_PDF.as_ref())
        .map_err(|e| AppError::Internal(format!("bad content-type: {e}")))?;
    let content_disposition = HeaderValue::from_str(&format!("{kind}; filename=\"{filename}\""))
        .map_err(|e| AppError::Internal(format!("bad content-disposition: {e}")))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, content_disposition),
        ],
        bytes,
    )
        .into_response())
}

// Invoice numbers are validated on write, but rows seeded by other means may not be.
fn safe_filename(number: &str) -> String {
    number
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
