use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;
use serde_json::{Value, json};

use super::AppState;
use super::extract::{AuthUser, parse_id};
use crate::errors::Result;
use crate::models::{Invoice, InvoiceItem, InvoicePayload};

/// Single-invoice response: the invoice fields plus an `items` array that is
/// present even when empty.
#[derive(Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    invoice: Invoice,
    items: Vec<InvoiceItem>,
}

pub async fn create_invoice(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    body: std::result::Result<Json<InvoicePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>)> {
    let Json(payload) = body?;
    let invoice = state.invoices.create(caller, payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "invoice created successfully", "invoice_id": invoice.id })),
    ))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Value>> {
    let invoices = state.invoices.list(caller).await?;
    Ok(Json(json!({ "invoices": invoices })))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<InvoiceDetail>> {
    let mut invoice = state.invoices.get(caller, parse_id(&id)?).await?;
    let items = std::mem::take(&mut invoice.items);
    Ok(Json(InvoiceDetail { invoice, items }))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
    body: std::result::Result<Json<InvoicePayload>, JsonRejection>,
) -> Result<Json<Value>> {
    let id = parse_id(&id)?;
    let Json(payload) = body?;
    state.invoices.update(caller, id, payload).await?;
    Ok(Json(json!({ "message": "invoice updated successfully" })))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    state.invoices.delete(caller, parse_id(&id)?).await?;
    Ok(Json(json!({ "message": "invoice deleted successfully" })))
}
