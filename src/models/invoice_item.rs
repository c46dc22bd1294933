use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    /// Zero-based order in which the item was submitted.
    pub position: i32,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    /// Supplied by the caller; never recomputed from quantity and unit price.
    pub total_price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Line item as submitted by a client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InvoiceItemPayload {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub total_price: f64,
}
