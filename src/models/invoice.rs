use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{InvoiceItem, InvoiceItemPayload};

/// Lifecycle state of an invoice. New invoices always start as `Draft`;
/// moving between the other states is driven by clients through updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    Paid,
    Overdue,
    Void,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 5] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Void,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Void => "void",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown invoice status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for InvoiceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        InvoiceStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl TryFrom<String> for InvoiceStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Invoice header plus, when loaded for a single read, its line items.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize)]
pub struct Invoice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub template_id: Option<Uuid>,
    pub invoice_number: String,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_address: Option<String>,
    pub invoice_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub currency: String,
    pub subtotal: f64,
    pub tax_rate: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
    pub notes: Option<String>,
    pub pdf_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<InvoiceItem>,
}

/// Untrusted invoice body for create and update requests. Server-owned
/// fields (`id`, `user_id`, `pdf_path`, timestamps) are not part of it and
/// are ignored if a client sends them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InvoicePayload {
    pub template_id: Option<Uuid>,
    pub invoice_number: Option<String>,
    pub status: Option<String>,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_address: Option<String>,
    pub invoice_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub currency: Option<String>,
    pub subtotal: f64,
    pub tax_rate: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
    pub notes: Option<String>,
    pub items: Option<Vec<InvoiceItemPayload>>,
}
