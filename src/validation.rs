//! Field-level checks for untrusted invoice input.
//!
//! Everything here is a pure function of its input: no clock, no store. A
//! payload that fails once fails the same way every time it is resubmitted.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{InvoiceItemPayload, InvoicePayload, InvoiceStatus};

pub const MAX_AMOUNT: f64 = 999_999_999.99;
pub const DEFAULT_CURRENCY: &str = "USD";

const CUSTOMER_NAME_MAX: usize = 255;
const CUSTOMER_ADDRESS_MAX: usize = 500;
const NOTES_MAX: usize = 1000;
const ITEM_DESCRIPTION_MAX: usize = 500;
const EMAIL_MAX: usize = 255;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});
static INVOICE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,50}$").expect("valid invoice number regex"));

/// A rejected field and a human readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Normalized invoice values, ready for the lifecycle manager to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInvoice {
    pub template_id: Option<Uuid>,
    /// `None` when the client left it blank; the caller generates one.
    pub invoice_number: Option<String>,
    pub status: Option<InvoiceStatus>,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_address: Option<String>,
    pub invoice_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub currency: String,
    pub subtotal: f64,
    pub tax_rate: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
    pub notes: Option<String>,
    /// `None` when the payload carried no `items` key at all.
    pub items: Option<Vec<ValidatedItem>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub total_price: f64,
}

/// Runs every invoice rule in order and stops at the first failure.
pub fn validate_invoice(payload: &InvoicePayload) -> Result<ValidatedInvoice, ValidationError> {
    let invoice_number = match non_blank(payload.invoice_number.as_deref()) {
        Some(number) => Some(validate_invoice_number(number)?.to_string()),
        None => None,
    };

    let customer_name = require(&payload.customer_name, "customer_name", "customer name")?;
    let customer_name = sanitize(&customer_name, CUSTOMER_NAME_MAX);

    let customer_email = non_blank(payload.customer_email.as_deref())
        .map(|email| normalize_email(email, "customer_email"))
        .transpose()?;

    let customer_address =
        non_blank(payload.customer_address.as_deref()).map(|a| sanitize(a, CUSTOMER_ADDRESS_MAX));

    validate_amount(payload.subtotal, "subtotal", "subtotal")?;
    validate_tax_rate(payload.tax_rate)?;
    validate_amount(payload.tax_amount, "tax_amount", "tax amount")?;
    validate_amount(payload.total_amount, "total_amount", "total amount")?;

    let currency = match non_blank(payload.currency.as_deref()) {
        Some(code) => normalize_currency(code)?,
        None => DEFAULT_CURRENCY.to_string(),
    };

    let notes = non_blank(payload.notes.as_deref()).map(|n| sanitize(n, NOTES_MAX));

    let status = non_blank(payload.status.as_deref())
        .map(|s| {
            s.parse::<InvoiceStatus>().map_err(|_| {
                ValidationError::new(
                    "status",
                    format!("invalid status: {s} (expected draft, sent, paid, overdue or void)"),
                )
            })
        })
        .transpose()?;

    let items = payload
        .items
        .as_ref()
        .map(|items| {
            items
                .iter()
                .enumerate()
                .map(|(index, item)| validate_item(item, index + 1))
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    Ok(ValidatedInvoice {
        template_id: payload.template_id,
        invoice_number,
        status,
        customer_name,
        customer_email,
        customer_address,
        invoice_date: payload.invoice_date,
        due_date: payload.due_date,
        currency,
        subtotal: payload.subtotal,
        tax_rate: payload.tax_rate,
        tax_amount: payload.tax_amount,
        total_amount: payload.total_amount,
        notes,
        items,
    })
}

fn validate_item(item: &InvoiceItemPayload, position: usize) -> Result<ValidatedItem, ValidationError> {
    let field = |name: &str| format!("items[{position}].{name}");

    let description = require(&item.description, &field("description"), "item description")
        .map_err(|e| ValidationError::new(e.field, format!("{} (item {position})", e.reason)))?;
    if !(item.quantity.is_finite() && item.quantity > 0.0) {
        return Err(ValidationError::new(
            field("quantity"),
            format!("item quantity must be positive (item {position})"),
        ));
    }
    validate_amount(item.unit_price, &field("unit_price"), "item unit price")?;
    validate_amount(item.total_price, &field("total_price"), "item total price")?;

    Ok(ValidatedItem {
        description: sanitize(&description, ITEM_DESCRIPTION_MAX),
        quantity: item.quantity,
        unit_price: item.unit_price,
        total_price: item.total_price,
    })
}

pub fn validate_invoice_number(number: &str) -> Result<&str, ValidationError> {
    if INVOICE_NUMBER_RE.is_match(number) {
        Ok(number)
    } else {
        Err(ValidationError::new(
            "invoice_number",
            "invoice number must be 1-50 characters of letters, digits, '-' or '_'",
        ))
    }
}

/// Trims and lowercases an email address, rejecting malformed ones.
pub fn normalize_email(raw: &str, field: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::new(field, "email cannot be empty"));
    }
    if email.chars().count() > EMAIL_MAX {
        return Err(ValidationError::new(field, "email is too long (max 255 characters)"));
    }
    if !EMAIL_RE.is_match(&email) {
        return Err(ValidationError::new(field, "invalid email format"));
    }
    Ok(email)
}

pub fn validate_amount(amount: f64, field: &str, label: &str) -> Result<(), ValidationError> {
    if amount.is_nan() || amount < 0.0 {
        return Err(ValidationError::new(field, format!("{label} cannot be negative")));
    }
    if amount > MAX_AMOUNT {
        return Err(ValidationError::new(
            field,
            format!("{label} exceeds maximum allowed value"),
        ));
    }
    Ok(())
}

pub fn validate_tax_rate(rate: f64) -> Result<(), ValidationError> {
    if (0.0..=100.0).contains(&rate) {
        Ok(())
    } else {
        Err(ValidationError::new("tax_rate", "tax rate must be between 0 and 100"))
    }
}

fn normalize_currency(code: &str) -> Result<String, ValidationError> {
    let code = code.trim().to_ascii_uppercase();
    if code.len() == 3 && code.bytes().all(|b| b.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(ValidationError::new(
            "currency",
            "currency must be a 3-letter code",
        ))
    }
}

/// Returns the trimmed value, or an error naming `label` if nothing is left.
pub fn require(value: &str, field: &str, label: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::new(field, format!("{label} is required")))
    } else {
        Ok(trimmed.to_string())
    }
}

/// Trims whitespace and caps the length at `max_chars` characters.
pub fn sanitize(input: &str, max_chars: usize) -> String {
    let trimmed = input.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => trimmed[..cut].to_string(),
        None => trimmed.to_string(),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
