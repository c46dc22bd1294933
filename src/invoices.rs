//! Invoice lifecycle: create, read, list, update, delete and PDF generation.
//!
//! Every operation takes the caller's user id. Unknown ids fail with
//! `NotFound`; ids owned by someone else fail with `Forbidden`. Ownership and
//! validation are both settled before anything is written.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Months, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{RecordStore, StoreError};
use crate::errors::{AppError, Result};
use crate::invoice_gen::InvoiceGenerator;
use crate::invoice_number::generate_invoice_number;
use crate::models::{Invoice, InvoiceItem, InvoicePayload, InvoiceStatus};
use crate::validation::{ValidatedItem, ValidationError, validate_invoice};

#[derive(Clone)]
pub struct InvoiceService {
    store: Arc<dyn RecordStore>,
    generator: Arc<InvoiceGenerator>,
}

impl InvoiceService {
    pub fn new(store: Arc<dyn RecordStore>, generator: Arc<InvoiceGenerator>) -> Self {
        Self { store, generator }
    }

    /// Validates and stores a new invoice with its items.
    ///
    /// The status is always `draft`, whatever the payload says. The header
    /// and items are written as one unit; if any item fails, nothing is kept.
    pub async fn create(&self, caller: Uuid, payload: InvoicePayload) -> Result<Invoice> {
        let valid = validate_invoice(&payload)?;
        self.check_template(caller, valid.template_id).await?;
        let now = Utc::now();

        let invoice_date = valid.invoice_date.unwrap_or(now);
        let due_date = match valid.due_date {
            Some(due) => due,
            None => default_due_date(invoice_date)?,
        };

        let mut invoice = Invoice {
            id: Uuid::new_v4(),
            user_id: caller,
            template_id: valid.template_id,
            invoice_number: valid.invoice_number.unwrap_or_else(generate_invoice_number),
            status: InvoiceStatus::Draft,
            customer_name: valid.customer_name,
            customer_email: valid.customer_email,
            customer_address: valid.customer_address,
            invoice_date,
            due_date,
            currency: valid.currency,
            subtotal: valid.subtotal,
            tax_rate: valid.tax_rate,
            tax_amount: valid.tax_amount,
            total_amount: valid.total_amount,
            notes: valid.notes,
            pdf_path: None,
            created_at: now,
            updated_at: now,
            items: Vec::new(),
        };
        let items = build_items(invoice.id, valid.items.unwrap_or_default(), now)?;

        self.store.create_invoice(&invoice, &items).await.inspect_err(|e| {
            warn!(user_id = %caller, error = %e, "failed to create invoice");
        })?;

        info!(
            invoice_id = %invoice.id,
            user_id = %caller,
            items = items.len(),
            "invoice created"
        );
        invoice.items = items;
        Ok(invoice)
    }

    /// Fetches an invoice with its items.
    ///
    /// If only the item lookup fails, the invoice is returned with no items.
    pub async fn get(&self, caller: Uuid, id: Uuid) -> Result<Invoice> {
        let mut invoice = self.fetch_owned(caller, id).await?;

        invoice.items = match self.store.get_items_by_invoice(id).await {
            Ok(items) => items,
            Err(e) => {
                warn!(invoice_id = %id, error = %e, "failed to load invoice items, returning none");
                Vec::new()
            }
        };
        Ok(invoice)
    }

    /// All invoices owned by the caller, newest first, without items.
    pub async fn list(&self, caller: Uuid) -> Result<Vec<Invoice>> {
        Ok(self.store.list_invoices_by_user(caller).await?)
    }

    /// Replaces the invoice header with the payload.
    ///
    /// Absent `invoice_number`, `invoice_date` and `status` keep their stored
    /// values; an absent `due_date` is recomputed from the invoice date. When
    /// the payload carries `items` (even an empty list) the stored items are
    /// replaced by exactly that set; otherwise they are left alone.
    pub async fn update(&self, caller: Uuid, id: Uuid, payload: InvoicePayload) -> Result<Invoice> {
        let existing = self.fetch_owned(caller, id).await?;
        let valid = validate_invoice(&payload)?;
        self.check_template(caller, valid.template_id).await?;
        let now = Utc::now();

        let invoice_date = valid.invoice_date.unwrap_or(existing.invoice_date);
        let due_date = match valid.due_date {
            Some(due) => due,
            None => default_due_date(invoice_date)?,
        };

        let mut invoice = Invoice {
            id: existing.id,
            user_id: existing.user_id,
            template_id: valid.template_id,
            invoice_number: valid.invoice_number.unwrap_or(existing.invoice_number),
            status: valid.status.unwrap_or(existing.status),
            customer_name: valid.customer_name,
            customer_email: valid.customer_email,
            customer_address: valid.customer_address,
            invoice_date,
            due_date,
            currency: valid.currency,
            subtotal: valid.subtotal,
            tax_rate: valid.tax_rate,
            tax_amount: valid.tax_amount,
            total_amount: valid.total_amount,
            notes: valid.notes,
            pdf_path: existing.pdf_path,
            created_at: existing.created_at,
            updated_at: now,
            items: Vec::new(),
        };
        let items = valid
            .items
            .map(|items| build_items(id, items, now))
            .transpose()?;

        self.store
            .update_invoice(&invoice, items.as_deref())
            .await
            .map_err(|e| not_found_as("invoice", e))?;

        info!(
            invoice_id = %id,
            status = %invoice.status,
            items_replaced = items.is_some(),
            "invoice updated"
        );
        if let Some(items) = items {
            invoice.items = items;
        }
        Ok(invoice)
    }

    /// Deletes the invoice (its items go with it) and any rendered PDF.
    pub async fn delete(&self, caller: Uuid, id: Uuid) -> Result<()> {
        let invoice = self.fetch_owned(caller, id).await?;

        self.store
            .delete_invoice(id)
            .await
            .map_err(|e| not_found_as("invoice", e))?;

        if let Some(path) = invoice.pdf_path {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(invoice_id = %id, %path, error = %e, "failed to remove invoice pdf"),
            }
        }

        info!(invoice_id = %id, user_id = %caller, "invoice deleted");
        Ok(())
    }

    /// Renders the invoice to PDF and records the path on the invoice.
    ///
    /// A failure to record the path is logged and the generated path is
    /// still returned.
    pub async fn generate_pdf(&self, caller: Uuid, id: Uuid) -> Result<PathBuf> {
        let invoice = self.fetch_owned(caller, id).await?;

        let pdf_path = self.generator.generate_pdf(&invoice).await.inspect_err(|e| {
            warn!(invoice_id = %id, error = %e, "pdf generation failed");
        })?;

        let path_str = pdf_path.to_string_lossy();
        if let Err(e) = self.store.set_pdf_path(id, &path_str, Utc::now()).await {
            warn!(invoice_id = %id, error = %e, "pdf generated but path could not be saved");
        }

        Ok(pdf_path)
    }

    /// Locates the rendered PDF for download or preview.
    pub async fn pdf_file(&self, caller: Uuid, id: Uuid) -> Result<(Invoice, PathBuf)> {
        let invoice = self.fetch_owned(caller, id).await?;

        let Some(path) = invoice.pdf_path.as_deref().map(PathBuf::from) else {
            return Err(AppError::NotFound("invoice pdf"));
        };
        let exists = tokio::fs::try_exists(&path).await.map_err(|e| {
            AppError::Internal(format!("failed to check {}: {e}", path.display()))
        })?;
        if !exists {
            warn!(invoice_id = %id, path = %path.display(), "recorded pdf is missing on disk");
            return Err(AppError::NotFound("invoice pdf"));
        }
        Ok((invoice, path))
    }

    async fn fetch_owned(&self, caller: Uuid, id: Uuid) -> Result<Invoice> {
        let invoice = self
            .store
            .get_invoice(id)
            .await?
            .ok_or(AppError::NotFound("invoice"))?;

        if invoice.user_id != caller {
            warn!(invoice_id = %id, user_id = %caller, "invoice access denied");
            return Err(AppError::Forbidden(
                "you are not authorized to access this invoice".to_string(),
            ));
        }
        Ok(invoice)
    }

    /// An invoice may only reference an existing template of its own owner.
    async fn check_template(&self, caller: Uuid, template_id: Option<Uuid>) -> Result<()> {
        let Some(template_id) = template_id else {
            return Ok(());
        };
        let template = self.store.get_template(template_id).await?.ok_or_else(|| {
            ValidationError::new("template_id", format!("template {template_id} does not exist"))
        })?;

        if template.user_id != caller {
            warn!(%template_id, user_id = %caller, "invoice references a foreign template");
            return Err(AppError::Forbidden(
                "you are not authorized to use this template".to_string(),
            ));
        }
        Ok(())
    }
}

/// One calendar month after `invoice_date`, clamped to the month's last day.
pub fn default_due_date(invoice_date: DateTime<Utc>) -> Result<DateTime<Utc>> {
    invoice_date.checked_add_months(Months::new(1)).ok_or_else(|| {
        ValidationError::new("invoice_date", "invoice date is out of range").into()
    })
}

// Items share one timestamp, so submission order is carried by `position`.
fn build_items(
    invoice_id: Uuid,
    items: Vec<ValidatedItem>,
    now: DateTime<Utc>,
) -> Result<Vec<InvoiceItem>> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let position = i32::try_from(index)
                .map_err(|_| ValidationError::new("items", "too many items"))?;
            Ok(InvoiceItem {
                id: Uuid::new_v4(),
                invoice_id,
                position,
                description: item.description,
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price: item.total_price,
                created_at: now,
                updated_at: now,
            })
        })
        .collect()
}

// A row that vanished between the ownership check and the write.
fn not_found_as(entity: &'static str, err: StoreError) -> AppError {
    match err {
        StoreError::NotFound => AppError::NotFound(entity),
        other => other.into(),
    }
}
