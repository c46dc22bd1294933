//! In-process record store.
//!
//! Keeps every table behind one lock so that a multi-row write is applied in
//! a single critical section, the same all-or-nothing contract the Postgres
//! store gets from a transaction. Used by the test suites and for local runs
//! without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{RecordStore, StoreError, StoreResult};
use crate::models::{Invoice, InvoiceItem, Template, User};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    invoices: HashMap<Uuid, Invoice>,
    items: Vec<InvoiceItem>,
    templates: HashMap<Uuid, Template>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_item_writes: AtomicBool,
    fail_item_reads: AtomicBool,
    fail_pdf_path_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write that carries line items fail, as a constraint
    /// violation on the items table would.
    pub fn fail_item_writes(&self, fail: bool) {
        self.fail_item_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_item_reads(&self, fail: bool) {
        self.fail_item_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_pdf_path_writes(&self, fail: bool) {
        self.fail_pdf_path_writes.store(fail, Ordering::SeqCst);
    }

    pub fn invoice_count(&self) -> usize {
        self.read().map(|t| t.invoices.len()).unwrap_or(0)
    }

    pub fn item_count(&self) -> usize {
        self.read().map(|t| t.items.len()).unwrap_or(0)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn check_item_write(&self, items: &[InvoiceItem]) -> StoreResult<()> {
        if !items.is_empty() && self.fail_item_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "insert into invoice_items failed".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_user(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.write()?;
        if tables
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Conflict(format!(
                "email {} already registered",
                user.email
            )));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_invoice(&self, invoice: &Invoice, items: &[InvoiceItem]) -> StoreResult<()> {
        // Checked before touching the tables so a failure leaves nothing behind.
        self.check_item_write(items)?;

        let mut tables = self.write()?;
        if tables.invoices.contains_key(&invoice.id) {
            return Err(StoreError::Conflict(format!("invoice {} exists", invoice.id)));
        }
        let mut header = invoice.clone();
        header.items.clear();
        tables.invoices.insert(header.id, header);
        tables.items.extend_from_slice(items);
        Ok(())
    }

    async fn get_invoice(&self, id: Uuid) -> StoreResult<Option<Invoice>> {
        Ok(self.read()?.invoices.get(&id).cloned())
    }

    async fn list_invoices_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Invoice>> {
        let tables = self.read()?;
        let mut invoices: Vec<Invoice> = tables
            .invoices
            .values()
            .filter(|inv| inv.user_id == user_id)
            .cloned()
            .collect();
        invoices.sort_by(|a, b| {
            b.invoice_date
                .cmp(&a.invoice_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(invoices)
    }

    async fn update_invoice(
        &self,
        invoice: &Invoice,
        items: Option<&[InvoiceItem]>,
    ) -> StoreResult<()> {
        if let Some(items) = items {
            self.check_item_write(items)?;
        }

        let mut tables = self.write()?;
        let Some(stored) = tables.invoices.get_mut(&invoice.id) else {
            return Err(StoreError::NotFound);
        };
        let mut header = invoice.clone();
        header.items.clear();
        *stored = header;

        if let Some(items) = items {
            tables.items.retain(|item| item.invoice_id != invoice.id);
            tables.items.extend_from_slice(items);
        }
        Ok(())
    }

    async fn set_pdf_path(
        &self,
        id: Uuid,
        pdf_path: &str,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if self.fail_pdf_path_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("update of invoices failed".to_string()));
        }
        let mut tables = self.write()?;
        let invoice = tables.invoices.get_mut(&id).ok_or(StoreError::NotFound)?;
        invoice.pdf_path = Some(pdf_path.to_string());
        invoice.updated_at = updated_at;
        Ok(())
    }

    async fn delete_invoice(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.write()?;
        if tables.invoices.remove(&id).is_none() {
            return Err(StoreError::NotFound);
        }
        tables.items.retain(|item| item.invoice_id != id);
        Ok(())
    }

    async fn get_items_by_invoice(&self, invoice_id: Uuid) -> StoreResult<Vec<InvoiceItem>> {
        if self.fail_item_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("select from invoice_items failed".to_string()));
        }
        let mut items: Vec<InvoiceItem> = self
            .read()?
            .items
            .iter()
            .filter(|item| item.invoice_id == invoice_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.position.cmp(&b.position).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn create_template(&self, template: &Template) -> StoreResult<()> {
        self.write()?.templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn get_template(&self, id: Uuid) -> StoreResult<Option<Template>> {
        Ok(self.read()?.templates.get(&id).cloned())
    }

    async fn list_templates_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Template>> {
        let mut templates: Vec<Template> = self
            .read()?
            .templates
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(templates)
    }
}
