#![allow(dead_code)]
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Months, Utc};
use uuid::Uuid;

use crate::db::{MemoryStore, RecordStore};
use crate::invoice_gen::{DocumentConverter, RenderError};
use crate::models::{Invoice, InvoiceItem, InvoiceItemPayload, InvoicePayload, InvoiceStatus, Template, User};
use tracing_subscriber::EnvFilter;

pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Converter double: records the HTML it was given and writes a stub PDF,
/// or fails with the configured stderr.
#[derive(Default)]
pub(crate) struct FakeConverter {
    seen_html: Mutex<Vec<String>>,
    fail_with: Option<String>,
}

impl FakeConverter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(stderr: &str) -> Self {
        Self {
            seen_html: Mutex::new(Vec::new()),
            fail_with: Some(stderr.to_string()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.seen_html.lock().unwrap().len()
    }

    pub(crate) fn last_html(&self) -> Option<String> {
        self.seen_html.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl DocumentConverter for FakeConverter {
    async fn convert(&self, html_path: &Path, pdf_path: &Path) -> Result<(), RenderError> {
        let html = tokio::fs::read_to_string(html_path).await?;
        self.seen_html.lock().unwrap().push(html);

        if let Some(stderr) = &self.fail_with {
            return Err(RenderError::Converter {
                status: Some(1),
                stderr: stderr.clone(),
            });
        }
        tokio::fs::write(pdf_path, b"%PDF-1.4\n% stub\n").await?;
        Ok(())
    }
}

pub(crate) async fn seed_user(store: &MemoryStore, email: &str) -> User {
    let local = email.split('@').next().unwrap_or(email);
    let mut chars = local.chars();
    let company_name = match chars.next() {
        Some(first) => format!("{}{} Co", first.to_uppercase(), chars.as_str()),
        None => "Co".to_string(),
    };
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        password_hash: "not-a-real-hash".to_string(),
        company_name,
        created_at: now,
        updated_at: now,
    };
    store.create_user(&user).await.unwrap();
    user
}

pub(crate) async fn seed_template(store: &MemoryStore, owner: Uuid, content: &str) -> Template {
    let now = Utc::now();
    let template = Template {
        id: Uuid::new_v4(),
        user_id: owner,
        name: "Standard".to_string(),
        language: "en".to_string(),
        background_url: None,
        logo_url: None,
        content: content.to_string(),
        created_at: now,
        updated_at: now,
    };
    store.create_template(&template).await.unwrap();
    template
}

/// Writes an invoice straight to the store, bypassing validation.
pub(crate) async fn seed_invoice(
    store: &MemoryStore,
    owner: Uuid,
    template_id: Option<Uuid>,
    item_descriptions: &[&str],
) -> Invoice {
    let now = Utc::now();
    let id = Uuid::new_v4();
    let items: Vec<InvoiceItem> = item_descriptions
        .iter()
        .enumerate()
        .map(|(position, description)| InvoiceItem {
            id: Uuid::new_v4(),
            invoice_id: id,
            position: position as i32,
            description: description.to_string(),
            quantity: 1.0,
            unit_price: 10.0,
            total_price: 10.0,
            created_at: now,
            updated_at: now,
        })
        .collect();
    let invoice = Invoice {
        id,
        user_id: owner,
        template_id,
        invoice_number: "INV-20240101-000001".to_string(),
        status: InvoiceStatus::Draft,
        customer_name: "Globex".to_string(),
        customer_email: Some("ap@globex.example".to_string()),
        customer_address: None,
        invoice_date: now,
        due_date: now.checked_add_months(Months::new(1)).unwrap(),
        currency: "USD".to_string(),
        subtotal: 10.0 * items.len() as f64,
        tax_rate: 0.0,
        tax_amount: 0.0,
        total_amount: 10.0 * items.len() as f64,
        notes: None,
        pdf_path: None,
        created_at: now,
        updated_at: now,
        items: Vec::new(),
    };
    store.create_invoice(&invoice, &items).await.unwrap();
    invoice
}

pub(crate) fn sample_payload() -> InvoicePayload {
    InvoicePayload {
        customer_name: "Acme Corp".to_string(),
        customer_email: Some("billing@acme.example".to_string()),
        subtotal: 100.0,
        tax_rate: 10.0,
        tax_amount: 10.0,
        total_amount: 110.0,
        ..Default::default()
    }
}

pub(crate) fn item_payload(description: &str, quantity: f64, unit_price: f64) -> InvoiceItemPayload {
    InvoiceItemPayload {
        description: description.to_string(),
        quantity,
        unit_price,
        total_price: quantity * unit_price,
    }
}
