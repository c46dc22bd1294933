use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::RecordStore;
use crate::models::{Invoice, InvoiceItem, User};

mod converter;

pub use converter::{DocumentConverter, WkhtmltopdfConverter};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invoice does not have a template assigned")]
    NoTemplate,

    #[error("template {0} not found")]
    TemplateNotFound(Uuid),

    #[error("template {0} does not belong to the invoice owner")]
    TemplateNotOwned(Uuid),

    #[error("failed to load invoice data: {0}")]
    DataFetch(String),

    #[error("failed to render template: {0}")]
    Markup(String),

    #[error("i/o error while rendering: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not start converter `{program}`: {reason}")]
    ConverterUnavailable { program: String, reason: String },

    #[error("converter failed with exit status {status:?}")]
    Converter { status: Option<i32>, stderr: String },

    #[error("converter did not finish within {0:?}")]
    ConverterTimeout(Duration),
}

/// Everything a template can reference.
#[derive(Serialize)]
struct TemplateData<'a> {
    invoice: &'a Invoice,
    items: &'a [InvoiceItem],
    company: &'a User,
}

/// Service for rendering invoices to PDF through a user's HTML template
pub struct InvoiceGenerator {
    store: Arc<dyn RecordStore>,
    converter: Arc<dyn DocumentConverter>,
    output_dir: PathBuf,
    work_dir: PathBuf,
}

impl InvoiceGenerator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        converter: Arc<dyn DocumentConverter>,
        output_dir: impl AsRef<Path>,
        work_dir: impl AsRef<Path>,
    ) -> std::io::Result<Self> {
        // Create the directories if they don't exist
        std::fs::create_dir_all(output_dir.as_ref())?;
        std::fs::create_dir_all(work_dir.as_ref())?;

        // The converter runs with the work dir as cwd, so paths must be absolute
        Ok(Self {
            store,
            converter,
            output_dir: std::fs::canonicalize(output_dir)?,
            work_dir: std::fs::canonicalize(work_dir)?,
        })
    }

    pub fn pdf_path_for(&self, invoice_id: Uuid) -> PathBuf {
        self.output_dir.join(format!("invoice_{invoice_id}.pdf"))
    }

    /// Render `invoice` through its template and convert the result to PDF.
    ///
    /// Returns the path of the written PDF. The transient HTML is removed
    /// whether or not the converter succeeds. Nothing is written back to the
    /// invoice record here.
    pub async fn generate_pdf(&self, invoice: &Invoice) -> Result<PathBuf, RenderError> {
        let template_id = invoice.template_id.ok_or(RenderError::NoTemplate)?;

        let template = self
            .store
            .get_template(template_id)
            .await
            .map_err(|e| RenderError::DataFetch(format!("template {template_id}: {e}")))?
            .ok_or(RenderError::TemplateNotFound(template_id))?;
        if template.user_id != invoice.user_id {
            return Err(RenderError::TemplateNotOwned(template_id));
        }

        let items = self
            .store
            .get_items_by_invoice(invoice.id)
            .await
            .map_err(|e| RenderError::DataFetch(format!("invoice items: {e}")))?;

        let company = self
            .store
            .get_user(invoice.user_id)
            .await
            .map_err(|e| RenderError::DataFetch(format!("invoice owner: {e}")))?
            .ok_or_else(|| {
                RenderError::DataFetch(format!("invoice owner {} not found", invoice.user_id))
            })?;

        let html = render_html(
            &template.content,
            &TemplateData {
                invoice,
                items: &items,
                company: &company,
            },
        )?;

        let mut transient = tempfile::Builder::new()
            .prefix(&format!("invoice_{}_", invoice.id))
            .suffix(".html")
            .tempfile_in(&self.work_dir)?;
        transient.write_all(html.as_bytes())?;
        transient.flush()?;

        let pdf_path = self.pdf_path_for(invoice.id);
        let converted = self.converter.convert(transient.path(), &pdf_path).await;

        if let Err(e) = transient.close() {
            warn!(invoice_id = %invoice.id, error = %e, "failed to remove transient html");
        }
        converted?;

        info!(invoice_id = %invoice.id, path = %pdf_path.display(), "invoice pdf generated");
        Ok(pdf_path)
    }
}

fn render_html(source: &str, data: &TemplateData<'_>) -> Result<String, RenderError> {
    let context = Context::from_serialize(data).map_err(|e| RenderError::Markup(error_chain(&e)))?;
    Tera::one_off(source, &context, true).map_err(|e| RenderError::Markup(error_chain(&e)))
}

/// Checks that `source` parses as a template without rendering it.
pub fn check_template_syntax(source: &str) -> Result<(), RenderError> {
    let mut tera = Tera::default();
    tera.add_raw_template("__check__", source)
        .map(|_| ())
        .map_err(|e| RenderError::Markup(error_chain(&e)))
}

// Tera keeps the useful part (line, column, missing variable) in the source chain.
fn error_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
