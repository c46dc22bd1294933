use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::models::{Invoice, InvoiceItem, Template, User};

mod memory;

pub use memory::MemoryStore;

const INVOICE_COLUMNS: &str = "id, user_id, template_id, invoice_number, status, customer_name, \
     customer_email, customer_address, invoice_date, due_date, currency, subtotal, tax_rate, \
     tax_amount, total_amount, notes, pdf_path, created_at, updated_at";

const ITEM_COLUMNS: &str =
    "id, invoice_id, position, description, quantity, unit_price, total_price, created_at, updated_at";

const TEMPLATE_COLUMNS: &str =
    "id, user_id, name, language, background_url, logo_url, content, created_at, updated_at";

const USER_COLUMNS: &str = "id, email, password_hash, company_name, created_at, updated_at";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("duplicate record: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            // 23505 = unique_violation
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::Conflict(db_err.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable persistence for users, invoices, items and templates.
///
/// Invoice writes take the header and its items together: an implementation
/// must apply both or neither.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_user(&self, user: &User) -> StoreResult<()>;
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn create_invoice(&self, invoice: &Invoice, items: &[InvoiceItem]) -> StoreResult<()>;
    async fn get_invoice(&self, id: Uuid) -> StoreResult<Option<Invoice>>;
    async fn list_invoices_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Invoice>>;
    /// Overwrites the header. When `items` is `Some`, the stored item set is
    /// replaced by exactly those items.
    async fn update_invoice(
        &self,
        invoice: &Invoice,
        items: Option<&[InvoiceItem]>,
    ) -> StoreResult<()>;
    async fn set_pdf_path(&self, id: Uuid, pdf_path: &str, updated_at: DateTime<Utc>)
    -> StoreResult<()>;
    /// Deletes the invoice and its items.
    async fn delete_invoice(&self, id: Uuid) -> StoreResult<()>;
    async fn get_items_by_invoice(&self, invoice_id: Uuid) -> StoreResult<Vec<InvoiceItem>>;

    async fn create_template(&self, template: &Template) -> StoreResult<()>;
    async fn get_template(&self, id: Uuid) -> StoreResult<Option<Template>>;
    async fn list_templates_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Template>>;
}

/// PostgreSQL-backed record store
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new Database instance with a connection pool
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .connect(config.database_url())
            .await
            .context("failed to connect to database")?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(self.get_pool())
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    async fn insert_items(
        tx: &mut Transaction<'_, Postgres>,
        items: &[InvoiceItem],
    ) -> StoreResult<()> {
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO invoice_items (id, invoice_id, position, description, quantity, unit_price, total_price, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.id)
            .bind(item.invoice_id)
            .bind(item.position)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.total_price)
            .bind(item.created_at)
            .bind(item.updated_at)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn create_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, company_name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.company_name)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(self.get_pool())
        .await?;

        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(user)
    }

    async fn create_invoice(&self, invoice: &Invoice, items: &[InvoiceItem]) -> StoreResult<()> {
        // Begin a transaction
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO invoices (id, user_id, template_id, invoice_number, status, customer_name,
                customer_email, customer_address, invoice_date, due_date, currency, subtotal,
                tax_rate, tax_amount, total_amount, notes, pdf_path, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.user_id)
        .bind(invoice.template_id)
        .bind(&invoice.invoice_number)
        .bind(invoice.status.as_str())
        .bind(&invoice.customer_name)
        .bind(&invoice.customer_email)
        .bind(&invoice.customer_address)
        .bind(invoice.invoice_date)
        .bind(invoice.due_date)
        .bind(&invoice.currency)
        .bind(invoice.subtotal)
        .bind(invoice.tax_rate)
        .bind(invoice.tax_amount)
        .bind(invoice.total_amount)
        .bind(&invoice.notes)
        .bind(&invoice.pdf_path)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *tx)
        .await?;

        Self::insert_items(&mut tx, items).await?;

        // Commit the transaction
        tx.commit().await?;

        Ok(())
    }

    async fn get_invoice(&self, id: Uuid) -> StoreResult<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(invoice)
    }

    async fn list_invoices_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Invoice>> {
        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE user_id = $1 ORDER BY invoice_date DESC, created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(self.get_pool())
        .await?;

        Ok(invoices)
    }

    async fn update_invoice(
        &self,
        invoice: &Invoice,
        items: Option<&[InvoiceItem]>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET template_id = $2, invoice_number = $3, status = $4, customer_name = $5,
                customer_email = $6, customer_address = $7, invoice_date = $8, due_date = $9,
                currency = $10, subtotal = $11, tax_rate = $12, tax_amount = $13,
                total_amount = $14, notes = $15, pdf_path = $16, updated_at = $17
            WHERE id = $1
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.template_id)
        .bind(&invoice.invoice_number)
        .bind(invoice.status.as_str())
        .bind(&invoice.customer_name)
        .bind(&invoice.customer_email)
        .bind(&invoice.customer_address)
        .bind(invoice.invoice_date)
        .bind(invoice.due_date)
        .bind(&invoice.currency)
        .bind(invoice.subtotal)
        .bind(invoice.tax_rate)
        .bind(invoice.tax_amount)
        .bind(invoice.total_amount)
        .bind(&invoice.notes)
        .bind(&invoice.pdf_path)
        .bind(invoice.updated_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        // Replace the item set wholesale
        if let Some(items) = items {
            sqlx::query("DELETE FROM invoice_items WHERE invoice_id = $1")
                .bind(invoice.id)
                .execute(&mut *tx)
                .await?;

            Self::insert_items(&mut tx, items).await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn set_pdf_path(
        &self,
        id: Uuid,
        pdf_path: &str,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE invoices SET pdf_path = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(pdf_path)
            .bind(updated_at)
            .execute(self.get_pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_invoice(&self, id: Uuid) -> StoreResult<()> {
        // invoice_items rows go with it (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(id)
            .execute(self.get_pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn get_items_by_invoice(&self, invoice_id: Uuid) -> StoreResult<Vec<InvoiceItem>> {
        let items = sqlx::query_as::<_, InvoiceItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM invoice_items WHERE invoice_id = $1 ORDER BY position ASC, id ASC"
        ))
        .bind(invoice_id)
        .fetch_all(self.get_pool())
        .await?;

        Ok(items)
    }

    async fn create_template(&self, template: &Template) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO templates (id, user_id, name, language, background_url, logo_url, content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(template.id)
        .bind(template.user_id)
        .bind(&template.name)
        .bind(&template.language)
        .bind(&template.background_url)
        .bind(&template.logo_url)
        .bind(&template.content)
        .bind(template.created_at)
        .bind(template.updated_at)
        .execute(self.get_pool())
        .await?;

        Ok(())
    }

    async fn get_template(&self, id: Uuid) -> StoreResult<Option<Template>> {
        let template = sqlx::query_as::<_, Template>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.get_pool())
        .await?;

        Ok(template)
    }

    async fn list_templates_by_user(&self, user_id: Uuid) -> StoreResult<Vec<Template>> {
        let templates = sqlx::query_as::<_, Template>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE user_id = $1 ORDER BY name ASC"
        ))
        .bind(user_id)
        .fetch_all(self.get_pool())
        .await?;

        Ok(templates)
    }
}

/// Initialize the database connection pool
pub async fn init(config: &Config) -> Result<Database> {
    let db = Database::new(config).await?;
    info!(
        max_connections = config.db_max_connections,
        "database connection pool established"
    );

    Ok(db)
}
