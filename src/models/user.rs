use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// An account that owns invoices and templates. Also the "company" shown on
/// rendered invoices.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub company_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
