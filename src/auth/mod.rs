//! Registration, login and bearer-token verification.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{RecordStore, StoreError};
use crate::errors::{AppError, Result};
use crate::models::User;
use crate::validation::{normalize_email, require, sanitize};

pub mod password;
mod token;

pub use token::{Claims, TokenKeys};

const COMPANY_NAME_MAX: usize = 255;
const BAD_CREDENTIALS: &str = "invalid email or password";

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn RecordStore>,
    keys: Arc<TokenKeys>,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(store: Arc<dyn RecordStore>, secret: &[u8], token_ttl: Duration) -> Self {
        Self {
            store,
            keys: Arc::new(TokenKeys::new(secret)),
            token_ttl,
        }
    }

    /// Creates an account. The email is stored lowercased.
    pub async fn register(&self, email: &str, password: &str, company_name: &str) -> Result<User> {
        let email = normalize_email(email, "email")?;
        password::validate_strength(password)?;
        let company_name = sanitize(
            &require(company_name, "company_name", "company name")?,
            COMPANY_NAME_MAX,
        );

        if self.store.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("email already registered".to_string()));
        }

        let password_hash = hash_off_thread(password.to_string()).await?;
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash,
            company_name,
            created_at: now,
            updated_at: now,
        };

        // A concurrent registration can still win the unique index.
        self.store.create_user(&user).await.map_err(|e| match e {
            StoreError::Conflict(_) => AppError::Conflict("email already registered".to_string()),
            other => other.into(),
        })?;

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Returns a signed access token for valid credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let Ok(email) = normalize_email(email, "email") else {
            return Err(AppError::Unauthenticated(BAD_CREDENTIALS.to_string()));
        };

        let Some(user) = self.store.get_user_by_email(&email).await? else {
            warn!("login attempt for unknown email");
            return Err(AppError::Unauthenticated(BAD_CREDENTIALS.to_string()));
        };

        let candidate = password.to_string();
        let stored = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || password::verify(&candidate, &stored))
            .await
            .map_err(|e| AppError::Internal(format!("password check panicked: {e}")))?;
        if !matches {
            warn!(user_id = %user.id, "login attempt with wrong password");
            return Err(AppError::Unauthenticated(BAD_CREDENTIALS.to_string()));
        }

        let token = self
            .keys
            .sign(&Claims::new(user.id, self.token_ttl))
            .map_err(|e| AppError::Internal(format!("failed to sign token: {e}")))?;

        info!(user_id = %user.id, "user logged in");
        Ok(token)
    }

    pub fn authenticate(&self, token: &str) -> Result<Claims> {
        self.keys.verify(token).map_err(|e| {
            warn!(error = %e, "rejected access token");
            AppError::Unauthenticated("invalid or expired token".to_string())
        })
    }
}

async fn hash_off_thread(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || password::hash(&password))
        .await
        .map_err(|e| AppError::Internal(format!("password hashing panicked: {e}")))?
        .map_err(|e| AppError::Internal(format!("failed to hash password: {e}")))
}
