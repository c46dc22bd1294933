use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use dotenvy::dotenv;
use serde::Deserialize;

/// Configuration for the application
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,
    /// HMAC secret used to sign and verify access tokens
    pub jwt_secret: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Directory rendered PDFs are written to
    #[serde(default = "default_pdf_storage_path")]
    pub pdf_storage_path: PathBuf,
    /// Directory for the transient HTML handed to the converter
    #[serde(default = "std::env::temp_dir")]
    pub render_work_dir: PathBuf,
    #[serde(default = "default_converter_bin")]
    pub converter_bin: String,
    #[serde(default = "default_converter_timeout_secs")]
    pub converter_timeout_secs: u64,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
    #[serde(default = "default_auth_rate_limit")]
    pub auth_rate_limit_per_minute: u32,
    /// Comma separated list of allowed browser origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_pdf_storage_path() -> PathBuf {
    PathBuf::from("./storage/pdfs")
}

fn default_converter_bin() -> String {
    "wkhtmltopdf".to_string()
}

fn default_converter_timeout_secs() -> u64 {
    60
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_rate_limit() -> u32 {
    100
}

fn default_auth_rate_limit() -> u32 {
    5
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_db_max_connections() -> u32 {
    25
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// This function will:
    /// 1. Load variables from .env file if it exists
    /// 2. Deserialize environment variables into Config struct
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenv().ok();

        // Parse environment variables into Config struct
        let config = envy::from_env::<Config>().context("invalid environment configuration")?;
        config.check()?;

        Ok(config)
    }

    /// Build a configuration from explicit key/value pairs instead of the
    /// process environment.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Config>(vars).context("invalid configuration")?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.jwt_secret.trim().is_empty() {
            bail!("JWT_SECRET must not be empty");
        }
        if self.converter_timeout_secs == 0 {
            bail!("CONVERTER_TIMEOUT_SECS must be greater than zero");
        }
        if self.token_ttl_hours <= 0 {
            bail!("TOKEN_TTL_HOURS must be greater than zero");
        }
        if self.db_max_connections == 0 {
            bail!("DB_MAX_CONNECTIONS must be greater than zero");
        }
        Ok(())
    }

    /// Get a direct reference to the database URL
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn converter_timeout(&self) -> Duration {
        Duration::from_secs(self.converter_timeout_secs)
    }
}

/// Load configuration from the environment and any `.env` file
pub fn init() -> Result<Config> {
    Config::load()
}
