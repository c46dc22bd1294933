use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use invoice_service::api::{self, ApiSettings, AppState};
use invoice_service::auth::AuthService;
use invoice_service::config::{self, Config};
use invoice_service::db::{self, RecordStore};
use invoice_service::invoice_gen::{InvoiceGenerator, WkhtmltopdfConverter};
use invoice_service::invoices::InvoiceService;
use invoice_service::templates::TemplateService;

#[derive(Parser)]
#[command(name = "invoice-service", version, about = "Multi-tenant invoice backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (the default)
    Serve {
        /// Address to listen on, overriding BIND_ADDR
        #[arg(long)]
        bind: Option<String>,
    },
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = config::init()?;

    // Initialize database connection
    let db = db::init(&config).await?;

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Migrate => {
            db.migrate().await?;
            info!("migrations applied");
            Ok(())
        }
        Command::Serve { bind } => {
            db.migrate().await?;
            let bind = bind.unwrap_or_else(|| config.bind_addr.clone());
            serve(&config, Arc::new(db), &bind).await
        }
    }
}

async fn serve(config: &Config, store: Arc<dyn RecordStore>, bind: &str) -> Result<()> {
    let converter = Arc::new(WkhtmltopdfConverter::new(
        &config.converter_bin,
        config.converter_timeout(),
    ));
    let generator = InvoiceGenerator::new(
        store.clone(),
        converter,
        &config.pdf_storage_path,
        &config.render_work_dir,
    )
    .with_context(|| {
        format!(
            "failed to prepare pdf directories {} and {}",
            config.pdf_storage_path.display(),
            config.render_work_dir.display()
        )
    })?;

    let state = AppState {
        auth: AuthService::new(
            store.clone(),
            config.jwt_secret.as_bytes(),
            Duration::hours(config.token_ttl_hours),
        ),
        invoices: InvoiceService::new(store.clone(), Arc::new(generator)),
        templates: TemplateService::new(store),
    };
    let app = api::router(state, &ApiSettings::from(config));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(addr = %listener.local_addr()?, "invoice service listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("invoice service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
