//! HTTP surface. Every route except registration, login and health requires
//! a bearer token.

use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router, middleware as axum_middleware};
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::AuthService;
use crate::config::Config;
use crate::invoices::InvoiceService;
use crate::templates::TemplateService;

mod error;
mod extract;
mod invoices;
mod middleware;
mod pdf;
mod rate_limit;
mod templates;
mod users;

pub use error::ErrorBody;
pub use extract::AuthUser;
pub use rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub invoices: InvoiceService,
    pub templates: TemplateService,
}

/// Router-level knobs taken from the configuration.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub rate_limit_per_minute: u32,
    pub auth_rate_limit_per_minute: u32,
    pub cors_origins: Vec<String>,
}

impl From<&Config> for ApiSettings {
    fn from(config: &Config) -> Self {
        Self {
            rate_limit_per_minute: config.rate_limit_per_minute,
            auth_rate_limit_per_minute: config.auth_rate_limit_per_minute,
            cors_origins: config.cors_origins.clone(),
        }
    }
}

pub fn router(state: AppState, settings: &ApiSettings) -> Router {
    let auth_limiter = Arc::new(RateLimiter::per_minute(
        "auth",
        settings.auth_rate_limit_per_minute,
    ));
    let general_limiter = Arc::new(RateLimiter::per_minute(
        "api",
        settings.rate_limit_per_minute,
    ));

    let auth_routes = Router::new()
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_limiter,
            middleware::rate_limit,
        ));

    let resource_routes = Router::new()
        .route(
            "/invoices",
            post(invoices::create_invoice).get(invoices::list_invoices),
        )
        .route(
            "/invoices/{id}",
            get(invoices::get_invoice)
                .put(invoices::update_invoice)
                .delete(invoices::delete_invoice),
        )
        .route("/invoices/{id}/generate-pdf", post(pdf::generate_pdf))
        .route("/invoices/{id}/download-pdf", get(pdf::download_pdf))
        .route("/invoices/{id}/preview-pdf", get(pdf::preview_pdf))
        .route(
            "/templates",
            post(templates::create_template).get(templates::list_templates),
        )
        .route("/templates/{id}", get(templates::get_template));

    let api = auth_routes
        .merge(resource_routes)
        .layer(axum_middleware::from_fn_with_state(
            general_limiter,
            middleware::rate_limit,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(axum_middleware::from_fn(middleware::security_headers))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&settings.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
