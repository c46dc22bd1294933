use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use invoice_service::api::{self, ApiSettings, AppState};
use invoice_service::auth::AuthService;
use invoice_service::db::MemoryStore;
use invoice_service::invoice_gen::{DocumentConverter, InvoiceGenerator, RenderError};
use invoice_service::invoices::InvoiceService;
use invoice_service::templates::TemplateService;

const PASSWORD: &str = "Sup3r$ecret";

/// Writes a fixed PDF instead of shelling out.
struct StubConverter;

#[async_trait]
impl DocumentConverter for StubConverter {
    async fn convert(&self, _html_path: &Path, pdf_path: &Path) -> Result<(), RenderError> {
        tokio::fs::write(pdf_path, b"%PDF-1.4\n% stub\n").await?;
        Ok(())
    }
}

struct TestApp {
    router: Router,
    _dirs: (TempDir, TempDir),
}

fn app_with(settings: ApiSettings) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let out = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let generator =
        InvoiceGenerator::new(store.clone(), Arc::new(StubConverter), out.path(), work.path())
            .unwrap();
    let state = AppState {
        auth: AuthService::new(store.clone(), b"integration-secret", Duration::hours(24)),
        invoices: InvoiceService::new(store.clone(), Arc::new(generator)),
        templates: TemplateService::new(store),
    };
    TestApp {
        router: api::router(state, &settings),
        _dirs: (out, work),
    }
}

fn app() -> TestApp {
    app_with(ApiSettings {
        rate_limit_per_minute: 10_000,
        auth_rate_limit_per_minute: 10_000,
        cors_origins: vec!["http://localhost:3000".to_string()],
    })
}

impl TestApp {
    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, bytes) = self.send_raw(method, uri, token, body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, header::HeaderMap, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, headers, bytes)
    }

    async fn token_for(&self, email: &str) -> String {
        let (status, _) = self
            .send(
                Method::POST,
                "/api/register",
                None,
                Some(json!({ "email": email, "password": PASSWORD, "company_name": "Acme" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = self
            .send(
                Method::POST,
                "/api/login",
                None,
                Some(json!({ "email": email, "password": PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    async fn create_invoice(&self, token: &str, body: Value) -> String {
        let (status, created) = self
            .send(Method::POST, "/api/invoices", Some(token), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{created}");
        created["invoice_id"].as_str().unwrap().to_string()
    }
}

fn invoice_body() -> Value {
    json!({
        "customer_name": "Acme Corp",
        "customer_email": "billing@acme.example",
        "subtotal": 100.0,
        "tax_rate": 10.0,
        "tax_amount": 10.0,
        "total_amount": 110.0,
        "items": [
            { "description": "Anvil", "quantity": 2.0, "unit_price": 50.0, "total_price": 100.0 }
        ]
    })
}

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let (status, headers, _) = app.send_raw(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
}

#[tokio::test]
async fn invoice_crud_round_trip() {
    let app = app();
    let token = app.token_for("owner@example.com").await;
    let id = app.create_invoice(&token, invoice_body()).await;

    let (status, invoice) = app
        .send(Method::GET, &format!("/api/invoices/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(invoice["status"], "draft");
    assert_eq!(invoice["currency"], "USD");
    assert_eq!(invoice["customer_name"], "Acme Corp");
    assert_eq!(invoice["items"][0]["description"], "Anvil");

    let mut update = invoice_body();
    update["status"] = json!("sent");
    update["items"] = json!([]);
    let (status, _) = app
        .send(Method::PUT, &format!("/api/invoices/{id}"), Some(&token), Some(update))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, invoice) = app
        .send(Method::GET, &format!("/api/invoices/{id}"), Some(&token), None)
        .await;
    assert_eq!(invoice["status"], "sent");
    assert_eq!(invoice["items"], json!([]));

    let (status, list) = app.send(Method::GET, "/api/invoices", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["invoices"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/invoices/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app
        .send(Method::GET, &format!("/api/invoices/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn other_users_get_forbidden() {
    let app = app();
    let owner = app.token_for("owner@example.com").await;
    let intruder = app.token_for("intruder@example.com").await;
    let id = app.create_invoice(&owner, invoice_body()).await;

    for (method, path, body) in [
        (Method::GET, format!("/api/invoices/{id}"), None),
        (Method::PUT, format!("/api/invoices/{id}"), Some(invoice_body())),
        (Method::DELETE, format!("/api/invoices/{id}"), None),
        (Method::POST, format!("/api/invoices/{id}/generate-pdf"), None),
        (Method::GET, format!("/api/invoices/{id}/download-pdf"), None),
    ] {
        let (status, response) = app.send(method.clone(), &path, Some(&intruder), body).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{method} {path}");
        assert_eq!(response["error"], "forbidden");
    }

    let (_, list) = app.send(Method::GET, "/api/invoices", Some(&intruder), None).await;
    assert_eq!(list["invoices"], json!([]));
}

#[tokio::test]
async fn update_and_delete_of_unknown_invoice_are_not_found() {
    let app = app();
    let token = app.token_for("owner@example.com").await;
    let unknown = "6f1c1b7e-3a52-4d5e-9a43-0c1f7b0e2d11";

    for (method, body) in [(Method::PUT, Some(invoice_body())), (Method::DELETE, None)] {
        let (status, response) = app
            .send(method.clone(), &format!("/api/invoices/{unknown}"), Some(&token), body)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method}");
        assert_eq!(response["error"], "not_found");
    }
}

#[tokio::test]
async fn invoices_only_reference_own_templates() {
    let app = app();
    let owner = app.token_for("owner@example.com").await;
    let other = app.token_for("other@example.com").await;

    let mut body = invoice_body();
    body["template_id"] = json!("6f1c1b7e-3a52-4d5e-9a43-0c1f7b0e2d11");
    let (status, response) = app
        .send(Method::POST, "/api/invoices", Some(&owner), Some(body))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"], "validation_error");
    assert_eq!(response["details"]["field"], "template_id");

    let (status, created) = app
        .send(
            Method::POST,
            "/api/templates",
            Some(&other),
            Some(json!({ "name": "Theirs", "content": "<p>{{ invoice.invoice_number }}</p>" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let mut body = invoice_body();
    body["template_id"] = created["template_id"].clone();
    let (status, response) = app
        .send(Method::POST, "/api/invoices", Some(&owner), Some(body))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["error"], "forbidden");

    let (_, list) = app.send(Method::GET, "/api/invoices", Some(&owner), None).await;
    assert_eq!(list["invoices"], json!([]));
}

#[tokio::test]
async fn missing_or_bad_tokens_are_unauthenticated() {
    let app = app();

    let (status, body) = app.send(Method::GET, "/api/invoices", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");

    let (status, _) = app
        .send(Method::GET, "/api/invoices", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn validation_and_malformed_input_are_bad_requests() {
    let app = app();
    let token = app.token_for("owner@example.com").await;

    let mut negative = invoice_body();
    negative["subtotal"] = json!(-1.0);
    let (status, body) = app
        .send(Method::POST, "/api/invoices", Some(&token), Some(negative))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["details"]["field"], "subtotal");
    let (_, list) = app.send(Method::GET, "/api/invoices", Some(&token), None).await;
    assert_eq!(list["invoices"], json!([]));

    let (status, body) = app
        .send(Method::GET, "/api/invoices/not-a-uuid", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/invoices")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn registration_conflicts_and_login_failures() {
    let app = app();
    app.token_for("dup@example.com").await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/register",
            None,
            Some(json!({ "email": "DUP@example.com", "password": PASSWORD, "company_name": "Again" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/login",
            None,
            Some(json!({ "email": "dup@example.com", "password": "Wr0ng$pass" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");
}

#[tokio::test]
async fn template_render_download_and_preview() {
    let app = app();
    let token = app.token_for("owner@example.com").await;

    let id = app.create_invoice(&token, invoice_body()).await;
    let (status, body) = app
        .send(Method::POST, &format!("/api/invoices/{id}/generate-pdf"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "no_template");

    let (status, created) = app
        .send(
            Method::POST,
            "/api/templates",
            Some(&token),
            Some(json!({ "name": "Standard", "content": "<h1>{{ invoice.invoice_number }}</h1>" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let template_id = created["template_id"].as_str().unwrap().to_string();

    let (status, template) = app
        .send(Method::GET, &format!("/api/templates/{template_id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(template["language"], "en");

    let mut body = invoice_body();
    body["template_id"] = json!(template_id);
    body["invoice_number"] = json!("ACME-7");
    let id = app.create_invoice(&token, body).await;

    let (status, generated) = app
        .send(Method::POST, &format!("/api/invoices/{id}/generate-pdf"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(generated["pdf_path"].as_str().unwrap().ends_with(&format!("invoice_{id}.pdf")));

    let (status, headers, bytes) = app
        .send_raw(Method::GET, &format!("/api/invoices/{id}/download-pdf"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"invoice_ACME-7.pdf\""
    );
    assert!(bytes.starts_with(b"%PDF"));

    let (status, headers, _) = app
        .send_raw(Method::GET, &format!("/api/invoices/{id}/preview-pdf"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_DISPOSITION].to_str().unwrap().starts_with("inline"));
}

#[tokio::test]
async fn download_before_generation_is_not_found() {
    let app = app();
    let token = app.token_for("owner@example.com").await;
    let id = app.create_invoice(&token, invoice_body()).await;

    let (status, body) = app
        .send(Method::GET, &format!("/api/invoices/{id}/download-pdf"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn auth_routes_are_rate_limited() {
    let app = app_with(ApiSettings {
        rate_limit_per_minute: 10_000,
        auth_rate_limit_per_minute: 2,
        cors_origins: Vec::new(),
    });
    let login = || json!({ "email": "nobody@example.com", "password": PASSWORD });

    for _ in 0..2 {
        let (status, _) = app.send(Method::POST, "/api/login", None, Some(login())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, body) = app.send(Method::POST, "/api/login", None, Some(login())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "rate_limited");

    // Other routes have their own budget.
    let (status, _) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}
