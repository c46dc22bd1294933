use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::RecordStore;
use crate::errors::{AppError, Result};
use crate::invoice_gen::{RenderError, check_template_syntax};
use crate::models::Template;
use crate::validation::{ValidationError, require};

const MAX_NAME_CHARS: usize = 255;
const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TemplatePayload {
    pub name: String,
    pub language: Option<String>,
    pub background_url: Option<String>,
    pub logo_url: Option<String>,
    pub content: String,
}

/// Per-user HTML templates used by the renderer.
#[derive(Clone)]
pub struct TemplateService {
    store: Arc<dyn RecordStore>,
}

impl TemplateService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, caller: Uuid, payload: TemplatePayload) -> Result<Template> {
        let name = require(&payload.name, "name", "template name")?;
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(ValidationError::new(
                "name",
                format!("template name must be at most {MAX_NAME_CHARS} characters"),
            )
            .into());
        }
        if payload.content.trim().is_empty() {
            return Err(ValidationError::new("content", "template content is required").into());
        }
        check_template_syntax(&payload.content).map_err(|e| match e {
            RenderError::Markup(detail) => {
                ValidationError::new("content", format!("template does not parse: {detail}"))
            }
            other => ValidationError::new("content", other.to_string()),
        })?;

        let language = payload
            .language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_LANGUAGE)
            .to_string();

        let now = Utc::now();
        let template = Template {
            id: Uuid::new_v4(),
            user_id: caller,
            name,
            language,
            background_url: non_blank(payload.background_url),
            logo_url: non_blank(payload.logo_url),
            content: payload.content,
            created_at: now,
            updated_at: now,
        };
        self.store.create_template(&template).await?;

        info!(template_id = %template.id, user_id = %caller, "template created");
        Ok(template)
    }

    pub async fn list(&self, caller: Uuid) -> Result<Vec<Template>> {
        Ok(self.store.list_templates_by_user(caller).await?)
    }

    pub async fn get(&self, caller: Uuid, id: Uuid) -> Result<Template> {
        let template = self
            .store
            .get_template(id)
            .await?
            .ok_or(AppError::NotFound("template"))?;

        if template.user_id != caller {
            warn!(template_id = %id, user_id = %caller, "template access denied");
            return Err(AppError::Forbidden(
                "you are not authorized to access this template".to_string(),
            ));
        }
        Ok(template)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
