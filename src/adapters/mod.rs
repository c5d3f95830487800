//! Source adapters.
//!
//! Each adapter turns one fetched source record into zero or more
//! [`ItemDraft`]s. Adapters are pure apart from [`file`], which has to fetch
//! document bytes; persistence and queue bookkeeping belong to the
//! [`KnowledgeExtractor`](crate::extractor::KnowledgeExtractor).

pub mod applet;
pub mod chat;
pub mod file;
pub mod form;
pub mod project;

use serde_json::Value;

use crate::models::{ContentType, ItemDraft};

/// Drafts produced by an adapter plus any website URLs it wants queued.
#[derive(Debug, Clone, Default)]
pub struct AdapterOutput {
    pub drafts: Vec<ItemDraft>,
    pub website_urls: Vec<String>,
}

impl AdapterOutput {
    pub fn push(&mut self, draft: ItemDraft) {
        self.drafts.push(draft);
    }

    pub fn queue_website(&mut self, url: &str) {
        let url = url.trim();
        if is_http_url(url) && !self.website_urls.iter().any(|u| u == url) {
            self.website_urls.push(url.to_string());
        }
    }
}

impl From<Vec<ItemDraft>> for AdapterOutput {
    fn from(drafts: Vec<ItemDraft>) -> Self {
        Self {
            drafts,
            website_urls: Vec::new(),
        }
    }
}

/// Renders a JSON value as item content. `None` for null, blank strings
/// and empty containers.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Array(a) if a.is_empty() => None,
        Value::Object(o) if o.is_empty() => None,
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        other => serde_json::to_string_pretty(other).ok(),
    }
}

pub(crate) fn content_type_of(value: &Value) -> ContentType {
    match value {
        Value::Array(_) | Value::Object(_) => ContentType::StructuredData,
        _ => ContentType::Text,
    }
}

pub(crate) fn is_http_url(s: &str) -> bool {
    let lower = s.trim().to_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Lowercase tag with runs of non-alphanumerics collapsed to `_`.
pub(crate) fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_end_matches('_').to_string()
}

/// Whether a label or field name refers to the client's existing website.
pub(crate) fn mentions_current_site(text: &str) -> bool {
    let text = text.to_lowercase();
    let qualifier = ["current", "existing", "old"].iter().any(|k| text.contains(k));
    let subject = ["site", "website", "url", "domain"]
        .iter()
        .any(|k| text.contains(k));
    qualifier && subject
}
