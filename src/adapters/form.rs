//! Form response adapter.
//!
//! Answers come from two places: the response's raw `responses` blob and
//! the normalized answer rows. Answer rows win on conflict and their values
//! are JSON-decoded when possible (`"\"50000\""` becomes `"50000"`). Each
//! non-empty field becomes one item, labelled and typed from the form's
//! field definitions.

use serde_json::{json, Map, Value};

use super::{content_type_of, mentions_current_site, value_text, AdapterOutput};
use crate::classify::{calculate_importance, categorize_content, extract_tags};
use crate::models::{FormField, FormResponse, ItemDraft, SourceType};
use crate::summary::generate_summary;

const CONFIDENCE: f64 = 0.95;
const DEFAULT_FIELD_TYPE: &str = "text";

/// Decodes a stored answer value, keeping it as a plain string when it is
/// not valid JSON.
pub fn parse_answer(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// The merged field-name to value map for a response.
pub fn merged_answers(response: &FormResponse) -> Map<String, Value> {
    let mut merged = match &response.responses {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    for answer in &response.answers {
        merged.insert(answer.field_name.clone(), parse_answer(&answer.field_value));
    }
    merged
}

pub fn form_items(response: &FormResponse) -> AdapterOutput {
    let mut merged = merged_answers(response);
    let mut out = AdapterOutput::default();

    // Defined fields first, in form order; then anything the form no longer
    // defines, in name order.
    let mut ordered: Vec<(FormField, Value)> = Vec::new();
    for field in &response.fields {
        if let Some(value) = merged.remove(&field.field_name) {
            ordered.push((field.clone(), value));
        }
    }
    for (name, value) in merged {
        let field = FormField {
            field_label: name.clone(),
            field_name: name,
            field_type: DEFAULT_FIELD_TYPE.to_string(),
        };
        ordered.push((field, value));
    }

    for (field, value) in ordered {
        let Some(text) = value_text(&value) else {
            continue;
        };
        if let Value::String(s) = &value {
            if mentions_current_site(&field.field_name) || mentions_current_site(&field.field_label)
            {
                out.queue_website(s);
            }
        }
        out.push(field_item(response, &field, &value, text));
    }
    out
}

fn field_item(response: &FormResponse, field: &FormField, value: &Value, text: String) -> ItemDraft {
    let label = field.field_label.as_str();
    ItemDraft {
        source_type: SourceType::FormResponse,
        source_id: response.id.clone(),
        source_name: format!("{} - {}", response.form_name, label),
        content_type: content_type_of(value),
        summary: generate_summary(label, &text),
        category: categorize_content(label),
        tags: extract_tags(label, &text, &["form_response", &field.field_type]),
        importance: calculate_importance(label, &field.field_type),
        content: text,
        confidence: CONFIDENCE,
        metadata: Some(json!({
            "form_id": response.form_id,
            "field_name": field.field_name,
            "field_type": field.field_type,
            "user_id": response.user_id,
        })),
    }
}
