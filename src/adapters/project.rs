//! Project metadata adapter.
//!
//! A project record yields up to six independent items, each under its own
//! sub-key (`{project_id}_info`, `{project_id}_timeline`, ...) so that one
//! part can be re-extracted without staling the others. Absent fields skip
//! their item.

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};

use super::{content_type_of, slug, value_text};
use crate::classify::extract_tags;
use crate::models::{Category, ContentType, ItemDraft, Project, SourceType};
use crate::summary::generate_summary;

const CONFIDENCE: f64 = 1.0;

/// Sub-key suffixes, in emission order.
pub const SUB_KEYS: &[&str] = &[
    "info",
    "timeline",
    "urls",
    "description",
    "scope",
    "project_type",
];

pub fn sub_key(project_id: &str, suffix: &str) -> String {
    format!("{}_{}", project_id, suffix)
}

fn tags(items: &[&str]) -> BTreeSet<String> {
    items
        .iter()
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[allow(clippy::too_many_arguments)]
fn draft(
    project: &Project,
    suffix: &str,
    source_name: &str,
    content_type: ContentType,
    content: String,
    summary: String,
    category: Category,
    tags: BTreeSet<String>,
    importance: u8,
) -> ItemDraft {
    ItemDraft {
        source_type: SourceType::ProjectMetadata,
        source_id: sub_key(&project.id, suffix),
        source_name: source_name.to_string(),
        content_type,
        content,
        summary,
        category: Some(category),
        tags,
        importance,
        confidence: CONFIDENCE,
        metadata: Some(json!({ "project_id": project.id, "field_group": suffix })),
    }
}

pub fn project_items(project: &Project) -> Vec<ItemDraft> {
    let mut drafts = Vec::new();
    drafts.extend(info_item(project));
    drafts.extend(timeline_item(project));
    drafts.extend(urls_item(project));
    drafts.extend(description_item(project));
    drafts.extend(scope_item(project));
    drafts.extend(project_type_item(project));
    drafts
}

fn info_item(project: &Project) -> Option<ItemDraft> {
    let name = project.name.trim();
    if name.is_empty() {
        return None;
    }

    let mut content = Map::new();
    content.insert("name".into(), json!(name));
    let mut summary = format!("Project: {}", name);
    if let Some(client) = non_empty(&project.client_name) {
        content.insert("client_name".into(), json!(client));
        summary.push_str(&format!(" for {}", client));
    }
    let status = non_empty(&project.status);
    if let Some(status) = status {
        content.insert("status".into(), json!(status));
        summary.push_str(&format!(" | Status: {}", status));
    }
    if let Some(budget) = project.budget {
        content.insert("budget".into(), json!(budget));
        summary.push_str(&format!(" | Budget: ${}", budget));
    }

    let status_tag = status.map(slug).unwrap_or_default();
    Some(draft(
        project,
        "info",
        "Project Information",
        ContentType::StructuredData,
        Value::Object(content).to_string(),
        summary,
        Category::ProjectInfo,
        tags(&["project_info", "overview", &status_tag]),
        9,
    ))
}

fn timeline_item(project: &Project) -> Option<ItemDraft> {
    let dates = [
        ("start_date", "starts", non_empty(&project.start_date)),
        (
            "target_completion_date",
            "target completion",
            non_empty(&project.target_completion_date),
        ),
        (
            "actual_completion_date",
            "completed",
            non_empty(&project.actual_completion_date),
        ),
    ];
    if dates.iter().all(|(_, _, d)| d.is_none()) {
        return None;
    }

    let mut content = Map::new();
    let mut parts = Vec::new();
    for (field, phrase, date) in dates {
        if let Some(date) = date {
            content.insert(field.into(), json!(date));
            parts.push(format!("{} {}", phrase, date));
        }
    }

    Some(draft(
        project,
        "timeline",
        "Project Timeline",
        ContentType::StructuredData,
        Value::Object(content).to_string(),
        format!("Timeline: {}", parts.join(", ")),
        Category::ProjectInfo,
        tags(&["timeline", "schedule"]),
        8,
    ))
}

fn urls_item(project: &Project) -> Option<ItemDraft> {
    let live = non_empty(&project.live_url);
    let staging = non_empty(&project.staging_url);
    if live.is_none() && staging.is_none() {
        return None;
    }

    let mut content = Map::new();
    let mut parts = Vec::new();
    if let Some(url) = live {
        content.insert("live_url".into(), json!(url));
        parts.push(format!("Live site: {}", url));
    }
    if let Some(url) = staging {
        content.insert("staging_url".into(), json!(url));
        parts.push(format!("Staging site: {}", url));
    }

    Some(draft(
        project,
        "urls",
        "Project URLs",
        ContentType::StructuredData,
        Value::Object(content).to_string(),
        parts.join(" | "),
        Category::TechnicalSpecs,
        tags(&["urls", "website"]),
        7,
    ))
}

fn description_item(project: &Project) -> Option<ItemDraft> {
    let description = non_empty(&project.description)?;
    Some(draft(
        project,
        "description",
        "Project Description",
        ContentType::Text,
        description.to_string(),
        generate_summary("Project Description", description),
        Category::ProjectInfo,
        extract_tags("description", description, &["description", "overview"]),
        8,
    ))
}

fn metadata_field<'a>(project: &'a Project, field: &str) -> Option<&'a Value> {
    project
        .metadata
        .as_ref()
        .and_then(|m| m.get(field))
        .filter(|v| !v.is_null())
}

fn scope_item(project: &Project) -> Option<ItemDraft> {
    let scope = metadata_field(project, "scope")?;
    let text = value_text(scope)?;
    Some(draft(
        project,
        "scope",
        "Project Scope",
        content_type_of(scope),
        text.clone(),
        generate_summary("Project Scope", &text),
        Category::Requirements,
        extract_tags("scope", &text, &["scope", "requirements"]),
        9,
    ))
}

fn project_type_item(project: &Project) -> Option<ItemDraft> {
    let project_type = metadata_field(project, "project_type")?;
    let text = value_text(project_type)?;
    let type_tag = slug(&text);
    Some(draft(
        project,
        "project_type",
        "Project Type",
        ContentType::Text,
        text.clone(),
        format!("Project type: {}", text),
        Category::ProjectInfo,
        tags(&["project_type", &type_tag]),
        7,
    ))
}
