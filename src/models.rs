//! Core data models used throughout the knowledge pipeline.
//!
//! Two families of types live here: the records the pipeline *reads*
//! (projects, form responses, applet interactions, chat messages, files)
//! and the records it *writes* (knowledge items and extraction queue
//! entries). Closed vocabularies are modelled as enums with stable string
//! tags so they round-trip through SQLite columns and JSON bodies.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value written to [`KnowledgeItem::extracted_by`] for pipeline output.
pub const EXTRACTED_BY_SYSTEM: &str = "system";

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $tag:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// All variants, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The stable string tag stored in the database.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $tag),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> anyhow::Result<Self> {
                match s {
                    $($tag => Ok($name::$variant),)+
                    other => bail!("unknown {} '{}'", stringify!($name), other),
                }
            }
        }
    };
}

string_enum!(
    /// Origin type of a knowledge item or queue entry.
    SourceType {
        ProjectMetadata => "project_metadata",
        FormResponse => "form_response",
        AppletInteraction => "applet_interaction",
        ChatMessage => "chat_message",
        ChatAttachment => "chat_attachment",
        FileDocument => "file_document",
        WebsiteContent => "website_content",
    }
);

string_enum!(
    /// Shape of [`KnowledgeItem::content`].
    ContentType {
        Text => "text",
        StructuredData => "structured_data",
        Preferences => "preferences",
    }
);

string_enum!(
    /// Fixed category taxonomy for knowledge items.
    Category {
        ProjectInfo => "project_info",
        TechnicalSpecs => "technical_specs",
        Functionality => "functionality",
        DesignPreferences => "design_preferences",
        BrandIdentity => "brand_identity",
        ContentStrategy => "content_strategy",
        TargetAudience => "target_audience",
        BusinessGoals => "business_goals",
        Feedback => "feedback",
        Inspiration => "inspiration",
        Documentation => "documentation",
        Requirements => "requirements",
    }
);

string_enum!(
    /// Lifecycle state of an extraction queue entry.
    QueueStatus {
        Pending => "pending",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
    }
);

/// A normalized, classified fact extracted from some source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: String,
    pub project_id: String,
    pub source_type: SourceType,
    pub source_id: String,
    pub source_name: String,
    pub content_type: ContentType,
    pub content: String,
    pub content_summary: String,
    pub category: Option<Category>,
    pub tags: BTreeSet<String>,
    /// Heuristic weight in `0..=10`.
    pub importance_score: u8,
    pub extracted_by: String,
    /// Heuristic confidence in `0.0..=1.0`.
    pub extraction_confidence: f64,
    pub processed_at: DateTime<Utc>,
    pub is_current: bool,
    pub metadata: Option<Value>,
}

/// A knowledge item as shaped by a source adapter, before the orchestrator
/// stamps it with an id, project, timestamp and currency flag.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDraft {
    pub source_type: SourceType,
    pub source_id: String,
    pub source_name: String,
    pub content_type: ContentType,
    pub content: String,
    pub summary: String,
    pub category: Option<Category>,
    pub tags: BTreeSet<String>,
    pub importance: u8,
    pub confidence: f64,
    pub metadata: Option<Value>,
}

impl ItemDraft {
    /// The supersede key this draft will be written under.
    pub fn key(&self, project_id: &str) -> SourceKey {
        SourceKey {
            project_id: project_id.to_string(),
            source_type: self.source_type,
            source_id: self.source_id.clone(),
        }
    }

    pub fn into_item(self, project_id: &str, processed_at: DateTime<Utc>) -> KnowledgeItem {
        KnowledgeItem {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            source_type: self.source_type,
            source_id: self.source_id,
            source_name: self.source_name,
            content_type: self.content_type,
            content: self.content,
            content_summary: self.summary,
            category: self.category,
            tags: self.tags,
            importance_score: self.importance.min(10),
            extracted_by: EXTRACTED_BY_SYSTEM.to_string(),
            extraction_confidence: self.confidence.clamp(0.0, 1.0),
            processed_at,
            is_current: true,
            metadata: self.metadata,
        }
    }
}

/// Identity of a group of knowledge items (and of its queue entry).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub project_id: String,
    pub source_type: SourceType,
    pub source_id: String,
}

impl SourceKey {
    pub fn new(project_id: &str, source_type: SourceType, source_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            source_type,
            source_id: source_id.to_string(),
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project_id, self.source_type, self.source_id)
    }
}

/// Filter for listing knowledge items.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub source_type: Option<SourceType>,
    pub source_id: Option<String>,
    /// Include superseded (`is_current = false`) items.
    pub include_stale: bool,
}

/// Work item for asynchronous extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub project_id: String,
    pub source_type: SourceType,
    pub source_id: String,
    pub source_url: Option<String>,
    /// Higher is sooner.
    pub priority: i64,
    pub status: QueueStatus,
    pub attempts: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Request to enqueue an extraction.
#[derive(Debug, Clone)]
pub struct NewQueueEntry {
    pub project_id: String,
    pub source_type: SourceType,
    pub source_id: String,
    pub source_url: Option<String>,
    pub priority: i64,
}

impl NewQueueEntry {
    pub fn key(&self) -> SourceKey {
        SourceKey::new(&self.project_id, self.source_type, &self.source_id)
    }

    pub fn into_entry(self, now: DateTime<Utc>) -> QueueEntry {
        QueueEntry {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: self.project_id,
            source_type: self.source_type,
            source_id: self.source_id,
            source_url: self.source_url,
            priority: self.priority,
            status: QueueStatus::Pending,
            attempts: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Source records
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub target_completion_date: Option<String>,
    #[serde(default)]
    pub actual_completion_date: Option<String>,
    #[serde(default)]
    pub live_url: Option<String>,
    #[serde(default)]
    pub staging_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Free-form project metadata; `scope` and `project_type` are read from it.
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Field definition of a form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    pub field_name: String,
    pub field_label: String,
    pub field_type: String,
}

/// Row of the normalized answers table. `field_value` is usually JSON text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormAnswer {
    pub field_name: String,
    pub field_value: String,
}

/// A form response joined with its form's field definitions and answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormResponse {
    pub id: String,
    pub project_id: String,
    pub form_id: String,
    pub form_name: String,
    /// Raw `responses` blob: an object keyed by field name.
    pub responses: Value,
    #[serde(default)]
    pub answers: Vec<FormAnswer>,
    #[serde(default)]
    pub fields: Vec<FormField>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// An applet definition as joined onto its interactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Applet {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub applet_type: String,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppletInteraction {
    pub id: String,
    pub project_id: String,
    pub applet: Applet,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAttachment {
    pub name: String,
    pub url: String,
    #[serde(default, alias = "type")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
}

/// A chat message joined with its conversation and sender profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub project_id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub conversation_title: Option<String>,
    pub content: String,
    #[serde(default)]
    pub sender_id: Option<String>,
    pub sender_name: String,
    pub sender_role: String,
    #[serde(default)]
    pub attachments: Vec<ChatAttachment>,
}

impl ChatMessage {
    pub fn is_from_client(&self) -> bool {
        is_client_role(&self.sender_role)
    }
}

pub fn is_client_role(role: &str) -> bool {
    role.eq_ignore_ascii_case("client")
}

/// An uploaded file's metadata row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub project_id: String,
    pub file_name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub uploaded_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_tags_round_trip() {
        for st in SourceType::ALL {
            assert_eq!(st.as_str().parse::<SourceType>().unwrap(), *st);
        }
        assert!("website".parse::<SourceType>().is_err());
    }

    #[test]
    fn serde_uses_snake_case_tags() {
        let json = serde_json::to_string(&Category::BrandIdentity).unwrap();
        assert_eq!(json, "\"brand_identity\"");
        let parsed: QueueStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, QueueStatus::Failed);
    }

    #[test]
    fn draft_into_item_clamps_scores() {
        let draft = ItemDraft {
            source_type: SourceType::FormResponse,
            source_id: "r1".into(),
            source_name: "Form - Field".into(),
            content_type: ContentType::Text,
            content: "x".into(),
            summary: "x".into(),
            category: None,
            tags: BTreeSet::new(),
            importance: 42,
            confidence: 1.7,
            metadata: None,
        };
        let item = draft.into_item("p1", Utc::now());
        assert_eq!(item.importance_score, 10);
        assert_eq!(item.extraction_confidence, 1.0);
        assert!(item.is_current);
        assert_eq!(item.extracted_by, "system");
    }
}
