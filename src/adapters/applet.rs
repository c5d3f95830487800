//! Applet interaction adapter.
//!
//! Every applet type is handled by one [`AppletHandler`] registered under
//! its type tag in an [`AppletRegistry`]. Handlers deserialize the parts of
//! the interaction's `data` (and the applet's `config`) they need into
//! typed payloads, and emit items whose content is the relevant raw
//! sub-object so nothing the client submitted is lost.
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                AppletRegistry                 │
//! │  palette_cleanser  tone_of_voice  font_picker │
//! │  sitemap_builder   link_submission            │
//! │  copy_collection   phase_review               │
//! │  ai_narrative_generator                       │
//! └──────────────────────┬────────────────────────┘
//!                        ▼
//!        unknown type → generic fallback item
//! ```
//!
//! Adding an applet type means implementing [`AppletHandler`] and calling
//! [`AppletRegistry::register`].

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::{is_http_url, slug, value_text, AdapterOutput};
use crate::error::{ExtractorError, ExtractorResult};
use crate::models::{AppletInteraction, Category, ContentType, ItemDraft, SourceType};
use crate::summary::{generate_summary, truncate_chars};

const CONFIDENCE: f64 = 0.95;
const NARRATIVE_CONFIDENCE: f64 = 0.85;
const FALLBACK_IMPORTANCE: u8 = 5;
const MAX_LISTED: usize = 5;

/// Extraction logic for one applet type.
pub trait AppletHandler: Send + Sync {
    /// The applet type tag this handler is registered under
    /// (e.g. `"palette_cleanser"`).
    fn applet_type(&self) -> &str;

    /// Shape items from one interaction.
    fn extract(&self, interaction: &AppletInteraction) -> ExtractorResult<AdapterOutput>;

    /// Source ids, besides the interaction id, this handler may write
    /// under. They are superseded on every extraction so that an item the
    /// handler no longer emits does not stay current.
    fn related_source_ids(&self, _interaction: &AppletInteraction) -> Vec<String> {
        Vec::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Lookup table from applet type tag to handler.
pub struct AppletRegistry {
    handlers: Vec<Box<dyn AppletHandler>>,
}

impl AppletRegistry {
    /// Create an empty registry. Every interaction falls back to the
    /// generic item.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Create a registry pre-loaded with the built-in applet handlers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(PaletteCleanser));
        registry.register(Box::new(ToneOfVoice));
        registry.register(Box::new(FontPicker));
        registry.register(Box::new(SitemapBuilder));
        registry.register(Box::new(LinkSubmission));
        registry.register(Box::new(CopyCollection));
        registry.register(Box::new(PhaseReview));
        registry.register(Box::new(AiNarrativeGenerator));
        registry
    }

    /// Register a handler. A later registration for the same type tag
    /// replaces the earlier one.
    pub fn register(&mut self, handler: Box<dyn AppletHandler>) {
        self.handlers
            .retain(|h| h.applet_type() != handler.applet_type());
        self.handlers.push(handler);
    }

    pub fn find(&self, applet_type: &str) -> Option<&dyn AppletHandler> {
        self.handlers
            .iter()
            .find(|h| h.applet_type() == applet_type)
            .map(|h| h.as_ref())
    }

    /// Registered type tags, in registration order.
    pub fn applet_types(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.applet_type()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Dispatches to the handler for the interaction's applet type, or
    /// produces the generic fallback item for unknown types.
    pub fn extract(&self, interaction: &AppletInteraction) -> ExtractorResult<AdapterOutput> {
        match self.find(&interaction.applet.applet_type) {
            Some(handler) => handler.extract(interaction),
            None => Ok(generic_item(interaction).into_iter().collect::<Vec<_>>().into()),
        }
    }

    pub fn related_source_ids(&self, interaction: &AppletInteraction) -> Vec<String> {
        self.find(&interaction.applet.applet_type)
            .map(|h| h.related_source_ids(interaction))
            .unwrap_or_default()
    }
}

impl Default for AppletRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Shared helpers
// ═══════════════════════════════════════════════════════════════════════

fn payload<T: DeserializeOwned>(interaction: &AppletInteraction, value: &Value) -> ExtractorResult<T> {
    T::deserialize(value).map_err(|e| {
        ExtractorError::InvalidPayload(format!(
            "{} interaction {}: {}",
            interaction.applet.applet_type, interaction.id, e
        ))
    })
}

/// First non-null member of `data` among `keys`.
fn sub_object<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| data.get(*k))
        .find(|v| !v.is_null())
}

fn tag_set(tags: &[&str]) -> BTreeSet<String> {
    tags.iter()
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn listed(items: &[String]) -> String {
    let mut shown = items
        .iter()
        .take(MAX_LISTED)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if items.len() > MAX_LISTED {
        shown.push_str(&format!(" and {} more", items.len() - MAX_LISTED));
    }
    shown
}

/// Display form of a scalar that may arrive as a string or a number.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

struct ItemParts<'a> {
    source_id: String,
    label: &'a str,
    content_type: ContentType,
    content: String,
    summary: String,
    category: Option<Category>,
    tags: BTreeSet<String>,
    importance: u8,
    confidence: f64,
}

fn build(interaction: &AppletInteraction, parts: ItemParts<'_>) -> ItemDraft {
    ItemDraft {
        source_type: SourceType::AppletInteraction,
        source_id: parts.source_id,
        source_name: format!("{} - {}", interaction.applet.name, parts.label),
        content_type: parts.content_type,
        content: parts.content,
        summary: parts.summary,
        category: parts.category,
        tags: parts.tags,
        importance: parts.importance,
        confidence: parts.confidence,
        metadata: Some(json!({
            "applet_id": interaction.applet.id,
            "applet_type": interaction.applet.applet_type,
            "user_id": interaction.user_id,
        })),
    }
}

fn structured(
    interaction: &AppletInteraction,
    label: &str,
    content: &Value,
    summary: String,
    category: Category,
    tags: BTreeSet<String>,
    importance: u8,
) -> ItemDraft {
    build(
        interaction,
        ItemParts {
            source_id: interaction.id.clone(),
            label,
            content_type: ContentType::StructuredData,
            content: content.to_string(),
            summary,
            category: Some(category),
            tags,
            importance,
            confidence: CONFIDENCE,
        },
    )
}

/// Item for an applet type with no registered handler.
pub fn generic_item(interaction: &AppletInteraction) -> Option<ItemDraft> {
    let data = &interaction.data;
    if value_text(data).is_none() {
        return None;
    }
    let applet_type = interaction.applet.applet_type.as_str();
    Some(build(
        interaction,
        ItemParts {
            source_id: interaction.id.clone(),
            label: "Interaction",
            content_type: ContentType::StructuredData,
            content: data.to_string(),
            summary: format!(
                "{} interaction ({})",
                interaction.applet.name, applet_type
            ),
            category: None,
            tags: tag_set(&["applet", &slug(applet_type)]),
            importance: FALLBACK_IMPORTANCE,
            confidence: CONFIDENCE,
        },
    ))
}

// ═══════════════════════════════════════════════════════════════════════
// palette_cleanser
// ═══════════════════════════════════════════════════════════════════════

pub struct PaletteCleanser;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Swatch {
    Hex(String),
    Named {
        #[serde(alias = "value", alias = "color")]
        hex: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl Swatch {
    fn label(&self) -> String {
        match self {
            Swatch::Hex(hex) => hex.clone(),
            Swatch::Named {
                hex,
                name: Some(name),
            } => format!("{} {}", name, hex),
            Swatch::Named { hex, .. } => hex.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Palette {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    colors: Vec<Swatch>,
}

impl AppletHandler for PaletteCleanser {
    fn applet_type(&self) -> &str {
        "palette_cleanser"
    }

    fn extract(&self, interaction: &AppletInteraction) -> ExtractorResult<AdapterOutput> {
        let Some(raw) = sub_object(&interaction.data, &["selected_palette", "palette"]) else {
            return Ok(AdapterOutput::default());
        };
        let palette: Palette = payload(interaction, raw)?;
        let colors: Vec<String> = palette.colors.iter().map(Swatch::label).collect();
        let name = palette.name.as_deref().unwrap_or("Custom palette");
        let summary = if colors.is_empty() {
            format!("Client selected color palette: {}", name)
        } else {
            format!(
                "Client selected color palette: {} ({})",
                name,
                colors.join(", ")
            )
        };
        let name_tag = slug(name);
        Ok(vec![structured(
            interaction,
            "Color Palette",
            raw,
            summary,
            Category::DesignPreferences,
            tag_set(&["color", "palette", "design", &name_tag]),
            8,
        )]
        .into())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// tone_of_voice
// ═══════════════════════════════════════════════════════════════════════

pub struct ToneOfVoice;

#[derive(Debug, Deserialize)]
struct ToneSelection {
    #[serde(default, alias = "toneName", alias = "tone", alias = "tone_name")]
    name: Option<String>,
    #[serde(default, alias = "intensity")]
    level: Option<Value>,
}

impl AppletHandler for ToneOfVoice {
    fn applet_type(&self) -> &str {
        "tone_of_voice"
    }

    fn extract(&self, interaction: &AppletInteraction) -> ExtractorResult<AdapterOutput> {
        let raw = sub_object(&interaction.data, &["selected_tone", "tone_selection"])
            .unwrap_or(&interaction.data);
        let tone: ToneSelection = payload(interaction, raw)?;
        let Some(name) = tone.name.filter(|n| !n.trim().is_empty()) else {
            return Ok(AdapterOutput::default());
        };
        let level = tone
            .level
            .as_ref()
            .and_then(scalar_text)
            .unwrap_or_else(|| "unspecified".to_string());
        let name_tag = slug(&name);
        Ok(vec![structured(
            interaction,
            "Brand Voice",
            raw,
            format!("Client selected brand voice: {} at {} level", name, level),
            Category::ContentStrategy,
            tag_set(&["tone", "voice", "brand_voice", &name_tag]),
            8,
        )]
        .into())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// font_picker
// ═══════════════════════════════════════════════════════════════════════

pub struct FontPicker;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FontChoice {
    Family(String),
    Detailed {
        #[serde(alias = "name")]
        family: String,
    },
}

impl FontChoice {
    fn family(&self) -> &str {
        match self {
            FontChoice::Family(f) | FontChoice::Detailed { family: f } => f.as_str(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FontSelection {
    #[serde(default, alias = "headingFont", alias = "heading")]
    heading_font: Option<FontChoice>,
    #[serde(default, alias = "bodyFont", alias = "body")]
    body_font: Option<FontChoice>,
    #[serde(default, alias = "accentFont", alias = "accent")]
    accent_font: Option<FontChoice>,
}

impl AppletHandler for FontPicker {
    fn applet_type(&self) -> &str {
        "font_picker"
    }

    fn extract(&self, interaction: &AppletInteraction) -> ExtractorResult<AdapterOutput> {
        let raw = sub_object(&interaction.data, &["selected_fonts", "fonts"])
            .unwrap_or(&interaction.data);
        let fonts: FontSelection = payload(interaction, raw)?;
        let roles: Vec<String> = [
            (&fonts.heading_font, "headings"),
            (&fonts.body_font, "body"),
            (&fonts.accent_font, "accents"),
        ]
        .into_iter()
        .filter_map(|(choice, role)| {
            choice
                .as_ref()
                .map(|c| format!("{} ({})", c.family(), role))
        })
        .collect();
        if roles.is_empty() {
            return Ok(AdapterOutput::default());
        }
        Ok(vec![structured(
            interaction,
            "Typography",
            raw,
            format!("Client selected fonts: {}", roles.join(", ")),
            Category::DesignPreferences,
            tag_set(&["typography", "font", "design"]),
            7,
        )]
        .into())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// sitemap_builder
// ═══════════════════════════════════════════════════════════════════════

pub struct SitemapBuilder;

#[derive(Debug, Deserialize)]
struct SitemapPage {
    #[serde(default, alias = "name", alias = "label")]
    title: Option<String>,
    #[serde(default, alias = "subpages")]
    children: Vec<SitemapPage>,
}

fn count_pages(pages: &[SitemapPage]) -> usize {
    pages.iter().map(|p| 1 + count_pages(&p.children)).sum()
}

impl AppletHandler for SitemapBuilder {
    fn applet_type(&self) -> &str {
        "sitemap_builder"
    }

    fn extract(&self, interaction: &AppletInteraction) -> ExtractorResult<AdapterOutput> {
        let Some(raw) = sub_object(&interaction.data, &["pages", "sitemap"]) else {
            return Ok(AdapterOutput::default());
        };
        let pages: Vec<SitemapPage> = payload(interaction, raw)?;
        if pages.is_empty() {
            return Ok(AdapterOutput::default());
        }
        let top: Vec<String> = pages
            .iter()
            .map(|p| p.title.clone().unwrap_or_else(|| "Untitled".to_string()))
            .collect();
        Ok(vec![structured(
            interaction,
            "Sitemap",
            raw,
            format!(
                "Sitemap with {} pages. Top level: {}",
                count_pages(&pages),
                listed(&top)
            ),
            Category::Functionality,
            tag_set(&["sitemap", "navigation", "site_structure"]),
            8,
        )]
        .into())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// link_submission
// ═══════════════════════════════════════════════════════════════════════

pub struct LinkSubmission;

#[derive(Debug, Deserialize)]
struct SubmittedLink {
    url: String,
    #[serde(default, alias = "type", alias = "linkType")]
    link_type: Option<String>,
}

impl SubmittedLink {
    fn is_current_site(&self) -> bool {
        self.link_type
            .as_deref()
            .map(|t| {
                let t = t.to_lowercase();
                t.contains("current") || t.contains("existing")
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct LinkPayload {
    #[serde(default)]
    links: Vec<SubmittedLink>,
    #[serde(default, alias = "currentSite", alias = "current_site_url")]
    current_site: Option<String>,
}

impl AppletHandler for LinkSubmission {
    fn applet_type(&self) -> &str {
        "link_submission"
    }

    fn extract(&self, interaction: &AppletInteraction) -> ExtractorResult<AdapterOutput> {
        let submitted: LinkPayload = payload(interaction, &interaction.data)?;
        let mut out = AdapterOutput::default();

        let mut current: Vec<&str> = submitted
            .links
            .iter()
            .filter(|l| l.is_current_site())
            .map(|l| l.url.as_str())
            .collect();
        if let Some(site) = submitted.current_site.as_deref() {
            current.push(site);
        }
        for url in &current {
            out.queue_website(url);
        }

        let urls: Vec<String> = submitted
            .links
            .iter()
            .map(|l| l.url.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        if urls.is_empty() && current.is_empty() {
            return Ok(out);
        }

        let mut tags = vec!["links", "inspiration", "reference"];
        if current.iter().any(|u| is_http_url(u)) {
            tags.push("current_site");
        }
        let summary = if urls.is_empty() {
            let current: Vec<String> = current.iter().map(|u| u.to_string()).collect();
            format!("Client submitted their current site: {}", listed(&current))
        } else {
            format!("Client submitted {} link(s): {}", urls.len(), listed(&urls))
        };
        out.push(structured(
            interaction,
            "Submitted Links",
            &interaction.data,
            summary,
            Category::Inspiration,
            tag_set(&tags),
            7,
        ));
        Ok(out)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// copy_collection
// ═══════════════════════════════════════════════════════════════════════

pub struct CopyCollection;

#[derive(Debug, Deserialize)]
struct CopySection {
    #[serde(alias = "title", alias = "name")]
    section: String,
    #[serde(default, alias = "copy", alias = "text")]
    content: Option<String>,
}

fn section_names(raw: &Value, interaction: &AppletInteraction) -> ExtractorResult<Vec<String>> {
    match raw {
        Value::Object(map) => Ok(map
            .iter()
            .filter(|(_, v)| value_text(v).is_some())
            .map(|(k, _)| k.clone())
            .collect()),
        other => {
            let sections: Vec<CopySection> = payload(interaction, other)?;
            Ok(sections
                .into_iter()
                .filter(|s| s.content.as_deref().map_or(false, |c| !c.trim().is_empty()))
                .map(|s| s.section)
                .collect())
        }
    }
}

impl AppletHandler for CopyCollection {
    fn applet_type(&self) -> &str {
        "copy_collection"
    }

    fn extract(&self, interaction: &AppletInteraction) -> ExtractorResult<AdapterOutput> {
        let Some(raw) = sub_object(&interaction.data, &["sections", "copy"]) else {
            return Ok(AdapterOutput::default());
        };
        let names = section_names(raw, interaction)?;
        if names.is_empty() {
            return Ok(AdapterOutput::default());
        }
        Ok(vec![structured(
            interaction,
            "Website Copy",
            raw,
            format!(
                "Client provided copy for {} section(s): {}",
                names.len(),
                listed(&names)
            ),
            Category::ContentStrategy,
            tag_set(&["copy", "content", "messaging"]),
            8,
        )]
        .into())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// phase_review
// ═══════════════════════════════════════════════════════════════════════

/// Phase sign-off. Reads the revision allowance from the applet config
/// first, then from the interaction data.
pub struct PhaseReview;

const REVISE_DECISIONS: &[&str] = &["revise", "revision", "request_revisions", "changes_requested"];

#[derive(Debug, Default, Deserialize)]
struct PhaseReviewData {
    #[serde(default)]
    decision: String,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default, alias = "phase_name")]
    phase: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    remaining_revisions: Option<i64>,
    #[serde(default, deserialize_with = "lenient_count")]
    revisions_used: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct PhaseReviewConfig {
    #[serde(default)]
    phase_name: Option<String>,
    #[serde(default)]
    phase: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    remaining_revisions: Option<i64>,
    #[serde(default, deserialize_with = "lenient_count")]
    max_revisions: Option<i64>,
}

/// A count given as a number or a numeric string. Anything else reads as
/// absent.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

impl PhaseReview {
    fn feedback_id(interaction: &AppletInteraction) -> String {
        format!("{}_feedback", interaction.id)
    }

    /// The applet config is operator-maintained; one that does not parse is
    /// logged and treated as empty.
    fn config(interaction: &AppletInteraction) -> PhaseReviewConfig {
        let config = &interaction.applet.config;
        if !config.is_object() {
            return PhaseReviewConfig::default();
        }
        PhaseReviewConfig::deserialize(config).unwrap_or_else(|e| {
            warn!(
                interaction_id = %interaction.id,
                applet_id = %interaction.applet.id,
                error = %e,
                "unreadable phase_review config, ignoring it"
            );
            PhaseReviewConfig::default()
        })
    }
}

impl AppletHandler for PhaseReview {
    fn applet_type(&self) -> &str {
        "phase_review"
    }

    fn extract(&self, interaction: &AppletInteraction) -> ExtractorResult<AdapterOutput> {
        let data: PhaseReviewData = payload(interaction, &interaction.data)?;
        let config = Self::config(interaction);

        let decision = data.decision.trim().to_lowercase();
        if decision.is_empty() {
            return Ok(AdapterOutput::default());
        }
        let phase = config
            .phase_name
            .clone()
            .or_else(|| config.phase.clone())
            .or_else(|| data.phase.clone())
            .unwrap_or_else(|| interaction.applet.name.clone());
        let remaining = config
            .remaining_revisions
            .or(data.remaining_revisions)
            .or_else(|| {
                config
                    .max_revisions
                    .zip(data.revisions_used)
                    .map(|(max, used)| (max - used).max(0))
            });
        let feedback = data
            .feedback
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());
        let is_revision = REVISE_DECISIONS.contains(&decision.as_str());

        let mut summary = if decision == "approve" || decision == "approved" {
            format!("Client approved the {} phase", phase)
        } else if is_revision {
            format!("Client requested revisions to the {} phase", phase)
        } else {
            format!("Phase review for {}: {}", phase, decision)
        };
        if let Some(n) = remaining {
            summary.push_str(&format!(" ({} revisions remaining)", n));
        }

        let revisions_tag = remaining.map(|n| format!("revisions_{}", n));
        let mut tags = tag_set(&["phase_review", "milestone", &decision]);
        tags.extend(revisions_tag);

        let content = json!({
            "phase": phase,
            "decision": decision,
            "feedback": feedback,
            "remaining_revisions": remaining,
            "max_revisions": config.max_revisions,
        });

        let mut out = AdapterOutput::default();
        out.push(build(
            interaction,
            ItemParts {
                source_id: interaction.id.clone(),
                label: "Phase Review",
                content_type: ContentType::StructuredData,
                content: content.to_string(),
                summary,
                category: Some(Category::ProjectInfo),
                tags,
                importance: 10,
                confidence: CONFIDENCE,
            },
        ));

        if let Some(feedback) = feedback.filter(|_| is_revision) {
            out.push(build(
                interaction,
                ItemParts {
                    source_id: Self::feedback_id(interaction),
                    label: "Revision Feedback",
                    content_type: ContentType::Text,
                    content: feedback.to_string(),
                    summary: generate_summary(&format!("Revision request for {}", phase), feedback),
                    category: Some(Category::Feedback),
                    tags: tag_set(&["phase_review", "feedback", "revision_request"]),
                    importance: 9,
                    confidence: CONFIDENCE,
                },
            ));
        }
        Ok(out)
    }

    fn related_source_ids(&self, interaction: &AppletInteraction) -> Vec<String> {
        vec![Self::feedback_id(interaction)]
    }
}

// ═══════════════════════════════════════════════════════════════════════
// ai_narrative_generator
// ═══════════════════════════════════════════════════════════════════════

pub struct AiNarrativeGenerator;

#[derive(Debug, Deserialize)]
struct NarrativePayload {
    #[serde(default, alias = "generated_narrative", alias = "content")]
    narrative: Option<String>,
    #[serde(default)]
    sections: Option<Value>,
}

impl AppletHandler for AiNarrativeGenerator {
    fn applet_type(&self) -> &str {
        "ai_narrative_generator"
    }

    fn extract(&self, interaction: &AppletInteraction) -> ExtractorResult<AdapterOutput> {
        let body: NarrativePayload = payload(interaction, &interaction.data)?;
        let narrative = body
            .narrative
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        let sections = body.sections.filter(|s| value_text(s).is_some());
        let Some(preview) = narrative
            .map(|n| n.to_string())
            .or_else(|| sections.as_ref().and_then(value_text))
        else {
            return Ok(AdapterOutput::default());
        };

        let content = json!({ "narrative": narrative, "sections": sections });
        Ok(vec![build(
            interaction,
            ItemParts {
                source_id: interaction.id.clone(),
                label: "Project Narrative",
                content_type: ContentType::StructuredData,
                content: content.to_string(),
                summary: generate_summary(
                    "AI-generated project narrative",
                    truncate_chars(&preview, 1000),
                ),
                category: Some(Category::ContentStrategy),
                tags: tag_set(&["ai_narrative", "narrative", "content"]),
                importance: 7,
                confidence: NARRATIVE_CONFIDENCE,
            },
        )]
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Applet;

    fn interaction(applet_type: &str, config: Value, data: Value) -> AppletInteraction {
        AppletInteraction {
            id: "ai1".into(),
            project_id: "p1".into(),
            applet: Applet {
                id: "a1".into(),
                name: "Design Review".into(),
                applet_type: applet_type.into(),
                config,
            },
            user_id: Some("u1".into()),
            data,
        }
    }

    fn run(i: &AppletInteraction) -> AdapterOutput {
        AppletRegistry::with_builtins().extract(i).unwrap()
    }

    fn tags(d: &ItemDraft) -> Vec<&str> {
        d.tags.iter().map(String::as_str).collect()
    }

    #[test]
    fn registry_holds_every_builtin() {
        let registry = AppletRegistry::with_builtins();
        assert_eq!(registry.len(), 8);
        assert!(registry.find("phase_review").is_some());
        assert!(registry.find("unknown").is_none());
    }

    #[test]
    fn phase_review_approval_is_one_milestone_item() {
        let i = interaction(
            "phase_review",
            json!({ "remaining_revisions": 2 }),
            json!({ "decision": "approve", "feedback": "" }),
        );
        let out = run(&i);
        assert_eq!(out.drafts.len(), 1);
        let item = &out.drafts[0];
        let mut expected = vec!["phase_review", "milestone", "approve", "revisions_2"];
        expected.sort();
        assert_eq!(tags(item), expected);
        assert_eq!(item.importance, 10);
        assert_eq!(item.source_id, "ai1");
    }

    #[test]
    fn phase_review_revision_adds_feedback_item() {
        let i = interaction(
            "phase_review",
            json!({ "max_revisions": 3 }),
            json!({ "decision": "revise", "feedback": "Make the logo bigger", "revisions_used": 1 }),
        );
        let out = run(&i);
        assert_eq!(out.drafts.len(), 2);
        assert!(out.drafts[0].tags.contains("revisions_2"));
        let feedback = &out.drafts[1];
        assert_eq!(feedback.source_id, "ai1_feedback");
        assert_eq!(feedback.category, Some(Category::Feedback));
        assert_eq!(feedback.content, "Make the logo bigger");
    }

    #[test]
    fn phase_review_accepts_string_revision_counts() {
        let i = interaction(
            "phase_review",
            json!({ "max_revisions": "3" }),
            json!({ "decision": "approve", "revisions_used": "1" }),
        );
        let out = run(&i);
        assert_eq!(out.drafts.len(), 1);
        assert!(out.drafts[0].tags.contains("revisions_2"));
    }

    #[test]
    fn phase_review_ignores_unreadable_config() {
        let i = interaction(
            "phase_review",
            json!({ "phase_name": ["not", "a", "name"], "remaining_revisions": 1 }),
            json!({ "decision": "approve" }),
        );
        let out = run(&i);
        assert_eq!(out.drafts.len(), 1);
        assert_eq!(
            out.drafts[0].summary,
            "Client approved the Design Review phase"
        );

        let both_names = interaction(
            "phase_review",
            json!({ "phase": "Content", "phase_name": "Design" }),
            json!({ "decision": "approve" }),
        );
        assert_eq!(
            run(&both_names).drafts[0].summary,
            "Client approved the Design phase"
        );
    }

    #[test]
    fn tone_of_voice_summary() {
        let i = interaction(
            "tone_of_voice",
            json!({}),
            json!({ "selected_tone": { "toneName": "Playful", "level": 3 } }),
        );
        let out = run(&i);
        assert_eq!(
            out.drafts[0].summary,
            "Client selected brand voice: Playful at 3 level"
        );
        let content: Value = serde_json::from_str(&out.drafts[0].content).unwrap();
        assert_eq!(content, json!({ "toneName": "Playful", "level": 3 }));
    }

    #[test]
    fn palette_lists_colors() {
        let i = interaction(
            "palette_cleanser",
            json!({}),
            json!({ "selected_palette": { "name": "Ocean", "colors": ["#003366", { "hex": "#66ccff", "name": "Sky" }] } }),
        );
        let out = run(&i);
        assert_eq!(
            out.drafts[0].summary,
            "Client selected color palette: Ocean (#003366, Sky #66ccff)"
        );
        assert_eq!(out.drafts[0].category, Some(Category::DesignPreferences));
    }

    #[test]
    fn link_submission_queues_current_site() {
        let i = interaction(
            "link_submission",
            json!({}),
            json!({ "links": [
                { "url": "https://old.acme.test", "type": "current_site" },
                { "url": "https://competitor.test", "type": "inspiration" }
            ] }),
        );
        let out = run(&i);
        assert_eq!(out.website_urls, vec!["https://old.acme.test".to_string()]);
        assert!(out.drafts[0].tags.contains("current_site"));
        assert!(out.drafts[0].summary.starts_with("Client submitted 2 link(s)"));
    }

    #[test]
    fn sitemap_counts_nested_pages() {
        let i = interaction(
            "sitemap_builder",
            json!({}),
            json!({ "pages": [
                { "title": "Home" },
                { "title": "Services", "children": [{ "title": "Design" }, { "title": "Build" }] }
            ] }),
        );
        let out = run(&i);
        assert_eq!(
            out.drafts[0].summary,
            "Sitemap with 4 pages. Top level: Home, Services"
        );
    }

    #[test]
    fn unknown_type_gets_generic_item() {
        let i = interaction("mood_board", json!({}), json!({ "pins": [1, 2] }));
        let out = run(&i);
        assert_eq!(out.drafts.len(), 1);
        assert_eq!(out.drafts[0].category, None);
        assert_eq!(out.drafts[0].importance, 5);
        assert_eq!(tags(&out.drafts[0]), vec!["applet", "mood_board"]);
    }

    #[test]
    fn malformed_payload_is_rejected() {
        let i = interaction("sitemap_builder", json!({}), json!({ "pages": "nope" }));
        let err = AppletRegistry::with_builtins().extract(&i).unwrap_err();
        assert!(matches!(err, ExtractorError::InvalidPayload(_)));
    }
}
