//! Heuristic classifiers.
//!
//! Pure, deterministic functions mapping labels, filenames and message
//! bodies onto the [`Category`] taxonomy, an importance score in `0..=10`
//! and a set of lowercase keyword tags. All keyword matching is
//! case-insensitive substring matching; rule tables are ordered and the
//! first matching rule wins.

use std::collections::BTreeSet;

use crate::models::{is_client_role, Category};

/// Ordered keyword triggers shared by field and chat categorization.
const CATEGORY_RULES: &[(&[&str], Category)] = &[
    (&["brand", "logo", "identity"], Category::BrandIdentity),
    (&["design", "style", "ui", "ux"], Category::DesignPreferences),
    (&["content", "tone", "voice", "message"], Category::ContentStrategy),
    (&["feature", "function", "requirement"], Category::Functionality),
    (
        &["audience", "user", "customer", "demographic"],
        Category::TargetAudience,
    ),
    (&["goal", "objective", "kpi", "metric"], Category::BusinessGoals),
    (
        &["technical", "platform", "integration"],
        Category::TechnicalSpecs,
    ),
    (&["feedback", "revision", "comment"], Category::Feedback),
    (&["inspiration", "reference", "example"], Category::Inspiration),
];

/// Filename/content triggers for uploaded documents, checked in order.
const FILE_CATEGORY_RULES: &[(&[&str], Category)] = &[
    (&["brand", "logo", "guideline"], Category::BrandIdentity),
    (
        &["requirement", "spec", "brief", "scope", "rfp"],
        Category::Requirements,
    ),
    (
        &["design", "mockup", "wireframe", "style", "moodboard"],
        Category::DesignPreferences,
    ),
];

/// How much of a document body the file categorizer inspects.
const FILE_CONTENT_SCAN_CHARS: usize = 2000;

/// Keywords that become tags when found in a label or body.
const TAG_VOCABULARY: &[&str] = &[
    "brand",
    "logo",
    "color",
    "font",
    "typography",
    "layout",
    "navigation",
    "mobile",
    "responsive",
    "accessibility",
    "seo",
    "ecommerce",
    "analytics",
    "integration",
    "social",
    "video",
    "photography",
    "animation",
    "content",
    "audience",
    "goal",
    "feature",
    "budget",
    "timeline",
    "deadline",
];

/// Chat tag → any of these patterns adds the tag.
const CHAT_TAG_PATTERNS: &[(&str, &[&str])] = &[
    ("design", &["design", "layout", "mockup", "wireframe"]),
    ("branding", &["brand", "logo", "identity"]),
    ("colors", &["color", "colour", "palette"]),
    ("typography", &["font", "typography", "typeface"]),
    ("content", &["content", "copy", "wording", "headline"]),
    ("functionality", &["feature", "functionality", "integration"]),
    ("timeline", &["deadline", "timeline", "launch", "schedule"]),
    ("budget", &["budget", "cost", "price", "invoice"]),
    ("feedback", &["feedback", "revision", "change", "fix"]),
    ("seo", &["seo", "search engine", "ranking"]),
];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn match_category(text: &str) -> Option<Category> {
    let text = text.to_lowercase();
    CATEGORY_RULES
        .iter()
        .find(|(keywords, _)| contains_any(&text, keywords))
        .map(|(_, category)| *category)
}

/// Categorizes a form field by its label. `None` when no trigger matches.
pub fn categorize_content(label: &str) -> Option<Category> {
    match_category(label)
}

/// Importance of a form field from its label, then its field type.
pub fn calculate_importance(label: &str, field_type: &str) -> u8 {
    let label = label.to_lowercase();
    if contains_any(&label, &["must", "required", "critical"]) {
        return 10;
    }
    if contains_any(&label, &["brand", "goal", "objective"]) {
        return 9;
    }
    if contains_any(&label, &["preference", "style"]) {
        return 7;
    }
    match field_type.to_lowercase().as_str() {
        "file" | "url" => 7,
        "textarea" | "text" => 6,
        _ => 5,
    }
}

/// Categorizes an uploaded document. Filename triggers take precedence over
/// body triggers; anything unmatched is documentation.
pub fn categorize_file(filename: &str, content: &str) -> Category {
    let name = filename.to_lowercase();
    if let Some((_, category)) = FILE_CATEGORY_RULES
        .iter()
        .find(|(keywords, _)| contains_any(&name, keywords))
    {
        return *category;
    }

    let head = crate::summary::truncate_chars(content, FILE_CONTENT_SCAN_CHARS).to_lowercase();
    FILE_CATEGORY_RULES
        .iter()
        .find(|(keywords, _)| contains_any(&head, keywords))
        .map(|(_, category)| *category)
        .unwrap_or(Category::Documentation)
}

/// Importance of an uploaded document by its category.
pub fn file_importance(category: Category) -> u8 {
    match category {
        Category::Requirements | Category::BrandIdentity => 8,
        Category::DesignPreferences => 7,
        _ => 6,
    }
}

/// Categorizes a chat message body. Unmatched client messages are treated
/// as feedback, everything else as project info.
pub fn categorize_chat_message(content: &str, sender_role: &str) -> Category {
    match_category(content).unwrap_or(if is_client_role(sender_role) {
        Category::Feedback
    } else {
        Category::ProjectInfo
    })
}

/// Importance of a chat message, always in `0..=10`.
pub fn calculate_chat_importance(content: &str, sender_role: &str) -> u8 {
    let text = content.to_lowercase();
    let from_client = is_client_role(sender_role);

    if contains_any(&text, &["must", "critical", "requirement"]) {
        return 9;
    }
    if contains_any(&text, &["important", "priority", "essential"]) {
        return 8;
    }
    if from_client && contains_any(&text, &["want", "need", "expect"]) {
        return 8;
    }
    if contains_any(&text, &["goal", "objective", "deadline"]) {
        return 7;
    }
    if contains_any(&text, &["prefer", "like", "dislike"]) {
        return 6;
    }

    let base: usize = if from_client { 6 } else { 5 };
    let length_bonus = (content.chars().count() / 200).min(2);
    (base + length_bonus).min(10) as u8
}

/// Base tags plus every vocabulary keyword found in `label` or `content`.
pub fn extract_tags(label: &str, content: &str, base: &[&str]) -> BTreeSet<String> {
    let haystack = format!("{} {}", label, content).to_lowercase();
    let mut tags: BTreeSet<String> = base.iter().map(|t| t.to_lowercase()).collect();
    tags.extend(
        TAG_VOCABULARY
            .iter()
            .filter(|kw| haystack.contains(*kw))
            .map(|kw| kw.to_string()),
    );
    tags
}

/// Chat base tags plus every tag whose pattern list matches the body.
pub fn extract_chat_tags(content: &str, sender_role: &str) -> BTreeSet<String> {
    let text = content.to_lowercase();
    let mut tags = BTreeSet::new();
    tags.insert("chat".to_string());
    tags.insert(if is_client_role(sender_role) {
        "client_message".to_string()
    } else {
        "team_message".to_string()
    });
    for (tag, patterns) in CHAT_TAG_PATTERNS {
        if contains_any(&text, patterns) {
            tags.insert(tag.to_string());
        }
    }
    tags
}
