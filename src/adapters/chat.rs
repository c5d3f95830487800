//! Chat message adapter.
//!
//! The message body becomes one item; each attachment becomes its own
//! `chat_attachment` item keyed `{message_id}_attachment_{n}`.

use std::collections::BTreeSet;

use serde_json::json;

use crate::classify::{calculate_chat_importance, categorize_chat_message, extract_chat_tags};
use crate::models::{Category, ChatAttachment, ChatMessage, ContentType, ItemDraft, SourceType};
use crate::summary::generate_chat_summary;

const CONFIDENCE: f64 = 0.9;
const ATTACHMENT_IMPORTANCE: u8 = 6;
const ATTACHMENT_SEPARATOR: &str = "_attachment_";

pub fn attachment_source_id(message_id: &str, index: usize) -> String {
    format!("{}{}{}", message_id, ATTACHMENT_SEPARATOR, index)
}

/// Prefix shared by every attachment source id of `message_id`.
pub fn attachment_prefix(message_id: &str) -> String {
    format!("{}{}", message_id, ATTACHMENT_SEPARATOR)
}

/// The message id an attachment source id was derived from.
pub fn message_id_of_attachment(source_id: &str) -> &str {
    source_id
        .rsplit_once(ATTACHMENT_SEPARATOR)
        .map(|(message_id, _)| message_id)
        .unwrap_or(source_id)
}

fn source_name(message: &ChatMessage) -> String {
    format!(
        "{} - {}",
        message.conversation_title.as_deref().unwrap_or("Chat"),
        message.sender_name
    )
}

pub fn chat_items(message: &ChatMessage) -> Vec<ItemDraft> {
    let mut drafts = Vec::with_capacity(1 + message.attachments.len());
    drafts.extend(message_item(message));
    drafts.extend(
        message
            .attachments
            .iter()
            .enumerate()
            .map(|(i, attachment)| attachment_item(message, i, attachment)),
    );
    drafts
}

fn message_item(message: &ChatMessage) -> Option<ItemDraft> {
    let content = message.content.trim();
    if content.is_empty() {
        return None;
    }
    let role = message.sender_role.as_str();
    Some(ItemDraft {
        source_type: SourceType::ChatMessage,
        source_id: message.id.clone(),
        source_name: source_name(message),
        content_type: ContentType::Text,
        content: content.to_string(),
        summary: generate_chat_summary(content, &message.sender_name),
        category: Some(categorize_chat_message(content, role)),
        tags: extract_chat_tags(content, role),
        importance: calculate_chat_importance(content, role),
        confidence: CONFIDENCE,
        metadata: Some(json!({
            "conversation_id": message.conversation_id,
            "sender_id": message.sender_id,
            "sender_role": message.sender_role,
        })),
    })
}

fn attachment_item(message: &ChatMessage, index: usize, attachment: &ChatAttachment) -> ItemDraft {
    let provenance = if message.is_from_client() {
        "client_provided"
    } else {
        "agency_provided"
    };
    let mut tags: BTreeSet<String> = ["chat", "attachment", provenance]
        .iter()
        .map(|t| t.to_string())
        .collect();
    if let Some(ext) = attachment
        .name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
    {
        tags.insert(ext);
    }

    let kind = attachment.mime_type.as_deref().unwrap_or("file");
    ItemDraft {
        source_type: SourceType::ChatAttachment,
        source_id: attachment_source_id(&message.id, index),
        source_name: format!("{} - {}", source_name(message), attachment.name),
        content_type: ContentType::StructuredData,
        content: json!({
            "name": attachment.name,
            "url": attachment.url,
            "type": attachment.mime_type,
            "size": attachment.size,
        })
        .to_string(),
        summary: format!("{} shared {} ({})", message.sender_name, attachment.name, kind),
        category: Some(Category::Inspiration),
        tags,
        importance: ATTACHMENT_IMPORTANCE,
        confidence: CONFIDENCE,
        metadata: Some(json!({
            "message_id": message.id,
            "conversation_id": message.conversation_id,
            "sender_role": message.sender_role,
        })),
    }
}
