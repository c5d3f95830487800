//! Uploaded file adapter.
//!
//! Bytes are fetched from the file's public URL, then from its storage
//! path. If neither works, or the document is larger than the configured
//! ceiling, the item is built from a metadata-only placeholder instead of
//! failing the extraction.

use serde_json::json;
use tracing::{debug, warn};

use crate::classify::{categorize_file, extract_tags, file_importance};
use crate::models::{ContentType, FileRecord, ItemDraft, SourceType};
use crate::readers::{placeholder, read_document, ReadOutput};
use crate::storage::{ObjectStorage, TooLarge};
use crate::summary::truncate_chars;

const PARSED_CONFIDENCE: f64 = 0.9;
const PLACEHOLDER_CONFIDENCE: f64 = 0.5;
/// How much of the body is scanned for vocabulary tags.
const TAG_SCAN_CHARS: usize = 5000;

enum Fetched {
    Bytes(Vec<u8>),
    TooLarge,
    Missing,
}

/// Whether a storage error means the document is over the size limit.
fn oversized(file: &FileRecord, err: &anyhow::Error) -> bool {
    match err.downcast_ref::<TooLarge>() {
        Some(too_large) => {
            warn!(
                file_id = %file.id,
                size = too_large.size,
                max_bytes = too_large.limit,
                "document exceeds size limit, storing metadata only"
            );
            true
        }
        None => false,
    }
}

/// Tries every location the file may be stored at, in order. An oversized
/// document stops the search.
async fn fetch_bytes(file: &FileRecord, storage: &dyn ObjectStorage, max_bytes: u64) -> Fetched {
    if let Some(url) = file.file_url.as_deref().filter(|u| !u.is_empty()) {
        match storage.fetch_url(url, max_bytes).await {
            Ok(bytes) => return Fetched::Bytes(bytes),
            Err(e) if oversized(file, &e) => return Fetched::TooLarge,
            Err(e) => warn!(file_id = %file.id, error = %e, "public URL fetch failed, trying storage path"),
        }
    }
    if let Some(path) = file.storage_path.as_deref().filter(|p| !p.is_empty()) {
        match storage.download(path, max_bytes).await {
            Ok(bytes) => return Fetched::Bytes(bytes),
            Err(e) if oversized(file, &e) => return Fetched::TooLarge,
            Err(e) => warn!(file_id = %file.id, error = %e, "storage download failed"),
        }
    }
    Fetched::Missing
}

/// Reads the file's content, degrading to a placeholder when it cannot be
/// fetched or is too large.
pub async fn read_file(
    file: &FileRecord,
    storage: &dyn ObjectStorage,
    max_bytes: u64,
) -> ReadOutput {
    let mime = file.mime_type.as_deref();
    match fetch_bytes(file, storage, max_bytes).await {
        Fetched::Bytes(bytes) => {
            debug!(file_id = %file.id, size = bytes.len(), "reading document");
            read_document(&bytes, mime, &file.file_name)
        }
        Fetched::TooLarge | Fetched::Missing => placeholder(&file.file_name, mime),
    }
}

fn extension(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Shapes a file's read output into an item. `None` when there is nothing
/// at all to store.
pub fn file_item(file: &FileRecord, output: ReadOutput) -> Option<ItemDraft> {
    if output.is_empty() {
        return None;
    }

    let category = categorize_file(&file.file_name, &output.content);
    let ext = extension(&file.file_name);
    let mut base = vec!["file"];
    if let Some(ext) = ext.as_deref() {
        base.push(ext);
    }
    let tags = extract_tags(
        &file.file_name,
        truncate_chars(&output.content, TAG_SCAN_CHARS),
        &base,
    );

    Some(ItemDraft {
        source_type: SourceType::FileDocument,
        source_id: file.id.clone(),
        source_name: file.file_name.clone(),
        content_type: ContentType::Text,
        category: Some(category),
        importance: file_importance(category),
        confidence: if output.degraded {
            PLACEHOLDER_CONFIDENCE
        } else {
            PARSED_CONFIDENCE
        },
        tags,
        metadata: Some(json!({
            "file_name": file.file_name,
            "mime_type": file.mime_type,
            "file_size": file.file_size,
            "uploaded_by": file.uploaded_by,
            "extraction": if output.degraded { "metadata_only" } else { "full" },
        })),
        content: output.content,
        summary: output.summary,
    })
}
