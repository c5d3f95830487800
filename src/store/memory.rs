//! In-memory [`Store`] implementation for tests and embedding.
//!
//! Source records live in `HashMap`s seeded through the `put_*` helpers;
//! knowledge items and queue entries live in `Vec`s so insertion order is
//! the FIFO tie-break for queue polling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{
    AppletInteraction, ChatMessage, FileRecord, FormResponse, ItemFilter, KnowledgeItem, Project,
    QueueEntry, QueueStatus, SourceKey, SourceType,
};

use super::Store;

#[derive(Default)]
struct Sources {
    projects: HashMap<String, Project>,
    form_responses: HashMap<String, FormResponse>,
    applet_interactions: HashMap<String, AppletInteraction>,
    chat_messages: HashMap<String, ChatMessage>,
    files: HashMap<String, FileRecord>,
}

#[derive(Default)]
pub struct InMemoryStore {
    sources: RwLock<Sources>,
    items: RwLock<Vec<KnowledgeItem>>,
    queue: RwLock<Vec<QueueEntry>>,
    fail_inserts: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_project(&self, project: Project) {
        self.sources
            .write()
            .await
            .projects
            .insert(project.id.clone(), project);
    }

    pub async fn put_form_response(&self, response: FormResponse) {
        self.sources
            .write()
            .await
            .form_responses
            .insert(response.id.clone(), response);
    }

    pub async fn put_applet_interaction(&self, interaction: AppletInteraction) {
        self.sources
            .write()
            .await
            .applet_interactions
            .insert(interaction.id.clone(), interaction);
    }

    pub async fn put_chat_message(&self, message: ChatMessage) {
        self.sources
            .write()
            .await
            .chat_messages
            .insert(message.id.clone(), message);
    }

    pub async fn put_file(&self, file: FileRecord) {
        self.sources.write().await.files.insert(file.id.clone(), file);
    }

    /// Makes every subsequent [`Store::insert_items`] call fail.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Every stored item, current or not, in insertion order.
    pub async fn all_items(&self) -> Vec<KnowledgeItem> {
        self.items.read().await.clone()
    }
}

fn matches_key(item: &KnowledgeItem, key: &SourceKey) -> bool {
    item.project_id == key.project_id
        && item.source_type == key.source_type
        && item.source_id == key.source_id
}

fn entry_matches(entry: &QueueEntry, key: &SourceKey) -> bool {
    entry.project_id == key.project_id
        && entry.source_type == key.source_type
        && entry.source_id == key.source_id
}

impl InMemoryStore {
    async fn update_entry<F>(&self, key: &SourceKey, f: F) -> bool
    where
        F: FnOnce(&mut QueueEntry),
    {
        let mut queue = self.queue.write().await;
        match queue.iter_mut().find(|e| entry_matches(e, key)) {
            Some(entry) => {
                f(entry);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        Ok(self.sources.read().await.projects.get(id).cloned())
    }

    async fn get_form_response(&self, id: &str) -> Result<Option<FormResponse>> {
        Ok(self.sources.read().await.form_responses.get(id).cloned())
    }

    async fn get_applet_interaction(&self, id: &str) -> Result<Option<AppletInteraction>> {
        Ok(self.sources.read().await.applet_interactions.get(id).cloned())
    }

    async fn get_chat_message(&self, id: &str) -> Result<Option<ChatMessage>> {
        Ok(self.sources.read().await.chat_messages.get(id).cloned())
    }

    async fn get_file(&self, id: &str) -> Result<Option<FileRecord>> {
        Ok(self.sources.read().await.files.get(id).cloned())
    }

    async fn supersede_items(&self, key: &SourceKey) -> Result<u64> {
        let mut items = self.items.write().await;
        let mut count = 0;
        for item in items
            .iter_mut()
            .filter(|i| i.is_current && matches_key(i, key))
        {
            item.is_current = false;
            count += 1;
        }
        Ok(count)
    }

    async fn supersede_items_with_prefix(
        &self,
        project_id: &str,
        source_type: SourceType,
        prefix: &str,
    ) -> Result<u64> {
        let mut items = self.items.write().await;
        let mut count = 0;
        for item in items.iter_mut().filter(|i| {
            i.is_current
                && i.project_id == project_id
                && i.source_type == source_type
                && i.source_id.starts_with(prefix)
        }) {
            item.is_current = false;
            count += 1;
        }
        Ok(count)
    }

    async fn insert_items(&self, items: &[KnowledgeItem]) -> Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            bail!("knowledge_items insert rejected");
        }
        self.items.write().await.extend_from_slice(items);
        Ok(())
    }

    async fn list_items(
        &self,
        project_id: &str,
        filter: &ItemFilter,
    ) -> Result<Vec<KnowledgeItem>> {
        let items = self.items.read().await;
        let mut out: Vec<KnowledgeItem> = items
            .iter()
            .filter(|i| i.project_id == project_id)
            .filter(|i| filter.include_stale || i.is_current)
            .filter(|i| filter.source_type.map_or(true, |st| i.source_type == st))
            .filter(|i| {
                filter
                    .source_id
                    .as_deref()
                    .map_or(true, |sid| i.source_id == sid)
            })
            .cloned()
            .collect();
        // Stable sort keeps insertion order within one timestamp.
        out.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        Ok(out)
    }

    async fn enqueue(&self, entry: &QueueEntry) -> Result<bool> {
        let key = SourceKey::new(&entry.project_id, entry.source_type, &entry.source_id);
        let mut queue = self.queue.write().await;
        if queue.iter().any(|e| entry_matches(e, &key)) {
            return Ok(false);
        }
        queue.push(entry.clone());
        Ok(true)
    }

    async fn pending_entries(
        &self,
        project_id: &str,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<QueueEntry>> {
        let queue = self.queue.read().await;
        let mut pending: Vec<QueueEntry> = queue
            .iter()
            .filter(|e| {
                e.project_id == project_id
                    && matches!(e.status, QueueStatus::Pending | QueueStatus::Failed)
                    && e.attempts < max_attempts
            })
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        pending.truncate(limit);
        Ok(pending)
    }

    async fn get_queue_entry(&self, key: &SourceKey) -> Result<Option<QueueEntry>> {
        let queue = self.queue.read().await;
        Ok(queue.iter().find(|e| entry_matches(e, key)).cloned())
    }

    async fn list_queue(&self, project_id: &str) -> Result<Vec<QueueEntry>> {
        let queue = self.queue.read().await;
        Ok(queue
            .iter()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn mark_processing(&self, key: &SourceKey, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .update_entry(key, |e| {
                e.status = QueueStatus::Processing;
                e.updated_at = at;
            })
            .await)
    }

    async fn mark_completed(&self, key: &SourceKey, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .update_entry(key, |e| {
                e.status = QueueStatus::Completed;
                e.error_message = None;
                e.processed_at = Some(at);
                e.updated_at = at;
            })
            .await)
    }

    async fn mark_failed(&self, key: &SourceKey, error: &str, at: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .update_entry(key, |e| {
                e.status = QueueStatus::Failed;
                e.error_message = Some(error.to_string());
                e.attempts += 1;
                e.updated_at = at;
            })
            .await)
    }
}
