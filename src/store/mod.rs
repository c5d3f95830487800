//! Persistence abstraction for the knowledge pipeline.
//!
//! The [`Store`] trait is the whole persistence contract: record lookups
//! for every ingestible source (with the joins each adapter needs),
//! supersede/insert/list for knowledge items, and insert-ignore,
//! poll and update-by-key for the extraction queue. Nothing here wraps
//! more than one statement in a transaction.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    AppletInteraction, ChatMessage, FileRecord, FormResponse, ItemFilter, KnowledgeItem, Project,
    QueueEntry, SourceKey, SourceType,
};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_project`](Store::get_project) and friends | Fetch a source record with its joins |
/// | [`supersede_items`](Store::supersede_items) | Mark current items for a key as stale |
/// | [`supersede_items_with_prefix`](Store::supersede_items_with_prefix) | Same, for every source id under a prefix |
/// | [`insert_items`](Store::insert_items) | Append new knowledge items |
/// | [`list_items`](Store::list_items) | Read back knowledge items for a project |
/// | [`enqueue`](Store::enqueue) | Insert a queue entry, ignoring key conflicts |
/// | [`pending_entries`](Store::pending_entries) | Poll the queue in priority/FIFO order |
/// | [`mark_processing`](Store::mark_processing), [`mark_completed`](Store::mark_completed), [`mark_failed`](Store::mark_failed) | Queue status transitions by key |
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_project(&self, id: &str) -> Result<Option<Project>>;

    /// A form response joined with its form's name, field definitions and
    /// normalized answers.
    async fn get_form_response(&self, id: &str) -> Result<Option<FormResponse>>;

    /// An applet interaction joined with its applet and config.
    async fn get_applet_interaction(&self, id: &str) -> Result<Option<AppletInteraction>>;

    /// A chat message joined with its conversation and sender profile.
    async fn get_chat_message(&self, id: &str) -> Result<Option<ChatMessage>>;

    async fn get_file(&self, id: &str) -> Result<Option<FileRecord>>;

    /// Sets `is_current = false` on every current item under `key`.
    ///
    /// Returns the number of items superseded.
    async fn supersede_items(&self, key: &SourceKey) -> Result<u64>;

    /// Sets `is_current = false` on every current item of `source_type` in
    /// `project_id` whose `source_id` starts with `prefix`.
    async fn supersede_items_with_prefix(
        &self,
        project_id: &str,
        source_type: SourceType,
        prefix: &str,
    ) -> Result<u64>;

    async fn insert_items(&self, items: &[KnowledgeItem]) -> Result<()>;

    /// Items for a project, newest first.
    async fn list_items(&self, project_id: &str, filter: &ItemFilter)
        -> Result<Vec<KnowledgeItem>>;

    /// Inserts a queue entry unless one already exists for its key.
    ///
    /// Returns `true` when a new entry was created.
    async fn enqueue(&self, entry: &QueueEntry) -> Result<bool>;

    /// Retryable entries (`pending`, or `failed` with `attempts <
    /// max_attempts`), highest priority first, oldest first within a
    /// priority.
    async fn pending_entries(
        &self,
        project_id: &str,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<QueueEntry>>;

    async fn get_queue_entry(&self, key: &SourceKey) -> Result<Option<QueueEntry>>;

    /// All queue entries for a project, in creation order.
    async fn list_queue(&self, project_id: &str) -> Result<Vec<QueueEntry>>;

    /// Returns `false` when no entry exists for `key`.
    async fn mark_processing(&self, key: &SourceKey, at: DateTime<Utc>) -> Result<bool>;

    /// Sets `completed`, stamps `processed_at` and clears the error.
    async fn mark_completed(&self, key: &SourceKey, at: DateTime<Utc>) -> Result<bool>;

    /// Sets `failed`, records the error and increments `attempts`.
    async fn mark_failed(&self, key: &SourceKey, error: &str, at: DateTime<Utc>) -> Result<bool>;
}
