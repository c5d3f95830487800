//! Extraction orchestrator.
//!
//! A [`KnowledgeExtractor`] is bound to one project and drives every
//! source kind through the same sequence:
//!
//! ```text
//! fetch record → adapter → supersede current items → insert new items
//!                                                  → queue bookkeeping
//! ```
//!
//! Queue bookkeeping wraps every `extract_from_*` call uniformly: on
//! success the matching queue entry (if any) becomes `completed`; on error
//! it becomes `failed` with the message recorded and `attempts`
//! incremented, and the error is returned to the caller.
//!
//! Supersede and insert are two separate writes. A crash between them can
//! leave the previous generation current; concurrent extractions of the
//! same key are not serialized.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::adapters::applet::AppletRegistry;
use crate::adapters::{chat, file, form, project, AdapterOutput};
use crate::config::ExtractionConfig;
use crate::error::{ExtractorError, ExtractorResult};
use crate::models::{
    ItemDraft, KnowledgeItem, NewQueueEntry, Project, SourceKey, SourceType,
};
use crate::storage::ObjectStorage;
use crate::store::Store;

pub struct KnowledgeExtractor {
    pub(crate) project_id: String,
    pub(crate) store: Arc<dyn Store>,
    pub(crate) storage: Arc<dyn ObjectStorage>,
    pub(crate) applets: Arc<AppletRegistry>,
    pub(crate) config: ExtractionConfig,
}

impl KnowledgeExtractor {
    /// Create an extractor with the built-in applet handlers.
    pub fn new(
        project_id: impl Into<String>,
        store: Arc<dyn Store>,
        storage: Arc<dyn ObjectStorage>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            store,
            storage,
            applets: Arc::new(AppletRegistry::with_builtins()),
            config,
        }
    }

    /// Replace the applet registry.
    pub fn with_applets(mut self, applets: Arc<AppletRegistry>) -> Self {
        self.applets = applets;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub(crate) fn key(&self, source_type: SourceType, source_id: &str) -> SourceKey {
        SourceKey::new(&self.project_id, source_type, source_id)
    }

    // ── Public operations ────────────────────────────────────────────────

    /// Extracts project metadata. Pass the project when the caller already
    /// holds it to skip the fetch.
    pub async fn extract_from_project(
        &self,
        project: Option<&Project>,
    ) -> ExtractorResult<Vec<KnowledgeItem>> {
        let key = self.key(SourceType::ProjectMetadata, &self.project_id);
        self.tracked(&key, self.run_project(project)).await
    }

    pub async fn extract_from_form_response(
        &self,
        response_id: &str,
    ) -> ExtractorResult<Vec<KnowledgeItem>> {
        let key = self.key(SourceType::FormResponse, response_id);
        self.tracked(&key, self.run_form_response(response_id)).await
    }

    pub async fn extract_from_applet_interaction(
        &self,
        interaction_id: &str,
    ) -> ExtractorResult<Vec<KnowledgeItem>> {
        let key = self.key(SourceType::AppletInteraction, interaction_id);
        self.tracked(&key, self.run_applet_interaction(interaction_id))
            .await
    }

    /// Returns `None` when the file yielded nothing at all to store.
    pub async fn extract_from_file(&self, file_id: &str) -> ExtractorResult<Option<KnowledgeItem>> {
        let key = self.key(SourceType::FileDocument, file_id);
        self.tracked(&key, self.run_file(file_id)).await
    }

    pub async fn extract_from_chat_message(
        &self,
        message_id: &str,
    ) -> ExtractorResult<Vec<KnowledgeItem>> {
        let key = self.key(SourceType::ChatMessage, message_id);
        self.tracked(&key, self.run_chat_message(message_id)).await
    }

    /// Enqueues a `website_content` extraction for `url` at the configured
    /// website priority. Returns `false` if one is already queued.
    pub async fn queue_website_extraction(&self, url: &str) -> ExtractorResult<bool> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ExtractorError::InvalidPayload(
                "website URL must not be empty".to_string(),
            ));
        }
        self.enqueue(
            SourceType::WebsiteContent,
            url,
            self.config.website_priority,
            Some(url.to_string()),
        )
        .await
    }

    /// Inserts a pending queue entry unless one already exists for the key.
    pub async fn enqueue(
        &self,
        source_type: SourceType,
        source_id: &str,
        priority: i64,
        source_url: Option<String>,
    ) -> ExtractorResult<bool> {
        let entry = NewQueueEntry {
            project_id: self.project_id.clone(),
            source_type,
            source_id: source_id.to_string(),
            source_url,
            priority,
        };
        let key = entry.key();
        let created = self.store.enqueue(&entry.into_entry(Utc::now())).await?;
        if created {
            info!(%key, priority, "queued extraction");
        } else {
            debug!(%key, "extraction already queued");
        }
        Ok(created)
    }

    // ── Bookkeeping ──────────────────────────────────────────────────────

    /// Runs `work` and records its outcome on the queue entry for `key`.
    /// Missing queue entries are not an error.
    pub(crate) async fn tracked<T, F>(&self, key: &SourceKey, work: F) -> ExtractorResult<T>
    where
        F: Future<Output = ExtractorResult<T>>,
    {
        match work.await {
            Ok(value) => {
                if let Err(e) = self.store.mark_completed(key, Utc::now()).await {
                    warn!(%key, error = %e, "failed to mark queue entry completed");
                }
                Ok(value)
            }
            Err(err) => {
                let message = err.to_string();
                error!(%key, error = %message, "extraction failed");
                match self.store.mark_failed(key, &message, Utc::now()).await {
                    Ok(true) => debug!(%key, "queue entry marked failed"),
                    Ok(false) => {}
                    Err(e) => warn!(%key, error = %e, "failed to mark queue entry failed"),
                }
                Err(err)
            }
        }
    }

    /// A record owned by another project is reported as missing.
    fn ensure_owned(&self, kind: &'static str, id: &str, owner: &str) -> ExtractorResult<()> {
        if owner == self.project_id {
            return Ok(());
        }
        warn!(
            project_id = %self.project_id,
            owner,
            kind,
            id,
            "source record belongs to another project"
        );
        Err(ExtractorError::not_found(kind, id))
    }

    /// Supersedes every key in `stale_keys` and every key a draft is
    /// written under, then inserts the drafts as the new current
    /// generation.
    async fn write_generation(
        &self,
        stale_keys: Vec<SourceKey>,
        drafts: Vec<ItemDraft>,
    ) -> ExtractorResult<Vec<KnowledgeItem>> {
        let mut keys = stale_keys;
        for draft in &drafts {
            let key = draft.key(&self.project_id);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        for key in &keys {
            let superseded = self.store.supersede_items(key).await?;
            if superseded > 0 {
                debug!(%key, superseded, "superseded previous items");
            }
        }

        if drafts.is_empty() {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let items: Vec<KnowledgeItem> = drafts
            .into_iter()
            .map(|d| d.into_item(&self.project_id, now))
            .collect();
        match self.store.insert_items(&items).await {
            Ok(()) => {
                info!(
                    project_id = %self.project_id,
                    count = items.len(),
                    "inserted knowledge items"
                );
                Ok(items)
            }
            Err(e) if self.config.strict_writes => Err(e.into()),
            Err(e) => {
                warn!(
                    project_id = %self.project_id,
                    count = items.len(),
                    error = %e,
                    "knowledge item insert failed; continuing without persistence"
                );
                Ok(items)
            }
        }
    }

    /// Queues every website URL an adapter asked for. Failures are logged
    /// and never fail the extraction.
    async fn queue_requested_websites(&self, output: &AdapterOutput) {
        for url in &output.website_urls {
            if let Err(e) = self.queue_website_extraction(url).await {
                warn!(url = %url, error = %e, "failed to queue website extraction");
            }
        }
    }

    // ── Per-source work, without bookkeeping ─────────────────────────────

    pub(crate) async fn run_project(
        &self,
        project: Option<&Project>,
    ) -> ExtractorResult<Vec<KnowledgeItem>> {
        let fetched;
        let project = match project {
            Some(p) => p,
            None => {
                fetched = self
                    .store
                    .get_project(&self.project_id)
                    .await?
                    .ok_or_else(|| ExtractorError::not_found("project", &self.project_id))?;
                &fetched
            }
        };
        self.ensure_owned("project", &project.id, &project.id)?;
        let stale = project::SUB_KEYS
            .iter()
            .map(|suffix| {
                self.key(
                    SourceType::ProjectMetadata,
                    &project::sub_key(&project.id, suffix),
                )
            })
            .collect();
        self.write_generation(stale, project::project_items(project))
            .await
    }

    pub(crate) async fn run_form_response(
        &self,
        response_id: &str,
    ) -> ExtractorResult<Vec<KnowledgeItem>> {
        let response = self
            .store
            .get_form_response(response_id)
            .await?
            .ok_or_else(|| ExtractorError::not_found("form response", response_id))?;
        self.ensure_owned("form response", response_id, &response.project_id)?;
        let output = form::form_items(&response);
        self.queue_requested_websites(&output).await;
        let primary = self.key(SourceType::FormResponse, response_id);
        self.write_generation(vec![primary], output.drafts).await
    }

    pub(crate) async fn run_applet_interaction(
        &self,
        interaction_id: &str,
    ) -> ExtractorResult<Vec<KnowledgeItem>> {
        let interaction = self
            .store
            .get_applet_interaction(interaction_id)
            .await?
            .ok_or_else(|| ExtractorError::not_found("applet interaction", interaction_id))?;
        self.ensure_owned("applet interaction", interaction_id, &interaction.project_id)?;
        let output = self.applets.extract(&interaction)?;
        self.queue_requested_websites(&output).await;

        let mut stale = vec![self.key(SourceType::AppletInteraction, interaction_id)];
        stale.extend(
            self.applets
                .related_source_ids(&interaction)
                .iter()
                .map(|id| self.key(SourceType::AppletInteraction, id)),
        );
        self.write_generation(stale, output.drafts).await
    }

    pub(crate) async fn run_file(&self, file_id: &str) -> ExtractorResult<Option<KnowledgeItem>> {
        let record = self
            .store
            .get_file(file_id)
            .await?
            .ok_or_else(|| ExtractorError::not_found("file", file_id))?;
        self.ensure_owned("file", file_id, &record.project_id)?;
        let output =
            file::read_file(&record, self.storage.as_ref(), self.config.max_document_bytes).await;
        let primary = self.key(SourceType::FileDocument, file_id);
        let Some(draft) = file::file_item(&record, output) else {
            warn!(file_id, "file produced no content, nothing stored");
            self.write_generation(vec![primary], Vec::new()).await?;
            return Ok(None);
        };
        let items = self.write_generation(vec![primary], vec![draft]).await?;
        Ok(items.into_iter().next())
    }

    pub(crate) async fn run_chat_message(
        &self,
        message_id: &str,
    ) -> ExtractorResult<Vec<KnowledgeItem>> {
        let message = self
            .store
            .get_chat_message(message_id)
            .await?
            .ok_or_else(|| ExtractorError::not_found("chat message", message_id))?;
        self.ensure_owned("chat message", message_id, &message.project_id)?;

        // Attachments dropped since the last extraction have no draft to
        // supersede them by key.
        let superseded = self
            .store
            .supersede_items_with_prefix(
                &self.project_id,
                SourceType::ChatAttachment,
                &chat::attachment_prefix(message_id),
            )
            .await?;
        if superseded > 0 {
            debug!(message_id, superseded, "superseded previous attachments");
        }
        let stale = vec![self.key(SourceType::ChatMessage, message_id)];
        self.write_generation(stale, chat::chat_items(&message))
            .await
    }
}
