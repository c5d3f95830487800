//! Processing queue runner.
//!
//! Polls one batch of retryable entries for the extractor's project and
//! runs them one at a time through the same per-source work the public
//! `extract_from_*` operations use, with the same bookkeeping. A failing
//! entry is recorded and logged; it never stops the batch.
//!
//! Entries are selected while `attempts < max_attempts`. Once an entry has
//! failed `max_attempts` times it stays `failed` and is never polled
//! again.
//!
//! `website_content` entries have no extractor here. The runner moves them
//! to `processing` so a website extractor can claim them, and they stop
//! occupying batch slots.

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::adapters::chat::message_id_of_attachment;
use crate::error::ExtractorResult;
use crate::extractor::KnowledgeExtractor;
use crate::models::{QueueEntry, SourceType};

/// Outcome of one [`KnowledgeExtractor::process_extraction_queue`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueRunReport {
    pub selected: usize,
    pub completed: usize,
    pub failed: usize,
    /// `website_content` entries handed off as `processing`.
    pub skipped: usize,
}

impl KnowledgeExtractor {
    /// Processes up to `batch_size` queued entries, highest priority first.
    pub async fn process_extraction_queue(&self) -> ExtractorResult<QueueRunReport> {
        let entries = self
            .store
            .pending_entries(
                &self.project_id,
                self.config.max_attempts,
                self.config.batch_size,
            )
            .await?;

        let mut report = QueueRunReport {
            selected: entries.len(),
            ..Default::default()
        };

        for entry in &entries {
            let key = self.key(entry.source_type, &entry.source_id);
            if let Err(e) = self.store.mark_processing(&key, Utc::now()).await {
                warn!(%key, error = %e, "failed to mark queue entry processing");
            }
            if entry.source_type == SourceType::WebsiteContent {
                info!(%key, "no website extractor available, entry left processing");
                report.skipped += 1;
                continue;
            }

            match self.tracked(&key, self.dispatch(entry)).await {
                Ok(()) => report.completed += 1,
                Err(e) => {
                    error!(%key, attempts = entry.attempts + 1, error = %e, "queue entry failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            project_id = %self.project_id,
            selected = report.selected,
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            "processed extraction queue"
        );
        Ok(report)
    }

    async fn dispatch(&self, entry: &QueueEntry) -> ExtractorResult<()> {
        let id = entry.source_id.as_str();
        match entry.source_type {
            SourceType::ProjectMetadata => self.run_project(None).await.map(drop),
            SourceType::FormResponse => self.run_form_response(id).await.map(drop),
            SourceType::AppletInteraction => self.run_applet_interaction(id).await.map(drop),
            SourceType::FileDocument => self.run_file(id).await.map(drop),
            SourceType::ChatMessage => self.run_chat_message(id).await.map(drop),
            SourceType::ChatAttachment => self
                .run_chat_message(message_id_of_attachment(id))
                .await
                .map(drop),
            // Filtered out by the caller.
            SourceType::WebsiteContent => Ok(()),
        }
    }
}
