//! SQLite-backed [`Store`] implementation.
//!
//! Maps each [`Store`] operation onto the schema created by
//! [`crate::migrate`]. JSON-valued columns are TEXT; timestamps are integer
//! milliseconds, with `rowid` as the final tie-break for FIFO ordering.

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::config::Config;
use crate::models::{
    Applet, AppletInteraction, ChatAttachment, ChatMessage, FileRecord, FormAnswer, FormField,
    FormResponse, ItemFilter, KnowledgeItem, Project, QueueEntry, SourceKey, SourceType,
};

use super::Store;

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database configured in `[db].path`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let db_path = &config.db.path;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn parse_json(text: Option<String>) -> Result<Option<Value>> {
    text.filter(|t| !t.trim().is_empty())
        .map(|t| serde_json::from_str(&t).context("invalid JSON column"))
        .transpose()
}

fn json_or_null(text: Option<String>) -> Result<Value> {
    Ok(parse_json(text)?.unwrap_or(Value::Null))
}

fn row_to_item(row: &SqliteRow) -> Result<KnowledgeItem> {
    let source_type: String = row.try_get("source_type")?;
    let content_type: String = row.try_get("content_type")?;
    let category: Option<String> = row.try_get("category")?;
    let tags_json: String = row.try_get("tags_json")?;
    let importance: i64 = row.try_get("importance_score")?;
    Ok(KnowledgeItem {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        source_type: source_type.parse()?,
        source_id: row.try_get("source_id")?,
        source_name: row.try_get("source_name")?,
        content_type: content_type.parse()?,
        content: row.try_get("content")?,
        content_summary: row.try_get("content_summary")?,
        category: category.map(|c| c.parse()).transpose()?,
        tags: serde_json::from_str(&tags_json).context("invalid tags_json")?,
        importance_score: importance.clamp(0, 10) as u8,
        extracted_by: row.try_get("extracted_by")?,
        extraction_confidence: row.try_get("extraction_confidence")?,
        processed_at: from_millis(row.try_get("processed_at")?),
        is_current: row.try_get("is_current")?,
        metadata: parse_json(row.try_get("metadata_json")?)?,
    })
}

fn row_to_entry(row: &SqliteRow) -> Result<QueueEntry> {
    let source_type: String = row.try_get("source_type")?;
    let status: String = row.try_get("status")?;
    let attempts: i64 = row.try_get("attempts")?;
    let processed_at: Option<i64> = row.try_get("processed_at")?;
    Ok(QueueEntry {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        source_type: source_type.parse()?,
        source_id: row.try_get("source_id")?,
        source_url: row.try_get("source_url")?,
        priority: row.try_get("priority")?,
        status: status.parse()?,
        attempts: u32::try_from(attempts).unwrap_or(0),
        error_message: row.try_get("error_message")?,
        created_at: from_millis(row.try_get("created_at")?),
        updated_at: from_millis(row.try_get("updated_at")?),
        processed_at: processed_at.map(from_millis),
    })
}

const QUEUE_COLUMNS: &str = "id, project_id, source_type, source_id, source_url, priority, \
     status, attempts, error_message, created_at, updated_at, processed_at";

#[async_trait]
impl Store for SqliteStore {
    async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, client_name, status, budget, start_date,
                   target_completion_date, actual_completion_date,
                   live_url, staging_url, description, metadata_json
            FROM projects WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Project {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            client_name: row.try_get("client_name")?,
            status: row.try_get("status")?,
            budget: row.try_get("budget")?,
            start_date: row.try_get("start_date")?,
            target_completion_date: row.try_get("target_completion_date")?,
            actual_completion_date: row.try_get("actual_completion_date")?,
            live_url: row.try_get("live_url")?,
            staging_url: row.try_get("staging_url")?,
            description: row.try_get("description")?,
            metadata: parse_json(row.try_get("metadata_json")?)?,
        }))
    }

    async fn get_form_response(&self, id: &str) -> Result<Option<FormResponse>> {
        let row = sqlx::query(
            r#"
            SELECT r.id, r.project_id, r.form_id, COALESCE(f.name, '') AS form_name,
                   r.responses_json, r.user_id
            FROM form_responses r
            LEFT JOIN forms f ON f.id = r.form_id
            WHERE r.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let form_id: String = row.try_get("form_id")?;

        let fields = sqlx::query(
            "SELECT field_name, field_label, field_type FROM form_fields \
             WHERE form_id = ? ORDER BY position, id",
        )
        .bind(&form_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| -> Result<FormField> {
            Ok(FormField {
                field_name: r.try_get("field_name")?,
                field_label: r.try_get("field_label")?,
                field_type: r.try_get("field_type")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        let answers = sqlx::query(
            "SELECT field_name, field_value FROM form_response_answers \
             WHERE response_id = ? ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(|r| -> Result<FormAnswer> {
            Ok(FormAnswer {
                field_name: r.try_get("field_name")?,
                field_value: r.try_get("field_value")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        Ok(Some(FormResponse {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            form_id,
            form_name: row.try_get("form_name")?,
            responses: json_or_null(row.try_get("responses_json")?)?,
            answers,
            fields,
            user_id: row.try_get("user_id")?,
        }))
    }

    async fn get_applet_interaction(&self, id: &str) -> Result<Option<AppletInteraction>> {
        let row = sqlx::query(
            r#"
            SELECT i.id, i.project_id, i.user_id, i.data_json,
                   a.id AS applet_id, a.name AS applet_name, a.type AS applet_type,
                   a.config_json
            FROM applet_interactions i
            JOIN applets a ON a.id = i.applet_id
            WHERE i.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(AppletInteraction {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            applet: Applet {
                id: row.try_get("applet_id")?,
                name: row.try_get("applet_name")?,
                applet_type: row.try_get("applet_type")?,
                config: json_or_null(row.try_get("config_json")?)?,
            },
            user_id: row.try_get("user_id")?,
            data: json_or_null(row.try_get("data_json")?)?,
        }))
    }

    async fn get_chat_message(&self, id: &str) -> Result<Option<ChatMessage>> {
        let row = sqlx::query(
            r#"
            SELECT m.id, m.conversation_id, m.content, m.sender_id, m.attachments_json,
                   c.project_id, c.title,
                   COALESCE(p.full_name, 'Unknown') AS sender_name,
                   COALESCE(p.role, 'unknown') AS sender_role
            FROM chat_messages m
            JOIN chat_conversations c ON c.id = m.conversation_id
            LEFT JOIN profiles p ON p.id = m.sender_id
            WHERE m.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let attachments_json: String = row.try_get("attachments_json")?;
        let attachments: Vec<ChatAttachment> = if attachments_json.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&attachments_json).context("invalid attachments_json")?
        };
        Ok(Some(ChatMessage {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            conversation_id: row.try_get("conversation_id")?,
            conversation_title: row.try_get("title")?,
            content: row.try_get("content")?,
            sender_id: row.try_get("sender_id")?,
            sender_name: row.try_get("sender_name")?,
            sender_role: row.try_get("sender_role")?,
            attachments,
        }))
    }

    async fn get_file(&self, id: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, project_id, file_name, mime_type, file_url, storage_path,
                   file_size, uploaded_by
            FROM files WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(FileRecord {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            file_name: row.try_get("file_name")?,
            mime_type: row.try_get("mime_type")?,
            file_url: row.try_get("file_url")?,
            storage_path: row.try_get("storage_path")?,
            file_size: row.try_get("file_size")?,
            uploaded_by: row.try_get("uploaded_by")?,
        }))
    }

    async fn supersede_items(&self, key: &SourceKey) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE knowledge_items SET is_current = 0 \
             WHERE project_id = ? AND source_type = ? AND source_id = ? AND is_current = 1",
        )
        .bind(&key.project_id)
        .bind(key.source_type.as_str())
        .bind(&key.source_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn supersede_items_with_prefix(
        &self,
        project_id: &str,
        source_type: SourceType,
        prefix: &str,
    ) -> Result<u64> {
        // substr rather than LIKE: source ids routinely contain `_`.
        let result = sqlx::query(
            "UPDATE knowledge_items SET is_current = 0 \
             WHERE project_id = ? AND source_type = ? \
             AND substr(source_id, 1, length(?)) = ? AND is_current = 1",
        )
        .bind(project_id)
        .bind(source_type.as_str())
        .bind(prefix)
        .bind(prefix)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_items(&self, items: &[KnowledgeItem]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            let metadata = item
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            sqlx::query(
                r#"
                INSERT INTO knowledge_items (id, project_id, source_type, source_id, source_name,
                                             content_type, content, content_summary, category,
                                             tags_json, importance_score, extracted_by,
                                             extraction_confidence, processed_at, is_current,
                                             metadata_json)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.id)
            .bind(&item.project_id)
            .bind(item.source_type.as_str())
            .bind(&item.source_id)
            .bind(&item.source_name)
            .bind(item.content_type.as_str())
            .bind(&item.content)
            .bind(&item.content_summary)
            .bind(item.category.map(|c| c.as_str()))
            .bind(serde_json::to_string(&item.tags)?)
            .bind(i64::from(item.importance_score))
            .bind(&item.extracted_by)
            .bind(item.extraction_confidence)
            .bind(to_millis(item.processed_at))
            .bind(item.is_current)
            .bind(metadata)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_items(
        &self,
        project_id: &str,
        filter: &ItemFilter,
    ) -> Result<Vec<KnowledgeItem>> {
        let source_type = filter.source_type.map(|st| st.as_str());
        let rows = sqlx::query(
            r#"
            SELECT * FROM knowledge_items
            WHERE project_id = ?
              AND (? = 1 OR is_current = 1)
              AND (? IS NULL OR source_type = ?)
              AND (? IS NULL OR source_id = ?)
            ORDER BY processed_at DESC, rowid ASC
            "#,
        )
        .bind(project_id)
        .bind(filter.include_stale)
        .bind(source_type)
        .bind(source_type)
        .bind(filter.source_id.as_deref())
        .bind(filter.source_id.as_deref())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn enqueue(&self, entry: &QueueEntry) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO extraction_queue (id, project_id, source_type, source_id, source_url,
                                          priority, status, attempts, error_message,
                                          created_at, updated_at, processed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(project_id, source_type, source_id) DO NOTHING
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.project_id)
        .bind(entry.source_type.as_str())
        .bind(&entry.source_id)
        .bind(&entry.source_url)
        .bind(entry.priority)
        .bind(entry.status.as_str())
        .bind(i64::from(entry.attempts))
        .bind(&entry.error_message)
        .bind(to_millis(entry.created_at))
        .bind(to_millis(entry.updated_at))
        .bind(entry.processed_at.map(to_millis))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn pending_entries(
        &self,
        project_id: &str,
        max_attempts: u32,
        limit: usize,
    ) -> Result<Vec<QueueEntry>> {
        let sql = format!(
            "SELECT {} FROM extraction_queue \
             WHERE project_id = ? AND status IN ('pending', 'failed') AND attempts < ? \
             ORDER BY priority DESC, created_at ASC, rowid ASC LIMIT ?",
            QUEUE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(project_id)
            .bind(i64::from(max_attempts))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn get_queue_entry(&self, key: &SourceKey) -> Result<Option<QueueEntry>> {
        let sql = format!(
            "SELECT {} FROM extraction_queue \
             WHERE project_id = ? AND source_type = ? AND source_id = ?",
            QUEUE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&key.project_id)
            .bind(key.source_type.as_str())
            .bind(&key.source_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_entry).transpose()
    }

    async fn list_queue(&self, project_id: &str) -> Result<Vec<QueueEntry>> {
        let sql = format!(
            "SELECT {} FROM extraction_queue WHERE project_id = ? ORDER BY created_at ASC, rowid ASC",
            QUEUE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(project_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn mark_processing(&self, key: &SourceKey, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE extraction_queue SET status = 'processing', updated_at = ? \
             WHERE project_id = ? AND source_type = ? AND source_id = ?",
        )
        .bind(to_millis(at))
        .bind(&key.project_id)
        .bind(key.source_type.as_str())
        .bind(&key.source_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_completed(&self, key: &SourceKey, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE extraction_queue \
             SET status = 'completed', error_message = NULL, processed_at = ?, updated_at = ? \
             WHERE project_id = ? AND source_type = ? AND source_id = ?",
        )
        .bind(to_millis(at))
        .bind(to_millis(at))
        .bind(&key.project_id)
        .bind(key.source_type.as_str())
        .bind(&key.source_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, key: &SourceKey, error: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE extraction_queue \
             SET status = 'failed', error_message = ?, attempts = attempts + 1, updated_at = ? \
             WHERE project_id = ? AND source_type = ? AND source_id = ?",
        )
        .bind(error)
        .bind(to_millis(at))
        .bind(&key.project_id)
        .bind(key.source_type.as_str())
        .bind(&key.source_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
