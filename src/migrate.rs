//! SQLite schema for the reference persistence backend.
//!
//! Source tables mirror the collections the pipeline reads from; the
//! `knowledge_items` and `extraction_queue` tables are the ones it writes.
//! Every statement is idempotent.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        client_name TEXT,
        status TEXT,
        budget REAL,
        start_date TEXT,
        target_completion_date TEXT,
        actual_completion_date TEXT,
        live_url TEXT,
        staging_url TEXT,
        description TEXT,
        metadata_json TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS forms (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS form_fields (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        form_id TEXT NOT NULL,
        field_name TEXT NOT NULL,
        field_label TEXT NOT NULL,
        field_type TEXT NOT NULL DEFAULT 'text',
        position INTEGER NOT NULL DEFAULT 0,
        UNIQUE(form_id, field_name),
        FOREIGN KEY (form_id) REFERENCES forms(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS form_responses (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        form_id TEXT NOT NULL,
        responses_json TEXT NOT NULL DEFAULT '{}',
        user_id TEXT,
        submitted_at INTEGER,
        FOREIGN KEY (form_id) REFERENCES forms(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS form_response_answers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        response_id TEXT NOT NULL,
        field_name TEXT NOT NULL,
        field_value TEXT NOT NULL,
        FOREIGN KEY (response_id) REFERENCES form_responses(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS applets (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        name TEXT NOT NULL,
        type TEXT NOT NULL,
        config_json TEXT NOT NULL DEFAULT '{}'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS applet_interactions (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        applet_id TEXT NOT NULL,
        user_id TEXT,
        data_json TEXT NOT NULL DEFAULT '{}',
        created_at INTEGER,
        FOREIGN KEY (applet_id) REFERENCES applets(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS profiles (
        id TEXT PRIMARY KEY,
        full_name TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'client'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_conversations (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        title TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_messages (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL,
        sender_id TEXT,
        content TEXT NOT NULL,
        attachments_json TEXT NOT NULL DEFAULT '[]',
        created_at INTEGER,
        FOREIGN KEY (conversation_id) REFERENCES chat_conversations(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS files (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        file_name TEXT NOT NULL,
        mime_type TEXT,
        file_url TEXT,
        storage_path TEXT,
        file_size INTEGER,
        uploaded_by TEXT,
        created_at INTEGER
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS knowledge_items (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        source_type TEXT NOT NULL,
        source_id TEXT NOT NULL,
        source_name TEXT NOT NULL,
        content_type TEXT NOT NULL,
        content TEXT NOT NULL,
        content_summary TEXT NOT NULL,
        category TEXT,
        tags_json TEXT NOT NULL DEFAULT '[]',
        importance_score INTEGER NOT NULL,
        extracted_by TEXT NOT NULL,
        extraction_confidence REAL NOT NULL,
        processed_at INTEGER NOT NULL,
        is_current INTEGER NOT NULL DEFAULT 1,
        metadata_json TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS extraction_queue (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        source_type TEXT NOT NULL,
        source_id TEXT NOT NULL,
        source_url TEXT,
        priority INTEGER NOT NULL DEFAULT 5,
        status TEXT NOT NULL DEFAULT 'pending',
        attempts INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        processed_at INTEGER,
        UNIQUE(project_id, source_type, source_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_knowledge_items_key ON knowledge_items(project_id, source_type, source_id, is_current)",
    "CREATE INDEX IF NOT EXISTS idx_knowledge_items_processed ON knowledge_items(project_id, processed_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_extraction_queue_poll ON extraction_queue(project_id, status, priority DESC, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_form_fields_form ON form_fields(form_id, position)",
    "CREATE INDEX IF NOT EXISTS idx_answers_response ON form_response_answers(response_id)",
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("migration failed: {}", statement.trim()))?;
    }
    Ok(())
}
