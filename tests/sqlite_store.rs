//! Integration tests for the SQLite backend: schema joins, supersede and
//! queue semantics against a real database file.

use std::sync::Arc;

use tempfile::TempDir;

use knowledge_pipeline::config::{parse_config, ExtractionConfig};
use knowledge_pipeline::migrate::run_migrations;
use knowledge_pipeline::models::{ItemFilter, QueueStatus, SourceKey, SourceType};
use knowledge_pipeline::storage::MemoryStorage;
use knowledge_pipeline::store::{SqliteStore, Store};
use knowledge_pipeline::KnowledgeExtractor;

async fn open_store() -> (TempDir, Arc<SqliteStore>) {
    let tmp = TempDir::new().unwrap();
    let cfg = parse_config(&format!(
        "[db]\npath = \"{}/data/kx.sqlite\"\n",
        tmp.path().display()
    ))
    .unwrap();
    let store = SqliteStore::connect(&cfg).await.unwrap();
    run_migrations(store.pool()).await.unwrap();
    (tmp, Arc::new(store))
}

async fn seed_form(store: &SqliteStore) {
    let pool = store.pool();
    sqlx::query("INSERT INTO forms (id, project_id, name) VALUES ('f1', 'p1', 'Discovery')")
        .execute(pool)
        .await
        .unwrap();
    for (name, label, ty, pos) in [
        ("goals", "Business Goals", "textarea", 0),
        ("budget", "Project Budget", "number", 1),
    ] {
        sqlx::query(
            "INSERT INTO form_fields (form_id, field_name, field_label, field_type, position) \
             VALUES ('f1', ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(label)
        .bind(ty)
        .bind(pos)
        .execute(pool)
        .await
        .unwrap();
    }
    sqlx::query(
        "INSERT INTO form_responses (id, project_id, form_id, responses_json, user_id) \
         VALUES ('r1', 'p1', 'f1', ?, 'u1')",
    )
    .bind(r#"{"goals": "Double online bookings", "budget": 40000}"#)
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO form_response_answers (response_id, field_name, field_value) \
         VALUES ('r1', 'budget', '\"50000\"')",
    )
    .execute(pool)
    .await
    .unwrap();
}

fn extractor(store: Arc<SqliteStore>) -> KnowledgeExtractor {
    KnowledgeExtractor::new(
        "p1",
        store,
        Arc::new(MemoryStorage::new()),
        ExtractionConfig::default(),
    )
}

#[tokio::test]
async fn form_response_join_loads_fields_and_answers() {
    let (_tmp, store) = open_store().await;
    seed_form(&store).await;

    let response = store.get_form_response("r1").await.unwrap().unwrap();
    assert_eq!(response.form_name, "Discovery");
    let names: Vec<&str> = response
        .fields
        .iter()
        .map(|f| f.field_name.as_str())
        .collect();
    assert_eq!(names, vec!["goals", "budget"]);
    assert_eq!(response.answers.len(), 1);
    assert_eq!(response.responses["goals"], "Double online bookings");

    assert!(store.get_form_response("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn form_extraction_round_trips_through_sqlite() {
    let (_tmp, store) = open_store().await;
    seed_form(&store).await;
    let ex = extractor(store.clone());

    let items = ex.extract_from_form_response("r1").await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].source_name, "Discovery - Business Goals");
    assert_eq!(items[0].importance_score, 9);
    // The answers row overrides the responses blob.
    assert_eq!(items[1].content, "50000");

    let stored = store.list_items("p1", &ItemFilter::default()).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|i| i.is_current));
    let goals = stored
        .iter()
        .find(|i| i.content == "Double online bookings")
        .unwrap();
    assert!(goals.tags.contains("goal"));
    assert_eq!(goals.metadata.as_ref().unwrap()["field_name"], "goals");
}

#[tokio::test]
async fn re_extraction_supersedes_previous_rows() {
    let (_tmp, store) = open_store().await;
    seed_form(&store).await;
    let ex = extractor(store.clone());

    ex.extract_from_form_response("r1").await.unwrap();
    ex.extract_from_form_response("r1").await.unwrap();

    let current = store.list_items("p1", &ItemFilter::default()).await.unwrap();
    assert_eq!(current.len(), 2);
    let everything = store
        .list_items(
            "p1",
            &ItemFilter {
                include_stale: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(everything.len(), 4);
    assert_eq!(everything.iter().filter(|i| !i.is_current).count(), 2);

    let key = SourceKey::new("p1", SourceType::FormResponse, "r1");
    assert_eq!(store.supersede_items(&key).await.unwrap(), 2);
    assert!(store
        .list_items("p1", &ItemFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn enqueue_is_insert_ignore() {
    let (_tmp, store) = open_store().await;
    let ex = extractor(store.clone());

    assert!(ex
        .enqueue(SourceType::FileDocument, "f1", 5, None)
        .await
        .unwrap());
    assert!(!ex
        .enqueue(SourceType::FileDocument, "f1", 8, None)
        .await
        .unwrap());

    let entries = store.list_queue("p1").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].priority, 5);
    assert_eq!(entries[0].status, QueueStatus::Pending);
}

#[tokio::test]
async fn queue_polls_by_priority_then_insertion() {
    let (_tmp, store) = open_store().await;
    let ex = extractor(store.clone());
    for (id, priority) in [("a", 5), ("b", 9), ("c", 9), ("d", 3)] {
        ex.enqueue(SourceType::ChatMessage, id, priority, None)
            .await
            .unwrap();
    }

    let pending = store.pending_entries("p1", 3, 10).await.unwrap();
    let order: Vec<&str> = pending.iter().map(|e| e.source_id.as_str()).collect();
    assert_eq!(order, vec!["b", "c", "a", "d"]);

    let limited = store.pending_entries("p1", 3, 2).await.unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn failed_entries_are_retried_until_the_ceiling() {
    let (_tmp, store) = open_store().await;
    let ex = extractor(store.clone());
    ex.enqueue(SourceType::FormResponse, "missing", 5, None)
        .await
        .unwrap();

    for attempt in 1..=3u32 {
        let report = ex.process_extraction_queue().await.unwrap();
        assert_eq!(report.failed, 1, "attempt {}", attempt);
    }
    let key = SourceKey::new("p1", SourceType::FormResponse, "missing");
    let entry = store.get_queue_entry(&key).await.unwrap().unwrap();
    assert_eq!(entry.attempts, 3);
    assert_eq!(entry.status, QueueStatus::Failed);
    assert!(entry
        .error_message
        .unwrap()
        .contains("form response not found"));

    assert!(store.pending_entries("p1", 3, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn chat_message_join_resolves_sender_profile() {
    let (_tmp, store) = open_store().await;
    let pool = store.pool();
    sqlx::query("INSERT INTO profiles (id, full_name, role) VALUES ('u1', 'Dana Reyes', 'client')")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO chat_conversations (id, project_id, title) VALUES ('c1', 'p1', 'Kickoff')",
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO chat_messages (id, conversation_id, sender_id, content, attachments_json) \
         VALUES ('m1', 'c1', 'u1', 'We need online booking', ?)",
    )
    .bind(r#"[{"name": "flow.pdf", "url": "https://cdn.test/flow.pdf", "type": "application/pdf"}]"#)
    .execute(pool)
    .await
    .unwrap();

    let message = store.get_chat_message("m1").await.unwrap().unwrap();
    assert_eq!(message.project_id, "p1");
    assert_eq!(message.sender_name, "Dana Reyes");
    assert!(message.is_from_client());
    assert_eq!(
        message.attachments[0].mime_type.as_deref(),
        Some("application/pdf")
    );

    let items = extractor(store.clone())
        .extract_from_chat_message("m1")
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].source_name, "Kickoff - Dana Reyes");
    assert_eq!(items[1].source_id, "m1_attachment_0");
}

#[tokio::test]
async fn dropped_attachments_are_superseded_by_prefix() {
    let (_tmp, store) = open_store().await;
    let pool = store.pool();
    sqlx::query(
        "INSERT INTO chat_conversations (id, project_id, title) VALUES ('c1', 'p1', 'Assets')",
    )
    .execute(pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO chat_messages (id, conversation_id, sender_id, content, attachments_json) \
         VALUES ('m_1', 'c1', NULL, 'Photos attached', ?)",
    )
    .bind(r#"[{"name": "a.png", "url": "https://cdn.test/a.png"}, {"name": "b.png", "url": "https://cdn.test/b.png"}]"#)
    .execute(pool)
    .await
    .unwrap();

    let ex = extractor(store.clone());
    ex.extract_from_chat_message("m_1").await.unwrap();

    sqlx::query("UPDATE chat_messages SET attachments_json = ? WHERE id = 'm_1'")
        .bind(r#"[{"name": "a.png", "url": "https://cdn.test/a.png"}]"#)
        .execute(pool)
        .await
        .unwrap();
    ex.extract_from_chat_message("m_1").await.unwrap();

    let current = store
        .list_items(
            "p1",
            &ItemFilter {
                source_type: Some(SourceType::ChatAttachment),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].source_id, "m_1_attachment_0");

    // `%` is matched literally.
    let superseded = store
        .supersede_items_with_prefix("p1", SourceType::ChatAttachment, "m%")
        .await
        .unwrap();
    assert_eq!(superseded, 0);
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let (_tmp, store) = open_store().await;
    run_migrations(store.pool()).await.unwrap();
    assert!(store.list_queue("p1").await.unwrap().is_empty());
}
