//! Databases written before ids, timestamps and bookkeeping columns existed.

use rusqlite::{Connection, params};
use serde_json::json;

use crate::common::{add, contents, dispatcher_at, get};

fn write_legacy_database(path: &std::path::Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE memory (
            sessionKey TEXT PRIMARY KEY,
            messages TEXT,
            created INTEGER,
            lastAccessed INTEGER
        );",
    )
    .unwrap();
    conn.execute(
        "INSERT INTO memory (sessionKey, messages, created, lastAccessed) VALUES (?1, ?2, ?3, ?4)",
        params![
            "old",
            json!([
                {"role": "user", "content": "Hello"},
                {"role": "ai", "content": "Hi there!"}
            ])
            .to_string(),
            1_000_i64,
            1_000_i64
        ],
    )
    .unwrap();
}

#[tokio::test]
async fn legacy_rows_read_as_current_messages() {
    let dir = tempfile::tempdir().unwrap();
    write_legacy_database(&dir.path().join("chat-memory.sqlite"));

    let dispatcher = dispatcher_at(dir.path()).await;
    let result = dispatcher.execute(&get("old", 10)).await.unwrap();

    assert_eq!(contents(&result), ["Hello", "Hi there!"]);
    let messages = result["messages"].as_array().unwrap();
    assert_eq!(messages[1]["role"], json!("assistant"));
    for message in messages {
        assert!(message["id"].is_string());
        assert!(message["timestamp"].is_i64());
    }
}

#[tokio::test]
async fn schema_is_upgraded_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat-memory.sqlite");
    write_legacy_database(&path);

    let dispatcher = dispatcher_at(dir.path()).await;
    assert_eq!(
        dispatcher.store().log().schema_version().await.unwrap(),
        chatmem_context::SCHEMA_VERSION
    );

    dispatcher
        .execute(&add("old", "user", "after upgrade"))
        .await
        .unwrap();

    let key = chatmem_types::SessionKey::new("old").unwrap();
    let stats = dispatcher.store().session_stats(&key).await.unwrap().unwrap();
    assert_eq!(stats.created, 1_000);
    assert_eq!(stats.message_count, 3);
    assert_eq!(stats.version, 2);
}
