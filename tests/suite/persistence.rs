//! On-disk durability across store instances.

use serde_json::json;

use crate::common::{add, contents, dispatcher_at, get};

#[tokio::test]
async fn history_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();

    {
        let dispatcher = dispatcher_at(dir.path()).await;
        dispatcher
            .run(&[add("durable", "user", "one"), add("durable", "ai", "two")], false)
            .await
            .unwrap();
    }

    assert!(dir.path().join("chat-memory.sqlite").exists());

    let dispatcher = dispatcher_at(dir.path()).await;
    let result = dispatcher.execute(&get("durable", 10)).await.unwrap();
    assert_eq!(contents(&result), ["one", "two"]);
}

#[tokio::test]
async fn clear_is_durable() {
    let dir = tempfile::tempdir().unwrap();

    {
        let dispatcher = dispatcher_at(dir.path()).await;
        dispatcher
            .run(
                &[
                    add("gone", "user", "secret"),
                    json!({"operation": "clearMemory", "sessionKey": "gone"}),
                ],
                false,
            )
            .await
            .unwrap();
    }

    let dispatcher = dispatcher_at(dir.path()).await;
    let result = dispatcher.execute(&get("gone", 10)).await.unwrap();
    assert_eq!(result["count"], json!(0));
}

#[tokio::test]
async fn sessions_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = dispatcher_at(dir.path()).await;
    dispatcher
        .run(
            &[
                add("a", "user", "for a"),
                add("b", "user", "for b"),
                json!({"operation": "clearMemory", "sessionKey": "a"}),
            ],
            false,
        )
        .await
        .unwrap();

    let b = dispatcher.execute(&get("b", 10)).await.unwrap();
    assert_eq!(contents(&b), ["for b"]);
}
