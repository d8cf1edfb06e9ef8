//! End-to-end request flows through the dispatcher.

use serde_json::json;

use crate::common::{FALLBACK_MODEL, add, contents, get, in_memory_dispatcher};

#[tokio::test]
async fn conversation_round_trip() {
    let dispatcher = in_memory_dispatcher();
    let items = [
        add("chat-1", "user", "Hello"),
        add("chat-1", "ai", "Hi there!"),
        get("chat-1", 10),
        json!({"operation": "clearMemory", "sessionKey": "chat-1"}),
        get("chat-1", 10),
    ];

    let results = dispatcher.run(&items, false).await.unwrap();

    assert_eq!(contents(&results[2]), ["Hello", "Hi there!"]);
    assert_eq!(results[2]["messages"][1]["role"], json!("assistant"));
    assert_eq!(results[2]["count"], json!(2));
    assert_eq!(results[3]["cleared"], json!(true));
    assert_eq!(results[4]["count"], json!(0));
}

#[tokio::test]
async fn auto_store_pair_builds_context() {
    let dispatcher = in_memory_dispatcher();
    let items = [
        json!({"operation": "autoStoreUser", "sessionKey": "auto", "chatInput": "What is Rust?"}),
        json!({
            "operation": "autoStoreAI",
            "sessionKey": "auto",
            "payload": {
                "choices": [{"message": {"content": "A systems language."}}],
                "model": "gpt-4o"
            }
        }),
        json!({"operation": "formatForAI", "sessionKey": "auto", "model": FALLBACK_MODEL}),
    ];

    let results = dispatcher.run(&items, false).await.unwrap();

    assert_eq!(results[0]["success"], json!(true));
    assert_eq!(results[1]["message"]["metadata"]["model"], json!("gpt-4o"));
    assert_eq!(
        results[2]["messages"],
        json!([
            {"role": "user", "content": "What is Rust?"},
            {"role": "assistant", "content": "A systems language."}
        ])
    );
}

#[tokio::test]
async fn generated_session_key_is_echoed() {
    let dispatcher = in_memory_dispatcher();
    let result = dispatcher
        .execute(&json!({"operation": "addMessage", "content": "orphan"}))
        .await
        .unwrap();

    let key = result["sessionKey"].as_str().unwrap();
    assert!(key.starts_with("session_"));

    let read = dispatcher.execute(&get(key, 10)).await.unwrap();
    assert_eq!(contents(&read), ["orphan"]);
}

#[tokio::test]
async fn sixty_writes_keep_last_fifty() {
    let dispatcher = in_memory_dispatcher();
    let items: Vec<_> = (0..60)
        .map(|i| add("long", "user", &format!("m{i}")))
        .collect();
    dispatcher.run(&items, false).await.unwrap();

    let result = dispatcher.execute(&get("long", 100)).await.unwrap();
    let expected: Vec<String> = (10..60).map(|i| format!("m{i}")).collect();
    assert_eq!(contents(&result), expected);
}

#[tokio::test]
async fn smart_context_fits_budget_and_never_empties() {
    let dispatcher = in_memory_dispatcher();
    // 8 characters each, 2 tokens under the fallback estimate.
    let items: Vec<_> = (0..5)
        .map(|i| add("budget", "user", &format!("message{i}")))
        .collect();
    dispatcher.run(&items, false).await.unwrap();

    let smart = |limit: u32| {
        json!({
            "operation": "smartContext",
            "sessionKey": "budget",
            "tokenLimit": limit,
            "model": FALLBACK_MODEL
        })
    };

    let result = dispatcher.execute(&smart(4)).await.unwrap();
    assert_eq!(contents(&result), ["message3", "message4"]);
    assert_eq!(result["tokenLimit"], json!(4));

    let result = dispatcher.execute(&smart(1)).await.unwrap();
    assert_eq!(contents(&result), ["message4"]);
}

#[tokio::test]
async fn continue_on_fail_isolates_bad_items() {
    let dispatcher = in_memory_dispatcher();
    let items = [
        json!({"operation": "addMessage", "sessionKey": "c"}),
        json!("not an object"),
        add("c", "user", "kept"),
    ];

    let results = dispatcher.run(&items, true).await.unwrap();
    assert_eq!(
        results[0],
        json!({"error": "Missing required field `content`"})
    );
    assert!(results[1]["error"].is_string());
    assert_eq!(results[2]["success"], json!(true));
}
