//! Storage layer tests for the Ember server.

use super::db::AppDatabase;
use super::DatabaseError;
use crate::upstream::{ChatMessage, Role};

async fn test_db() -> AppDatabase {
    AppDatabase::open_in_memory().await.unwrap()
}

// === Conversation tests ===

#[tokio::test]
async fn create_and_get_conversation() {
    let db = test_db().await;
    let conv = db
        .create_conversation("c1", "u1", "Trip planning")
        .await
        .unwrap();

    assert_eq!(conv.id, "c1");
    assert_eq!(conv.user_id, "u1");
    assert_eq!(conv.title, "Trip planning");
    assert_eq!(conv.created_at, conv.updated_at);

    let fetched = db.get_conversation("c1").await.unwrap();
    assert_eq!(fetched.title, "Trip planning");
}

#[tokio::test]
async fn missing_conversation_is_not_found() {
    let db = test_db().await;
    let err = db.get_conversation("nope").await.unwrap_err();
    assert!(matches!(err, DatabaseError::NotFound(_)));
}

#[tokio::test]
async fn duplicate_conversation_id_fails() {
    let db = test_db().await;
    db.create_conversation("c1", "u1", "a").await.unwrap();
    assert!(db.create_conversation("c1", "u2", "b").await.is_err());
}

// === Message tests ===

#[tokio::test]
async fn append_and_list_messages_in_order() {
    let db = test_db().await;
    db.create_conversation("c1", "u1", "t").await.unwrap();

    db.append_message("c1", Role::User, "hi").await.unwrap();
    db.append_message("c1", Role::Assistant, "hello").await.unwrap();
    db.append_message("c1", Role::User, "how are you?").await.unwrap();

    let messages = db.list_messages("c1", 10).await.unwrap();
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["hi", "hello", "how are you?"]);
    assert_eq!(messages[1].role, "assistant");
}

#[tokio::test]
async fn list_messages_keeps_most_recent_within_limit() {
    let db = test_db().await;
    db.create_conversation("c1", "u1", "t").await.unwrap();
    for i in 0..5 {
        db.append_message("c1", Role::User, &format!("m{i}"))
            .await
            .unwrap();
    }

    let messages = db.list_messages("c1", 2).await.unwrap();
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["m3", "m4"]);
}

#[tokio::test]
async fn messages_are_scoped_to_conversation() {
    let db = test_db().await;
    db.create_conversation("c1", "u1", "t").await.unwrap();
    db.create_conversation("c2", "u1", "t").await.unwrap();
    db.append_message("c1", Role::User, "one").await.unwrap();
    db.append_message("c2", Role::User, "two").await.unwrap();

    let messages = db.list_messages("c2", 10).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "two");
}

#[tokio::test]
async fn append_to_unknown_conversation_fails() {
    let db = test_db().await;
    assert!(db.append_message("ghost", Role::User, "hi").await.is_err());
}

#[tokio::test]
async fn message_converts_to_chat_message() {
    let db = test_db().await;
    db.create_conversation("c1", "u1", "t").await.unwrap();
    let msg = db
        .append_message("c1", Role::Assistant, "reply")
        .await
        .unwrap();

    assert_eq!(
        msg.to_chat_message(),
        Some(ChatMessage::new(Role::Assistant, "reply"))
    );
}

#[tokio::test]
async fn ping_succeeds_on_open_database() {
    let db = test_db().await;
    db.ping().await.unwrap();
}
