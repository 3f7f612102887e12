//! Data models for Ember storage.

use serde::{Deserialize, Serialize};

use crate::upstream::{ChatMessage, Role};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: i64,
}

impl Message {
    /// Convert to upstream context. `None` for rows with an unknown role.
    pub fn to_chat_message(&self) -> Option<ChatMessage> {
        let role: Role = self.role.parse().ok()?;
        Some(ChatMessage::new(role, self.content.clone()))
    }
}
