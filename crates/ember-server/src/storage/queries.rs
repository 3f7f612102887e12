//! Database queries for the Ember server.

use ember_core::db::unix_timestamp;

use super::db::AppDatabase;
use super::models::{Conversation, Message};
use crate::storage::DatabaseError;
use crate::upstream::Role;

impl AppDatabase {
    // =========================================================================
    // Conversation queries
    // =========================================================================

    /// Create a conversation owned by `user_id`.
    pub async fn create_conversation(
        &self,
        id: &str,
        user_id: &str,
        title: &str,
    ) -> Result<Conversation, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO conversations (id, user_id, title, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_conversation(id).await
    }

    /// Get a conversation by ID.
    pub async fn get_conversation(&self, id: &str) -> Result<Conversation, DatabaseError> {
        sqlx::query_as::<_, Conversation>("SELECT * FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Conversation {id}")))
    }

    // =========================================================================
    // Message queries
    // =========================================================================

    /// Append a message and bump the conversation's `updated_at`.
    pub async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Message, DatabaseError> {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await?;

        let id = sqlx::query(
            "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(role.as_str())
        .bind(content)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Message {id}")))
    }

    /// The most recent `limit` messages of a conversation, oldest first.
    pub async fn list_messages(
        &self,
        conversation_id: &str,
        limit: u32,
    ) -> Result<Vec<Message>, DatabaseError> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM (SELECT * FROM messages WHERE conversation_id = ? ORDER BY id DESC LIMIT ?) ORDER BY id ASC",
        )
        .bind(conversation_id)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await?;

        Ok(messages)
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Cheap round-trip used by the health endpoint.
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(self.pool()).await?;
        Ok(())
    }
}
