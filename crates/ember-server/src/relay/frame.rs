//! Wire frames sent to the client.

use axum::response::sse::Event;
use serde::{Deserialize, Serialize};

use ember_core::db::unix_timestamp_ms;

/// One JSON payload carried in an SSE `data:` line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    #[serde(rename_all = "camelCase")]
    Start {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
        timestamp: i64,
    },
    Chunk {
        content: String,
        index: u64,
        timestamp: i64,
    },
    Done {
        timestamp: i64,
    },
    Error {
        message: String,
        timestamp: i64,
    },
}

impl Frame {
    pub fn start(session_id: impl Into<String>, conversation_id: Option<String>) -> Self {
        Self::Start {
            session_id: session_id.into(),
            conversation_id,
            timestamp: unix_timestamp_ms(),
        }
    }

    pub fn chunk(content: impl Into<String>, index: u64) -> Self {
        Self::Chunk {
            content: content.into(),
            index,
            timestamp: unix_timestamp_ms(),
        }
    }

    pub fn done() -> Self {
        Self::Done {
            timestamp: unix_timestamp_ms(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: unix_timestamp_ms(),
        }
    }

    /// `done` and `error` end the stream.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Encode as an unnamed SSE event (`data: <json>`).
    pub fn to_event(&self) -> Event {
        let data = serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"type":"error","message":"frame encoding failed"}"#.into());
        Event::default().data(data)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn chunk_serializes_with_type_tag() {
        let json = serde_json::to_value(Frame::Chunk {
            content: "hi".into(),
            index: 3,
            timestamp: 42,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "chunk", "content": "hi", "index": 3, "timestamp": 42})
        );
    }

    #[test]
    fn start_uses_camel_case_and_omits_missing_conversation() {
        let json = serde_json::to_value(Frame::Start {
            session_id: "s1".into(),
            conversation_id: None,
            timestamp: 1,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "start", "sessionId": "s1", "timestamp": 1})
        );

        let with_conv = serde_json::to_value(Frame::start("s1", Some("c1".into()))).unwrap();
        assert_eq!(with_conv["conversationId"], "c1");
    }

    #[test]
    fn terminal_frames() {
        assert!(Frame::done().is_terminal());
        assert!(Frame::error("boom").is_terminal());
        assert!(!Frame::chunk("x", 1).is_terminal());
        assert!(!Frame::start("s", None).is_terminal());
    }

    #[test]
    fn timestamps_are_epoch_millis() {
        let Frame::Done { timestamp } = Frame::done() else {
            unreachable!()
        };
        // After 2024-01-01 in milliseconds.
        assert!(timestamp > 1_704_067_200_000);
    }
}
