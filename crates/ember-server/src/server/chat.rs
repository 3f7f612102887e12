//! Chat streaming endpoints.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::{Extension, Json};
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::Claims;
use crate::relay::{RelaySession, StreamRelay};
use crate::storage::{AppDatabase, Conversation, Message};
use crate::upstream::{GenerationRequest, Role};

use super::error::ApiError;
use super::sse::relay_response;
use super::state::AppState;

const TITLE_MAX_CHARS: usize = 80;

/// Generation parameters accepted as a JSON body or a query string.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub prompt: String,
    pub conversation_id: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.prompt.trim().is_empty() {
            return Err(ApiError::InvalidRequest("prompt must not be empty".into()));
        }
        if let Some(t) = self.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ApiError::InvalidRequest(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.max_tokens == Some(0) {
            return Err(ApiError::InvalidRequest("maxTokens must be positive".into()));
        }
        Ok(())
    }
}

/// `POST /api/chat/stream`
pub async fn chat_stream_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = request?;
    start_chat(state, claims, request).await
}

/// `GET /api/chat/stream`
pub async fn chat_stream_get(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    request: Result<Query<ChatRequest>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(request) = request?;
    start_chat(state, claims, request).await
}

async fn start_chat(
    state: AppState,
    claims: Claims,
    request: ChatRequest,
) -> Result<Response, ApiError> {
    request.validate()?;

    let conversation = resolve_conversation(&state.db, &claims, &request).await?;
    let history = state
        .db
        .list_messages(&conversation.id, state.relay.history_limit)
        .await?
        .iter()
        .filter_map(Message::to_chat_message)
        .collect();
    state
        .db
        .append_message(&conversation.id, Role::User, &request.prompt)
        .await?;

    let generation = GenerationRequest {
        prompt: request.prompt,
        history,
        model: request.model,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    };

    let session = RelaySession::new(Some(conversation.id.clone()));
    info!(
        session_id = %session.id(),
        user_id = %claims.sub,
        conversation_id = %conversation.id,
        "Starting chat relay"
    );

    let upstream = Arc::clone(&state.upstream);
    let db = state.db.clone();
    let mask_errors = state.relay.mask_errors;
    let shutdown = state.shutdown.clone();
    let conversation_id = conversation.id;

    Ok(relay_response(&state.relay, move |sink| async move {
        let outcome = StreamRelay::new(session, sink)
            .mask_errors(mask_errors)
            .shutdown_on(&shutdown)
            .run(upstream.as_ref(), generation)
            .await;

        if outcome.is_completed()
            && let Err(e) = db
                .append_message(&conversation_id, Role::Assistant, &outcome.content)
                .await
        {
            warn!(
                session_id = %outcome.session_id,
                conversation_id = %conversation_id,
                error = %e,
                "Failed to store assistant reply"
            );
        }
    }))
}

/// Load the named conversation (it must belong to the caller) or start a new
/// one titled after the prompt.
async fn resolve_conversation(
    db: &AppDatabase,
    claims: &Claims,
    request: &ChatRequest,
) -> Result<Conversation, ApiError> {
    if let Some(id) = &request.conversation_id {
        let conversation = db.get_conversation(id).await?;
        // Someone else's conversation is reported exactly like a missing one.
        if conversation.user_id != claims.sub {
            return Err(ApiError::NotFound(format!("Conversation {id} not found")));
        }
        return Ok(conversation);
    }

    let id = uuid::Uuid::new_v4().to_string();
    Ok(db
        .create_conversation(&id, &claims.sub, &conversation_title(&request.prompt))
        .await?)
}

fn conversation_title(prompt: &str) -> String {
    prompt.trim().chars().take(TITLE_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> ChatRequest {
        ChatRequest {
            prompt: prompt.into(),
            conversation_id: None,
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    #[test]
    fn blank_prompt_is_rejected() {
        assert!(matches!(
            request("   ").validate(),
            Err(ApiError::InvalidRequest(_))
        ));
        assert!(request("hi").validate().is_ok());
    }

    #[test]
    fn temperature_out_of_range_is_rejected() {
        let mut req = request("hi");
        req.temperature = Some(2.5);
        assert!(req.validate().is_err());
        req.temperature = Some(0.7);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn zero_max_tokens_is_rejected() {
        let mut req = request("hi");
        req.max_tokens = Some(0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn request_deserializes_camel_case() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"prompt":"hi","conversationId":"c1","maxTokens":64,"temperature":0.5}"#,
        )
        .unwrap_or_else(|_| request("invalid"));
        assert_eq!(req.conversation_id.as_deref(), Some("c1"));
        assert_eq!(req.max_tokens, Some(64));
    }

    #[test]
    fn title_is_trimmed_and_truncated() {
        assert_eq!(conversation_title("  hello  "), "hello");
        let long = "é".repeat(200);
        assert_eq!(conversation_title(&long).chars().count(), TITLE_MAX_CHARS);
    }
}
