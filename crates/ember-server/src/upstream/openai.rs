//! OpenAI-compatible streaming chat-completions client.
//!
//! Works against any server that speaks `POST {base_url}/chat/completions`
//! with `"stream": true` and answers with `data:` events terminated by
//! `data: [DONE]`.

use std::time::Duration;

use eventsource_stream::Eventsource;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::types::{ChatMessage, Role};
use super::{FragmentStream, GenerationRequest, Upstream, UpstreamError};

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer key. Empty means no `Authorization` header (local servers).
    pub api_key: String,
    pub default_model: String,
    pub system_prompt: Option<String>,
    pub connect_timeout: Duration,
}

/// Streams chat completions from an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct OpenAiUpstream {
    http: reqwest::Client,
    base_url: String,
    default_model: String,
    system_prompt: Option<String>,
}

impl OpenAiUpstream {
    pub fn new(config: &OpenAiConfig) -> Result<Self, UpstreamError> {
        if config.base_url.is_empty() {
            return Err(UpstreamError::Config("base_url is empty".into()));
        }
        if config.default_model.is_empty() {
            return Err(UpstreamError::Config("default_model is empty".into()));
        }

        let mut headers = HeaderMap::new();
        if !config.api_key.is_empty() {
            let mut key = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .map_err(|_| UpstreamError::Config("Invalid API key format".into()))?;
            key.set_sensitive(true);
            headers.insert(AUTHORIZATION, key);
        }

        // reqwest is built with rustls-no-provider; an Err here only means a
        // provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_model: config.default_model.clone(),
            system_prompt: config.system_prompt.clone(),
        })
    }

    pub(crate) fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub(crate) fn build_body(&self, request: GenerationRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage::new(Role::System, system.clone()));
        }
        messages.extend(request.history);
        messages.push(ChatMessage::new(Role::User, request.prompt));

        ChatCompletionRequest {
            model: request
                .model
                .unwrap_or_else(|| self.default_model.clone()),
            messages,
            stream: true,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

impl Upstream for OpenAiUpstream {
    fn generate(&self, request: GenerationRequest, cancel: CancellationToken) -> FragmentStream {
        let http = self.http.clone();
        let url = self.completions_url();
        let body = self.build_body(request);

        Box::pin(async_stream::stream! {
            let opened = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                res = send_request(&http, &url, &body) => Some(res),
            };

            match opened {
                None => debug!("Upstream request cancelled before response"),
                Some(Err(e)) => yield Err(e),
                Some(Ok(response)) => {
                    let mut events = response.bytes_stream().eventsource();
                    loop {
                        let next = tokio::select! {
                            biased;
                            () = cancel.cancelled() => None,
                            ev = events.next() => ev,
                        };
                        let Some(event) = next else { break };
                        match event {
                            Err(e) => {
                                yield Err(UpstreamError::Stream(e.to_string()));
                                break;
                            }
                            Ok(event) => match parse_chunk(&event.data) {
                                Ok(ChunkEvent::Content(text)) => yield Ok(text),
                                Ok(ChunkEvent::Empty) => {}
                                Ok(ChunkEvent::Done) => break,
                                Err(e) => {
                                    yield Err(e);
                                    break;
                                }
                            },
                        }
                    }
                }
            }
        })
    }
}

async fn send_request(
    http: &reqwest::Client,
    url: &str,
    body: &ChatCompletionRequest,
) -> Result<reqwest::Response, UpstreamError> {
    let response = http.post(url).json(body).send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&text)
        .map(|env| env.error.message)
        .ok()
        .filter(|m| !m.is_empty())
        .or_else(|| status.canonical_reason().map(String::from))
        .unwrap_or_else(|| "Unknown".into());
    Err(UpstreamError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Wire body for `POST /chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// What one SSE `data:` payload means for the fragment stream.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ChunkEvent {
    Content(String),
    /// Role-only deltas, finish markers, keep-alives.
    Empty,
    Done,
}

pub(crate) fn parse_chunk(data: &str) -> Result<ChunkEvent, UpstreamError> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(ChunkEvent::Done);
    }
    if data.is_empty() {
        return Ok(ChunkEvent::Empty);
    }

    let chunk: CompletionChunk =
        serde_json::from_str(data).map_err(|e| UpstreamError::Parse(e.to_string()))?;
    if let Some(err) = chunk.error {
        return Err(UpstreamError::Provider(err.message));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty())
        .map_or(ChunkEvent::Empty, ChunkEvent::Content))
}
