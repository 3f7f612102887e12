//! Upstream generation integrations.
//!
//! An [`Upstream`] turns a [`GenerationRequest`] into a lazy, finite stream of
//! text fragments. Nothing touches the network until the stream is first
//! polled, and dropping the stream releases the in-flight request.

mod openai;
mod ticker;
mod types;

use std::pin::Pin;

use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

pub use openai::{OpenAiConfig, OpenAiUpstream};
pub use ticker::TickerUpstream;
pub use types::{ChatMessage, GenerationRequest, Role};

/// Fragments produced by an upstream, in generation order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, UpstreamError>> + Send>>;

/// A producer of model output.
pub trait Upstream: Send + Sync {
    /// Start a generation. The stream ends on natural completion, yields one
    /// `Err` on failure, and stops early once `cancel` fires.
    fn generate(&self, request: GenerationRequest, cancel: CancellationToken) -> FragmentStream;
}

/// Failures raised while producing fragments.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Upstream reported an error: {0}")]
    Provider(String),

    #[error("Upstream stream error: {0}")]
    Stream(String),

    #[error("Malformed upstream chunk: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
