//! Drives one relay session from upstream fragments to client frames.

use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::upstream::{GenerationRequest, Upstream};

use super::frame::Frame;
use super::session::{RelaySession, RelayState};
use super::sink::FrameSink;

const MASKED_ERROR_MESSAGE: &str = "The model stream failed";
const SHUTDOWN_MESSAGE: &str = "Server is shutting down";

/// Why a session ended in `Aborted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The upstream raised an error; an `error` frame was sent.
    UpstreamFailure(String),
    /// The client went away; nothing further was written.
    ClientDisconnected,
    /// The session token was cancelled from above (server shutdown); an
    /// `error` frame was sent.
    Shutdown,
}

/// Summary of a finished session, for logging and persistence.
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub session_id: String,
    pub state: RelayState,
    pub abort_reason: Option<AbortReason>,
    /// Chunk frames accepted by the client.
    pub chunks_delivered: u64,
    /// Concatenation of every delivered chunk.
    pub content: String,
}

impl RelayOutcome {
    pub fn is_completed(&self) -> bool {
        self.state == RelayState::Completed
    }
}

/// Owns a session, its client sink and the cancellation handle for the
/// upstream it drives.
pub struct StreamRelay<S> {
    session: RelaySession,
    sink: S,
    cancel: CancellationToken,
    mask_errors: bool,
    delivered: u64,
    content: String,
}

impl<S: FrameSink> StreamRelay<S> {
    pub fn new(session: RelaySession, sink: S) -> Self {
        Self {
            session,
            sink,
            cancel: CancellationToken::new(),
            mask_errors: false,
            delivered: 0,
            content: String::new(),
        }
    }

    /// Send a generic message in `error` frames instead of the upstream's.
    #[must_use]
    pub const fn mask_errors(mut self, mask: bool) -> Self {
        self.mask_errors = mask;
        self
    }

    /// Derive the session token from `parent`, so cancelling `parent` ends
    /// the session with an `error` frame.
    #[must_use]
    pub fn shutdown_on(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Token cancelled when the session stops consuming the upstream.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the session to a terminal state.
    ///
    /// The upstream receives a child of the session's cancellation token. The
    /// fragment stream and the sink are both dropped before this returns.
    pub async fn run(mut self, upstream: &dyn Upstream, request: GenerationRequest) -> RelayOutcome {
        let start = Frame::start(
            self.session.id(),
            self.session.conversation_id().map(String::from),
        );
        if self.sink.send(start).await.is_err() {
            return self.abort(AbortReason::ClientDisconnected);
        }
        self.transition(RelayState::Streaming);
        debug!(session_id = %self.session.id(), "Relay streaming");

        let mut fragments = upstream.generate(request, self.cancel.child_token());

        let reason = loop {
            let next = tokio::select! {
                biased;
                () = self.sink.closed() => break AbortReason::ClientDisconnected,
                () = self.cancel.cancelled() => break AbortReason::Shutdown,
                next = fragments.next() => next,
            };

            match next {
                Some(Ok(fragment)) => {
                    let index = self.session.next_index();
                    if self.sink.send(Frame::chunk(fragment.as_str(), index)).await.is_err() {
                        break AbortReason::ClientDisconnected;
                    }
                    self.delivered += 1;
                    self.content.push_str(&fragment);
                }
                Some(Err(e)) => break AbortReason::UpstreamFailure(e.to_string()),
                None => {
                    drop(fragments);
                    if self.sink.send(Frame::done()).await.is_err() {
                        return self.abort(AbortReason::ClientDisconnected);
                    }
                    return self.complete();
                }
            }
        };

        self.cancel.cancel();
        drop(fragments);

        let message = match &reason {
            AbortReason::ClientDisconnected => None,
            AbortReason::Shutdown => Some(SHUTDOWN_MESSAGE.to_string()),
            AbortReason::UpstreamFailure(_) if self.mask_errors => {
                Some(MASKED_ERROR_MESSAGE.to_string())
            }
            AbortReason::UpstreamFailure(detail) => Some(detail.clone()),
        };
        match message {
            Some(message) => self.fail(reason, message).await,
            None => self.abort(reason),
        }
    }

    /// Send the terminal `error` frame. A client that cannot take it is gone,
    /// which then takes precedence as the abort reason.
    async fn fail(mut self, reason: AbortReason, message: String) -> RelayOutcome {
        if self.sink.send(Frame::error(message)).await.is_err() {
            if let AbortReason::UpstreamFailure(detail) = &reason {
                debug!(session_id = %self.session.id(), error = %detail, "Upstream failed after client left");
            }
            return self.abort(AbortReason::ClientDisconnected);
        }
        self.abort(reason)
    }

    fn transition(&mut self, next: RelayState) {
        let from = self.session.state();
        if !self.session.advance(next) {
            warn!(session_id = %self.session.id(), %from, to = %next, "Ignored invalid relay transition");
        }
    }

    fn complete(mut self) -> RelayOutcome {
        self.transition(RelayState::Completed);
        info!(
            session_id = %self.session.id(),
            chunks = self.delivered,
            "Relay completed"
        );
        self.finish(None)
    }

    fn abort(mut self, reason: AbortReason) -> RelayOutcome {
        self.cancel.cancel();
        self.transition(RelayState::Aborted);
        match &reason {
            AbortReason::UpstreamFailure(detail) => warn!(
                session_id = %self.session.id(),
                chunks = self.delivered,
                error = %detail,
                "Relay aborted by upstream failure"
            ),
            AbortReason::ClientDisconnected => info!(
                session_id = %self.session.id(),
                chunks = self.delivered,
                "Client disconnected, upstream cancelled"
            ),
            AbortReason::Shutdown => info!(
                session_id = %self.session.id(),
                chunks = self.delivered,
                "Relay stopped for shutdown"
            ),
        }
        self.finish(Some(reason))
    }

    fn finish(self, abort_reason: Option<AbortReason>) -> RelayOutcome {
        RelayOutcome {
            session_id: self.session.id().to_string(),
            state: self.session.state(),
            abort_reason,
            chunks_delivered: self.delivered,
            content: self.content,
        }
    }
}
