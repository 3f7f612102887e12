//! The client side of a relay session.

use std::future::Future;

use tokio::sync::mpsc;

use super::frame::Frame;

/// The client stopped accepting frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("client disconnected")]
pub struct ClientGone;

/// Append-only, ordered destination for frames.
pub trait FrameSink: Send {
    /// Deliver one frame, waiting while the client is not ready for it.
    fn send(&mut self, frame: Frame) -> impl Future<Output = Result<(), ClientGone>> + Send;

    /// Resolves once the client has gone away.
    fn closed(&self) -> impl Future<Output = ()> + Send;
}

/// Bounded channel feeding the HTTP response body. A full channel blocks the
/// relay; a dropped receiver means the client disconnected.
impl FrameSink for mpsc::Sender<Frame> {
    async fn send(&mut self, frame: Frame) -> Result<(), ClientGone> {
        mpsc::Sender::send(self, frame).await.map_err(|_| ClientGone)
    }

    async fn closed(&self) {
        mpsc::Sender::closed(self).await;
    }
}
