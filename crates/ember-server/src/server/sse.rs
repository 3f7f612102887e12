//! Binds a relay session to an SSE response.

use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use axum::http::HeaderValue;
use axum::http::header::CACHE_CONTROL;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use ember_core::config::RelayConfig;

use crate::relay::Frame;

/// Comment sent before any frame so intermediaries flush the stream.
const OPENING_COMMENT: &str = "stream-open";

/// Spawn `drive` with the sending half of a bounded frame channel and return
/// the streaming response that drains it.
///
/// The response ends when `drive` drops its sender. Dropping the response
/// body (client disconnect) closes the channel, which `drive` observes
/// through [`FrameSink::closed`](crate::relay::FrameSink::closed).
pub fn relay_response<F, Fut>(config: &RelayConfig, drive: F) -> Response
where
    F: FnOnce(mpsc::Sender<Frame>) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    tokio::spawn(drive(tx));

    let opening = tokio_stream::once(Ok::<_, Infallible>(Event::default().comment(OPENING_COMMENT)));
    let frames = ReceiverStream::new(rx).map(|frame| Ok(frame.to_event()));

    let mut response = Sse::new(opening.chain(frames))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(config.keep_alive_secs.max(1))))
        .into_response();

    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-transform"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
