//! Synthetic upstream used by the transport self-test.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{FragmentStream, GenerationRequest, Upstream};

/// Emits `count` fragments (`"tick 1"`, `"tick 2"`, ...), sleeping `interval`
/// before each one.
#[derive(Debug, Clone, Copy)]
pub struct TickerUpstream {
    count: u32,
    interval: Duration,
}

impl TickerUpstream {
    pub const fn new(count: u32, interval: Duration) -> Self {
        Self { count, interval }
    }
}

impl Upstream for TickerUpstream {
    fn generate(&self, _request: GenerationRequest, cancel: CancellationToken) -> FragmentStream {
        let Self { count, interval } = *self;
        Box::pin(async_stream::stream! {
            for n in 1..=count {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
                yield Ok(format!("tick {n}"));
            }
        })
    }
}
