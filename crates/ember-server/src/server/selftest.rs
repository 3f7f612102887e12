//! Transport self-test: synthetic ticks through the real relay path.

use std::time::Duration;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tracing::info;

use ember_core::config::RelayConfig;

use crate::relay::{RelaySession, StreamRelay};
use crate::upstream::{GenerationRequest, TickerUpstream};

use super::error::ApiError;
use super::sse::relay_response;
use super::state::AppState;

/// Query parameters; out-of-range values are clamped by [`Self::resolve`].
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelftestParams {
    pub count: Option<i64>,
    pub interval_ms: Option<i64>,
}

impl SelftestParams {
    /// Apply defaults, the count cap and the interval floor.
    pub fn resolve(self, config: &RelayConfig) -> (u32, Duration) {
        let count = self.count.map_or(config.selftest_default_count, |n| {
            u32::try_from(n.clamp(0, i64::from(config.selftest_max_count)))
                .unwrap_or(config.selftest_max_count)
        });
        let count = count.min(config.selftest_max_count);
        let interval_ms = self
            .interval_ms
            .map_or(config.selftest_default_interval_ms, |ms| {
                u64::try_from(ms).unwrap_or(0)
            })
            .max(config.selftest_min_interval_ms);
        (count, Duration::from_millis(interval_ms))
    }
}

/// `GET /api/stream/selftest?count=N&intervalMs=M`
pub async fn selftest(
    State(state): State<AppState>,
    params: Result<Query<SelftestParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = params?;
    let (count, interval) = params.resolve(&state.relay);
    let session = RelaySession::new(None);
    info!(
        session_id = %session.id(),
        count,
        ?interval,
        "Starting self-test relay"
    );

    let ticker = TickerUpstream::new(count, interval);
    let shutdown = state.shutdown.clone();
    Ok(relay_response(&state.relay, move |sink| async move {
        StreamRelay::new(session, sink)
            .shutdown_on(&shutdown)
            .run(&ticker, GenerationRequest::default())
            .await;
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(count: Option<i64>, interval_ms: Option<i64>) -> SelftestParams {
        SelftestParams { count, interval_ms }
    }

    #[test]
    fn count_is_capped() {
        let (count, _) = params(Some(9999), None).resolve(&RelayConfig::default());
        assert_eq!(count, 200);
    }

    #[test]
    fn interval_is_floored() {
        let (_, interval) = params(None, Some(0)).resolve(&RelayConfig::default());
        assert_eq!(interval, Duration::from_millis(10));
    }

    #[test]
    fn explicit_values_within_bounds_are_kept() {
        let (count, interval) = params(Some(5), Some(25)).resolve(&RelayConfig::default());
        assert_eq!(count, 5);
        assert_eq!(interval, Duration::from_millis(25));
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = RelayConfig::default();
        let (count, interval) = params(Some(-5), Some(-1)).resolve(&config);
        assert_eq!(count, 0);
        assert_eq!(interval, Duration::from_millis(10));

        let (count, _) = params(Some(i64::from(u32::MAX) + 1), None).resolve(&config);
        assert_eq!(count, 200);
    }

    #[test]
    fn defaults_apply_when_absent() {
        let config = RelayConfig::default();
        let (count, interval) = SelftestParams::default().resolve(&config);
        assert_eq!(count, config.selftest_default_count);
        assert_eq!(
            interval,
            Duration::from_millis(config.selftest_default_interval_ms)
        );
    }
}
