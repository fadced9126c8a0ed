//! Replay protection.
//!
//! Order of checks: cache configured → timestamp parses → timestamp inside
//! the window (either direction) → nonce present → atomic claim.
//!
//! A claim lives at least `ttl_secs`, and always until the claimed timestamp
//! has left the window, so a nonce cannot be claimed twice while its
//! timestamp is still accepted.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use super::{PipelineRequest, Stage};
use crate::cache::{Claim, NonceCache};
use crate::config::NonceConfig;
use crate::error::ApiError;

pub const NONCE_HEADER: &str = "x-nonce";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";

pub struct NonceStage {
    cache: Option<Arc<dyn NonceCache>>,
    window_secs: i64,
    ttl: Duration,
    key_prefix: String,
}

impl NonceStage {
    pub fn new(cache: Option<Arc<dyn NonceCache>>, config: &NonceConfig) -> Self {
        Self {
            cache,
            window_secs: i64::try_from(config.window_secs).unwrap_or(i64::MAX),
            ttl: Duration::from_secs(config.ttl_secs),
            key_prefix: config.key_prefix.clone(),
        }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }
}

/// Accept `client_ts` only when it lies within `window_secs` of `now`.
pub fn check_timestamp(client_ts: i64, now: i64, window_secs: i64) -> Result<(), ApiError> {
    if now.abs_diff(client_ts) > window_secs.unsigned_abs() {
        return Err(ApiError::forbidden("timestamp expired"));
    }
    Ok(())
}

/// Lifetime of a claim for `client_ts`: `floor`, extended to outlast the
/// last second in which `client_ts` passes `check_timestamp`.
pub fn claim_ttl(client_ts: i64, now: i64, window_secs: i64, floor: Duration) -> Duration {
    let window_end = client_ts.saturating_add(window_secs);
    let remaining = window_end.saturating_sub(now).saturating_add(1).max(0);
    floor.max(Duration::from_secs(remaining.unsigned_abs()))
}

#[async_trait]
impl Stage for NonceStage {
    fn name(&self) -> &'static str {
        "nonce"
    }

    async fn apply(&self, req: &mut PipelineRequest<'_>) -> Result<(), ApiError> {
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| ApiError::service_unavailable("nonce cache is not configured"))?;

        let timestamp = req
            .header(TIMESTAMP_HEADER)
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| ApiError::bad_request("timestamp error"))?;

        let now = Self::now();
        if let Err(err) = check_timestamp(timestamp, now, self.window_secs) {
            tracing::warn!(
                trace_id = %req.ctx.trace_id,
                server_time = now,
                client_time = timestamp,
                "Timestamp outside window"
            );
            return Err(err);
        }

        let nonce = req
            .header(NONCE_HEADER)
            .ok_or_else(|| ApiError::bad_request("nonce is missing"))?;

        let key = format!("{}{}", self.key_prefix, nonce);
        let ttl = claim_ttl(timestamp, now, self.window_secs, self.ttl);
        match cache.claim(&key, timestamp, ttl).await {
            Ok(Claim::Fresh) => Ok(()),
            Ok(Claim::Replayed) => Err(ApiError::forbidden("nonce has already been used")),
            Err(err) => {
                tracing::error!(
                    trace_id = %req.ctx.trace_id,
                    backend = cache.backend(),
                    error = %err,
                    "Nonce cache failure"
                );
                Err(ApiError::service_unavailable("nonce cache unavailable"))
            }
        }
    }
}
