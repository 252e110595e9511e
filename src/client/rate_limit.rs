use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use reqwest::header::HeaderMap;

use crate::error::{Error, Result};

/// Reset values below this are taken as relative milliseconds and anchored
/// to the current time; anything larger is already milliseconds since epoch.
const EPOCH_MILLIS_FLOOR: i64 = 10_000_000_000;

/// The one endpoint exempt from the pre-dispatch gate, so callers can always
/// inspect their own quota even when it is exhausted.
const USAGE_STATS_PATH: &str = "/auth/stats";

/// Snapshot of the server-reported request quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    /// Total calls allowed in the current window.
    pub limit: u64,
    /// Calls left in the current window, as last reported by the server.
    pub remaining: u64,
    /// When the window resets, in milliseconds since the Unix epoch.
    pub reset_at_ms: i64,
}

impl Default for RateLimitState {
    // Optimistic before the first response: assume calls remain.
    fn default() -> RateLimitState {
        RateLimitState {
            limit: 10,
            remaining: 10,
            reset_at_ms: 0,
        }
    }
}

/// Client-side quota tracker. This mirrors the server's own accounting from
/// the `x-ratelimit-*` response headers; it never decrements speculatively.
/// The pre-dispatch gate only avoids burning a call that is guaranteed to
/// fail; the server's 429 remains the authoritative signal.
#[derive(Debug, Default)]
pub(crate) struct RateLimit {
    state: Mutex<RateLimitState>,
}

impl RateLimit {
    /// Gate check run before every dispatch. Fails with
    /// [`Error::RateLimitAnticipated`] when the quota is exhausted and the
    /// window has not reset, unless `path` is the usage-stats endpoint.
    pub fn preflight(&self, path: &str) -> Result<()> {
        let state = *self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now_ms = Utc::now().timestamp_millis();

        if state.remaining == 0 && now_ms < state.reset_at_ms && !path.ends_with(USAGE_STATS_PATH)
        {
            return Err(Error::RateLimitAnticipated {
                retry_after: Duration::from_millis((state.reset_at_ms - now_ms) as u64),
            });
        }

        Ok(())
    }

    /// Updates the tracked state from a successful response's headers. Does
    /// nothing when the limit header is absent.
    pub fn absorb(&self, headers: &HeaderMap) {
        let Some(limit) = header_int(headers, "x-ratelimit-limit") else {
            return;
        };
        let remaining = header_int(headers, "x-ratelimit-remaining").unwrap_or(0);
        let reset = header_int(headers, "x-ratelimit-reset").unwrap_or(0) as i64;

        let reset_at_ms = if reset > 0 && reset < EPOCH_MILLIS_FLOOR {
            Utc::now().timestamp_millis() + reset
        } else {
            reset
        };

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = RateLimitState {
            limit,
            remaining,
            reset_at_ms,
        };
    }

    pub fn snapshot(&self) -> RateLimitState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn header_int(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}
