// =============================================================================
// Rate-Limit Tracker — monitors Binance request weight to avoid 429s
// =============================================================================
//
// Binance caps request weight at 1200 per rolling minute (we hard-cap
// ourselves at 1000) and reports usage in the `X-MBX-USED-WEIGHT-1M` response
// header.  The tracker stores the latest reading together with the minute it
// belongs to; a reading from an earlier minute counts as zero, so a blocked
// client recovers without a reset timer.
// =============================================================================

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Hard ceiling at which we refuse to send additional requests.
const WEIGHT_HARD_LIMIT: u32 = 1000;
/// Soft warning threshold.
const WEIGHT_WARN_THRESHOLD: u32 = 800;

const MS_IN_MIN: i64 = 60_000;

/// Request weights of the endpoints this crate calls.
pub mod weight {
    pub const EXCHANGE_INFO: u32 = 20;
    pub const TICKER_24HR_ALL: u32 = 80;

    /// `/api/v3/klines` weight by requested `limit`.
    pub fn klines(limit: u32) -> u32 {
        match limit {
            0..=99 => 1,
            100..=499 => 2,
            500..=1000 => 5,
            _ => 10,
        }
    }
}

/// Thread-safe weight tracker backed by atomic counters.
pub struct RateLimitTracker {
    used_weight_1m: AtomicU32,
    /// Minute index (epoch ms / 60 000) of the last reading.
    minute: AtomicI64,
}

/// Immutable snapshot of the current rate-limit state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub used_weight_1m: u32,
    pub hard_limit: u32,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self {
            used_weight_1m: AtomicU32::new(0),
            minute: AtomicI64::new(0),
        }
    }

    /// Record the `X-MBX-USED-WEIGHT-1M` header observed at `now_ms`.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap, now_ms: i64) {
        let Some(w) = headers
            .get("X-MBX-USED-WEIGHT-1M")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u32>().ok())
        else {
            return;
        };
        self.record(w, now_ms);
    }

    fn record(&self, w: u32, now_ms: i64) {
        let prev = self.current_weight(now_ms);
        self.used_weight_1m.store(w, Ordering::Relaxed);
        self.minute.store(now_ms.div_euclid(MS_IN_MIN), Ordering::Relaxed);

        if w >= WEIGHT_WARN_THRESHOLD && prev < WEIGHT_WARN_THRESHOLD {
            warn!(
                used_weight = w,
                hard_limit = WEIGHT_HARD_LIMIT,
                "rate-limit weight crossed warning threshold"
            );
        }
        debug!(used_weight_1m = w, "rate-limit weight updated from header");
    }

    /// Weight used in the minute containing `now_ms`.
    pub fn current_weight(&self, now_ms: i64) -> u32 {
        if self.minute.load(Ordering::Relaxed) == now_ms.div_euclid(MS_IN_MIN) {
            self.used_weight_1m.load(Ordering::Relaxed)
        } else {
            0
        }
    }

    /// Return `true` if we can afford to spend `weight` more request weight
    /// without exceeding the hard limit.
    pub fn can_send_request(&self, weight: u32, now_ms: i64) -> bool {
        let current = self.current_weight(now_ms);
        let allowed = current + weight <= WEIGHT_HARD_LIMIT;
        if !allowed {
            warn!(
                current_weight = current,
                requested_weight = weight,
                hard_limit = WEIGHT_HARD_LIMIT,
                "request blocked: would exceed rate-limit"
            );
        }
        allowed
    }

    pub fn snapshot(&self, now_ms: i64) -> RateLimitSnapshot {
        RateLimitSnapshot {
            used_weight_1m: self.current_weight(now_ms),
            hard_limit: WEIGHT_HARD_LIMIT,
        }
    }
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitTracker")
            .field("used_weight_1m", &self.used_weight_1m.load(Ordering::Relaxed))
            .field("minute", &self.minute.load(Ordering::Relaxed))
            .finish()
    }
}
