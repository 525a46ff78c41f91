// =============================================================================
// Central Application State — signal service
// =============================================================================
//
// Ties the engine to the published results.  The refresh loop writes a new
// `BatchReport` after every run; the REST API only reads.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for the mutable shared collections.
//   - The engine manages its own interior mutability (reversal cache).
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::binance::RateLimitTracker;
use crate::engine::{BatchReport, SignalEngine};

// =============================================================================
// Error Record
// =============================================================================

/// A recorded error event for the error log endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// Symbol the error belongs to, when it is symbol-scoped.
    pub symbol: Option<String>,
    /// ISO 8601 timestamp.
    pub at: String,
}

// =============================================================================
// AppState
// =============================================================================

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

/// Shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    /// Incremented on every published batch or recorded error.
    pub state_version: AtomicU64,

    pub engine: Arc<SignalEngine>,

    /// Request-weight tracker of the candle provider, when it has one.
    pub rate_limit: Option<Arc<RateLimitTracker>>,

    /// Most recent completed batch.
    pub latest_batch: RwLock<Option<Arc<BatchReport>>>,

    /// Symbols the refresh loop is currently scanning.
    pub symbols: RwLock<Vec<String>>,

    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    /// Instant when the service was started. Used for uptime calculations.
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(engine: Arc<SignalEngine>) -> Self {
        Self {
            state_version: AtomicU64::new(0),
            engine,
            rate_limit: None,
            latest_batch: RwLock::new(None),
            symbols: RwLock::new(Vec::new()),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    /// Attach the provider's rate-limit tracker for the health endpoint.
    pub fn with_rate_limit(mut self, tracker: Arc<RateLimitTracker>) -> Self {
        self.rate_limit = Some(tracker);
        self
    }

    /// Atomically increment the state version and return the previous value.
    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    /// Replace the published batch. Per-symbol failures are copied into the
    /// error log.
    pub fn publish_batch(&self, report: BatchReport) {
        for failure in &report.failures {
            self.push_symbol_error(&failure.symbol, failure.error.clone());
        }
        *self.latest_batch.write() = Some(Arc::new(report));
        self.increment_version();
    }

    pub fn latest_batch(&self) -> Option<Arc<BatchReport>> {
        self.latest_batch.read().clone()
    }

    pub fn set_symbols(&self, symbols: Vec<String>) {
        *self.symbols.write() = symbols;
    }

    pub fn push_error(&self, msg: String) {
        self.record_error(msg, None);
    }

    pub fn push_symbol_error(&self, symbol: &str, msg: String) {
        self.record_error(msg, Some(symbol.to_string()));
    }

    fn record_error(&self, message: String, symbol: Option<String>) {
        let record = ErrorRecord {
            message,
            symbol,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);

        self.increment_version();
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SymbolFailure;
    use crate::error::ErrorKind;
    use crate::market_data::FixedClock;
    use crate::runtime_config::SignalConfig;

    fn state() -> AppState {
        let engine = SignalEngine::new(SignalConfig::default(), Arc::new(FixedClock(0))).unwrap();
        AppState::new(Arc::new(engine))
    }

    fn report(failures: Vec<SymbolFailure>) -> BatchReport {
        BatchReport {
            batch_id: "b-1".into(),
            interval: "15m".into(),
            started_at: 0,
            finished_at: 1,
            signals: Vec::new(),
            failures,
        }
    }

    #[test]
    fn publish_replaces_batch_and_bumps_version() {
        let s = state();
        assert!(s.latest_batch().is_none());
        let v0 = s.current_state_version();

        s.publish_batch(report(Vec::new()));
        assert_eq!(s.latest_batch().unwrap().batch_id, "b-1");
        assert!(s.current_state_version() > v0);
    }

    #[test]
    fn failures_land_in_error_log() {
        let s = state();
        s.publish_batch(report(vec![SymbolFailure {
            symbol: "BTCUSDT".into(),
            error: "upstream failure: timeout".into(),
            kind: ErrorKind::Upstream,
        }]));
        let errors = s.recent_errors.read();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].symbol.as_deref(), Some("BTCUSDT"));
    }

    #[test]
    fn error_log_is_bounded() {
        let s = state();
        for i in 0..(MAX_RECENT_ERRORS + 10) {
            s.push_error(format!("e{i}"));
        }
        let errors = s.recent_errors.read();
        assert_eq!(errors.len(), MAX_RECENT_ERRORS);
        assert_eq!(errors[0].message, "e10");
    }
}
