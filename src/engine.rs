// =============================================================================
// Signal Engine — per-symbol aggregation & batch runner
// =============================================================================
//
// For each symbol the engine:
//   1. validates the candle series and computes EMA fast/slow, RSI and MACD
//   2. classifies the trend from the latest EMAs
//   3. runs the level, momentum and continuation detectors
//   4. derives session extremes and breakouts from the session windows
//   5. records any confirmed A-B-C-D reversal in the per-symbol cache
//   6. assembles a flat, JSON-safe `SignalData` record
//
// A batch fetches and evaluates symbols concurrently. A failing symbol is
// logged and reported in `BatchReport::failures`; it never aborts the batch.
// =============================================================================

use std::ops::Range;
use std::sync::Arc;

use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::{
    analyze_momentum, detect_continuation, find_relevant_level, AbcdPattern, Level, ReversalCache,
    ReversalRecord, SeriesView, SessionRanges,
};
use crate::error::{ErrorKind, SignalError, SignalResult};
use crate::indicators::{calculate_ema, calculate_macd, calculate_rsi, value_at};
use crate::market_data::{check_series, Candle, CandleSource, Clock, PriceColumns, SessionSchedule, SymbolSource};
use crate::runtime_config::{DivergenceReference, SignalConfig};
use crate::types::{Action, DivergenceType, Trend};

/// Bumped whenever `SignalData` changes shape.
pub const SCHEMA_VERSION: u32 = 1;

// =============================================================================
// Output records
// =============================================================================

/// Everything the engine knows about one symbol after one evaluation.
///
/// Numeric fields that cannot be computed are `None` and serialise as `null`;
/// the record never contains NaN or infinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalData {
    pub schema_version: u32,
    pub symbol: String,
    pub interval: String,
    /// Clock reading at evaluation, epoch ms.
    pub computed_at: i64,
    /// Open time of the newest candle, epoch ms.
    pub last_candle_time: i64,
    pub candle_count: usize,
    pub last_close: Option<f64>,

    // ── Trend ───────────────────────────────────────────────────────────
    pub trend: Trend,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub rsi: Option<f64>,

    // ── Sessions & breakouts ────────────────────────────────────────────
    pub session_high: Option<f64>,
    pub session_low: Option<f64>,
    pub prev_session_high: Option<f64>,
    pub prev_session_low: Option<f64>,
    /// Current session high above the previous session high.
    pub breakout_high: bool,
    /// Current session low below the previous session low.
    pub breakout_low: bool,
    /// Newest candle set a new high for the current session.
    pub intraday_high_break: bool,
    /// Newest candle set a new low for the current session.
    pub intraday_low_break: bool,

    // ── Divergence & momentum ───────────────────────────────────────────
    pub divergence: bool,
    pub divergence_type: Option<DivergenceType>,
    pub divergence_from_level: bool,
    pub divergence_from_level_type: Option<DivergenceType>,
    pub ema_fast_bounce: bool,
    pub ema_slow_bounce: bool,
    pub touched_ema_slow_today: bool,
    pub momentum_slowing: bool,
    pub momentum_slowing_type: Option<Trend>,

    // ── Continuation ────────────────────────────────────────────────────
    pub continuation: bool,
    pub continuation_ended: bool,
    pub continuation_reason: String,

    // ── Level & structure ───────────────────────────────────────────────
    pub level: Option<Level>,
    /// Distance of the level from the slow EMA, percent of the slow EMA.
    pub level_gap_pct: Option<f64>,
    pub cross_index: Option<usize>,
    pub rsi_at_cross: Option<f64>,
    pub cross_signal: Option<Action>,
    pub stall_reversal: Option<Action>,
    pub abc_pattern: Option<AbcdPattern>,
    pub abc_signal: Option<Action>,
    /// Most recent reversal remembered for this symbol, possibly from an
    /// earlier batch.
    pub last_reversal: Option<ReversalRecord>,

    pub chart_url: String,
}

/// A symbol that could not be evaluated in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: String,
    pub kind: ErrorKind,
}

/// Outcome of one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub interval: String,
    pub started_at: i64,
    pub finished_at: i64,
    /// Successful symbols, in request order.
    pub signals: Vec<SignalData>,
    pub failures: Vec<SymbolFailure>,
}

impl BatchReport {
    pub fn signal(&self, symbol: &str) -> Option<&SignalData> {
        self.signals.iter().find(|s| s.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn failure(&self, symbol: &str) -> Option<&SymbolFailure> {
        self.failures.iter().find(|f| f.symbol.eq_ignore_ascii_case(symbol))
    }
}

/// Drop NaN / infinity so the value serialises as `null`.
pub fn finite(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite())
}

// =============================================================================
// SignalEngine
// =============================================================================

pub struct SignalEngine {
    config: SignalConfig,
    schedule: SessionSchedule,
    clock: Arc<dyn Clock>,
    reversals: ReversalCache,
}

impl SignalEngine {
    pub fn new(config: SignalConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        config.validate()?;
        let schedule = config.session.schedule()?;
        Ok(Self {
            config,
            schedule,
            clock,
            reversals: ReversalCache::new(),
        })
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    pub fn reversals(&self) -> &ReversalCache {
        &self.reversals
    }

    /// Evaluate one symbol's oldest-first candle series.
    pub fn evaluate_symbol(&self, symbol: &str, candles: &[Candle]) -> SignalResult<SignalData> {
        let params = &self.config.analysis;
        let n = candles.len();
        SignalError::ensure_len(self.config.min_candles, n)?;
        check_series(candles)?;

        // ── 1. Indicators ───────────────────────────────────────────────
        let cols = PriceColumns::from_candles(candles);
        let ema_fast = calculate_ema(&cols.closes, params.ema_fast_period);
        let ema_slow = calculate_ema(&cols.closes, params.ema_slow_period);
        let rsi = calculate_rsi(&cols.closes, params.rsi_period);
        let macd = calculate_macd(&cols.closes);

        let last = n - 1;
        let (Some(fast_now), Some(slow_now)) = (value_at(&ema_fast, last), value_at(&ema_slow, last)) else {
            return Err(SignalError::InsufficientData {
                required: params.ema_slow_period,
                got: n,
            });
        };

        // ── 2. Trend ────────────────────────────────────────────────────
        let trend = Trend::from_emas(fast_now, slow_now);

        // ── 3. Detectors ────────────────────────────────────────────────
        let view = SeriesView {
            closes: &cols.closes,
            highs: &cols.highs,
            lows: &cols.lows,
            ema_fast: &ema_fast,
            ema_slow: &ema_slow,
            rsi: &rsi,
        };
        let level = find_relevant_level(&view, trend)?;

        let now = self.clock.now_ms();
        let sessions = self.session_ranges(candles, now)?;
        let momentum = analyze_momentum(&view, &macd.histogram, trend, &level.level, &sessions, params)?;
        let continuation = detect_continuation(&view, trend, params)?;

        // ── 4. Sessions & breakouts ─────────────────────────────────────
        let (session_high, session_low) = range_extremes(&cols, sessions.current.clone());
        let (prev_session_high, prev_session_low) = range_extremes(&cols, sessions.previous.clone());
        let breakout_high = matches!((session_high, prev_session_high), (Some(h), Some(p)) if h > p);
        let breakout_low = matches!((session_low, prev_session_low), (Some(l), Some(p)) if l < p);

        let (intraday_high_break, intraday_low_break) =
            if sessions.current.contains(&last) && last > sessions.current.start {
                let (high_before, low_before) = range_extremes(&cols, sessions.current.start..last);
                (
                    high_before.is_some_and(|h| cols.highs[last] > h),
                    low_before.is_some_and(|l| cols.lows[last] < l),
                )
            } else {
                (false, false)
            };

        // ── 5. Reversal memory ──────────────────────────────────────────
        if let (Some(pattern), Some(signal)) = (level.abc_pattern, level.abc_signal) {
            if let Some(record) = ReversalRecord::from_pattern(&pattern, candles, signal, trend, now) {
                self.reversals.remember(symbol, record);
            }
        }

        // ── 6. Assemble ─────────────────────────────────────────────────
        let last_close = cols.closes[last];
        let key_level = Some(level.level).filter(|l| l.price.is_finite());
        let level_gap_pct = key_level
            .filter(|_| slow_now != 0.0)
            .and_then(|l| finite(Some((l.price - slow_now) / slow_now * 100.0)));

        debug!(
            symbol,
            trend = %trend,
            candles = n,
            continuation = continuation.continuation,
            divergence = ?momentum.divergence,
            "symbol evaluated"
        );

        Ok(SignalData {
            schema_version: SCHEMA_VERSION,
            symbol: symbol.to_string(),
            interval: self.config.interval.clone(),
            computed_at: now,
            last_candle_time: candles[last].timestamp,
            candle_count: n,
            last_close: finite(Some(last_close)),

            trend,
            ema_fast: finite(Some(fast_now)),
            ema_slow: finite(Some(slow_now)),
            rsi: finite(value_at(&rsi, last)),

            session_high: finite(session_high),
            session_low: finite(session_low),
            prev_session_high: finite(prev_session_high),
            prev_session_low: finite(prev_session_low),
            breakout_high,
            breakout_low,
            intraday_high_break,
            intraday_low_break,

            divergence: momentum.divergence.is_some(),
            divergence_type: momentum.divergence,
            divergence_from_level: momentum.divergence_from_level.is_some(),
            divergence_from_level_type: momentum.divergence_from_level,
            ema_fast_bounce: momentum.ema_fast_bounce,
            ema_slow_bounce: momentum.ema_slow_bounce,
            touched_ema_slow_today: momentum.touched_ema_slow_today,
            momentum_slowing: momentum.momentum_slowing.is_some(),
            momentum_slowing_type: momentum.momentum_slowing,

            continuation: continuation.continuation,
            continuation_ended: continuation.ended,
            continuation_reason: continuation.reason,

            level: key_level,
            level_gap_pct,
            cross_index: level.cross_index,
            rsi_at_cross: finite(level.rsi_at_cross),
            cross_signal: level.cross_signal,
            stall_reversal: level.stall_reversal,
            abc_pattern: level.abc_pattern,
            abc_signal: level.abc_signal,
            last_reversal: self.reversals.get(symbol),

            chart_url: self.config.chart_url(symbol),
        })
    }

    /// Fetch and evaluate a single symbol.
    ///
    /// Unlike `run_batch`, errors propagate: an upstream failure is the
    /// caller's failure.
    pub async fn fetch_and_evaluate(&self, source: &dyn CandleSource, symbol: &str) -> SignalResult<SignalData> {
        let candles = source.fetch_candles(symbol, &self.config.interval).await?;
        self.evaluate_symbol(symbol, &candles)
    }

    /// Fetch and evaluate `symbols` with bounded concurrency.
    ///
    /// Never fails as a whole: each symbol's error is captured in
    /// `BatchReport::failures`, and successful signals keep request order.
    pub async fn run_batch(&self, source: &dyn CandleSource, symbols: &[String]) -> BatchReport {
        let batch_id = Uuid::new_v4().to_string();
        let started_at = self.clock.now_ms();
        let interval = self.config.interval.clone();
        info!(batch_id = %batch_id, symbols = symbols.len(), interval = %interval, "signal batch started");

        // Each future owns its symbol; the batch future must stay `Send` for
        // `tokio::spawn`.
        let mut pending = Vec::with_capacity(symbols.len());
        for (idx, symbol) in symbols.iter().enumerate() {
            let symbol = symbol.clone();
            pending.push(async move {
                let outcome = self.fetch_and_evaluate(source, &symbol).await;
                (idx, symbol, outcome)
            });
        }

        let mut outcomes: Vec<(usize, String, SignalResult<SignalData>)> = stream::iter(pending)
            .buffer_unordered(self.config.max_concurrent_fetches.max(1))
            .collect()
            .await;
        outcomes.sort_by_key(|(idx, _, _)| *idx);

        let mut signals = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (_, symbol, outcome) in outcomes {
            match outcome {
                Ok(signal) => signals.push(signal),
                Err(e) => {
                    warn!(symbol = %symbol, kind = ?e.kind(), error = %e, "symbol skipped");
                    failures.push(SymbolFailure {
                        symbol,
                        error: e.to_string(),
                        kind: e.kind(),
                    });
                }
            }
        }

        let finished_at = self.clock.now_ms();
        info!(
            batch_id = %batch_id,
            ok = signals.len(),
            failed = failures.len(),
            "signal batch finished"
        );

        BatchReport {
            batch_id,
            interval,
            started_at,
            finished_at,
            signals,
            failures,
        }
    }

    fn session_ranges(&self, candles: &[Candle], now_ms: i64) -> SignalResult<SessionRanges> {
        let window = self
            .schedule
            .window_at(now_ms)
            .ok_or_else(|| SignalError::malformed(format!("clock reading {now_ms} has no session")))?;
        let current = window.slice_indices(candles);
        let previous = window.previous().slice_indices(candles);
        let reference = match self.config.analysis.divergence_reference {
            DivergenceReference::PriorSession => previous.clone(),
            DivergenceReference::Lookback { bars } => current.start.saturating_sub(bars)..current.start,
        };
        Ok(SessionRanges {
            current,
            previous,
            reference,
        })
    }
}

/// Highest high and lowest low over `range`; `None` when empty.
fn range_extremes(cols: &PriceColumns, range: Range<usize>) -> (Option<f64>, Option<f64>) {
    if range.is_empty() || range.end > cols.len() {
        return (None, None);
    }
    let high = cols.highs[range.clone()].iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let low = cols.lows[range].iter().copied().fold(f64::INFINITY, f64::min);
    (Some(high), Some(low))
}

/// The symbols to scan: the configured list, or the provider's tradable
/// symbols capped at `max_symbols` when the list is empty.
pub async fn resolve_symbols(config: &SignalConfig, source: &dyn SymbolSource) -> SignalResult<Vec<String>> {
    if !config.symbols.is_empty() {
        let mut symbols: Vec<String> = Vec::with_capacity(config.symbols.len());
        for s in &config.symbols {
            let s = s.trim().to_uppercase();
            if !s.is_empty() && !symbols.contains(&s) {
                symbols.push(s);
            }
        }
        return Ok(symbols);
    }

    let mut discovered = source.tradable_symbols().await?;
    discovered.truncate(config.max_symbols);
    info!(count = discovered.len(), "symbols discovered from provider");
    Ok(discovered)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::FixedClock;
    use crate::types::LevelKind;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// 2024-03-10T00:00:00Z
    const BASE_TS: i64 = 1_710_028_800_000;
    const BAR_MS: i64 = 15 * 60 * 1000;

    fn synthetic_candles(n: usize) -> Vec<Candle> {
        let mut prev_close = 100.0;
        (0..n)
            .map(|i| {
                let x = i as f64;
                let close = 100.0 + 8.0 * (x / 12.0).sin() + 0.03 * x;
                let open = prev_close;
                prev_close = close;
                Candle::new(
                    BASE_TS + i as i64 * BAR_MS,
                    open,
                    open.max(close) * 1.002,
                    open.min(close) * 0.998,
                    close,
                    10.0,
                )
            })
            .collect()
    }

    fn engine_for(candles: &[Candle]) -> SignalEngine {
        let now = candles.last().map(|c| c.timestamp).unwrap_or(BASE_TS) + 60_000;
        SignalEngine::new(SignalConfig::default(), Arc::new(FixedClock(now))).unwrap()
    }

    struct MockSource {
        data: HashMap<String, SignalResult<Vec<Candle>>>,
    }

    #[async_trait]
    impl CandleSource for MockSource {
        async fn fetch_candles(&self, symbol: &str, _interval: &str) -> SignalResult<Vec<Candle>> {
            self.data
                .get(symbol)
                .cloned()
                .unwrap_or_else(|| Err(SignalError::Upstream(format!("unknown symbol {symbol}"))))
        }
    }

    #[async_trait]
    impl SymbolSource for MockSource {
        async fn tradable_symbols(&self) -> SignalResult<Vec<String>> {
            let mut symbols: Vec<String> = self.data.keys().cloned().collect();
            symbols.sort();
            Ok(symbols)
        }
    }

    // ---- evaluate_symbol ----

    #[test]
    fn evaluates_well_formed_series() {
        let candles = synthetic_candles(300);
        let engine = engine_for(&candles);
        let sig = engine.evaluate_symbol("BTCUSDT", &candles).unwrap();

        assert_eq!(sig.schema_version, SCHEMA_VERSION);
        assert_eq!(sig.candle_count, 300);
        assert_eq!(sig.last_candle_time, candles[299].timestamp);
        let (fast, slow) = (sig.ema_fast.unwrap(), sig.ema_slow.unwrap());
        assert_eq!(sig.trend, Trend::from_emas(fast, slow));
        let rsi = sig.rsi.unwrap();
        assert!((0.0..=100.0).contains(&rsi));
        assert_eq!(sig.divergence, sig.divergence_type.is_some());
        assert_eq!(sig.momentum_slowing, sig.momentum_slowing_type.is_some());
        assert!(sig.chart_url.ends_with("BTCUSDT"));
        assert!(!sig.continuation_reason.is_empty());

        let level = sig.level.unwrap();
        let gap = (level.price - slow) / slow * 100.0;
        assert!((sig.level_gap_pct.unwrap() - gap).abs() < 1e-9);
    }

    #[test]
    fn session_windows_come_from_clock() {
        // Newest bar opens 2024-03-13T02:45Z; the session opened at 01:00Z.
        let candles = synthetic_candles(300);
        let engine = engine_for(&candles);
        let sig = engine.evaluate_symbol("BTCUSDT", &candles).unwrap();

        let current: Vec<&Candle> = candles
            .iter()
            .filter(|c| c.timestamp >= BASE_TS + (3 * 24 + 1) * 3_600_000)
            .collect();
        assert_eq!(current.len(), 8);
        let high = current.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        assert!((sig.session_high.unwrap() - high).abs() < 1e-9);
        assert!(sig.prev_session_high.is_some());
        assert_eq!(
            sig.breakout_high,
            sig.session_high.unwrap() > sig.prev_session_high.unwrap()
        );
    }

    #[test]
    fn stale_clock_leaves_sessions_empty() {
        let candles = synthetic_candles(300);
        let later = candles[299].timestamp + 10 * 24 * 3_600_000;
        let engine = SignalEngine::new(SignalConfig::default(), Arc::new(FixedClock(later))).unwrap();
        let sig = engine.evaluate_symbol("BTCUSDT", &candles).unwrap();
        assert_eq!(sig.session_high, None);
        assert_eq!(sig.prev_session_low, None);
        assert!(!sig.breakout_high);
        assert!(!sig.intraday_high_break);
        assert!(!sig.divergence);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let candles = synthetic_candles(300);
        let engine = engine_for(&candles);
        let first = engine.evaluate_symbol("ETHUSDT", &candles).unwrap();
        let second = engine.evaluate_symbol("ETHUSDT", &candles).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn short_series_is_insufficient() {
        let candles = synthetic_candles(50);
        let engine = engine_for(&candles);
        assert_eq!(
            engine.evaluate_symbol("BTCUSDT", &candles),
            Err(SignalError::InsufficientData { required: 100, got: 50 })
        );
    }

    #[test]
    fn unordered_series_is_malformed() {
        let mut candles = synthetic_candles(150);
        candles.swap(10, 11);
        let engine = engine_for(&candles);
        assert!(matches!(
            engine.evaluate_symbol("BTCUSDT", &candles),
            Err(SignalError::MalformedData(_))
        ));
    }

    #[test]
    fn lookback_reference_is_supported() {
        let candles = synthetic_candles(300);
        let mut config = SignalConfig::default();
        config.analysis.divergence_reference = DivergenceReference::Lookback { bars: 48 };
        let now = candles[299].timestamp + 60_000;
        let engine = SignalEngine::new(config, Arc::new(FixedClock(now))).unwrap();
        assert!(engine.evaluate_symbol("BTCUSDT", &candles).is_ok());
    }

    #[test]
    fn remembered_reversal_is_per_symbol() {
        let candles = synthetic_candles(300);
        let engine = engine_for(&candles);
        let record = ReversalRecord {
            signal: Action::Sell,
            trend: Trend::Bullish,
            a_time: 1,
            b_time: 2,
            c_time: 3,
            d_time: i64::MAX,
            d_price: 99.0,
            detected_at: 5,
        };
        engine.reversals().remember("BTCUSDT", record.clone());

        let btc = engine.evaluate_symbol("BTCUSDT", &candles).unwrap();
        let eth = engine.evaluate_symbol("ETHUSDT", &candles).unwrap();
        assert_eq!(btc.last_reversal, Some(record));
        assert_eq!(eth.last_reversal.is_some(), eth.abc_pattern.is_some());
    }

    // ---- serialisation ----

    #[test]
    fn finite_drops_nan_and_infinity() {
        assert_eq!(finite(Some(f64::NAN)), None);
        assert_eq!(finite(Some(f64::INFINITY)), None);
        assert_eq!(finite(Some(1.5)), Some(1.5));
        assert_eq!(finite(None), None);
    }

    /// A record with every optional enum and flag populated.
    fn populated_signal() -> SignalData {
        SignalData {
            schema_version: SCHEMA_VERSION,
            symbol: "BTCUSDT".into(),
            interval: "15m".into(),
            computed_at: BASE_TS + 60_000,
            last_candle_time: BASE_TS,
            candle_count: 300,
            last_close: Some(101.25),
            trend: Trend::Bearish,
            ema_fast: Some(100.5),
            ema_slow: Some(102.0),
            rsi: Some(41.5),
            session_high: Some(104.0),
            session_low: Some(99.0),
            prev_session_high: Some(103.5),
            prev_session_low: Some(99.5),
            breakout_high: true,
            breakout_low: true,
            intraday_high_break: false,
            intraday_low_break: true,
            divergence: true,
            divergence_type: Some(DivergenceType::Bullish),
            divergence_from_level: true,
            divergence_from_level_type: Some(DivergenceType::Bearish),
            ema_fast_bounce: true,
            ema_slow_bounce: false,
            touched_ema_slow_today: true,
            momentum_slowing: true,
            momentum_slowing_type: Some(Trend::Bearish),
            continuation: false,
            continuation_ended: true,
            continuation_reason: "falling swing-high broken".into(),
            level: Some(Level {
                price: 103.0,
                kind: LevelKind::Resistance,
                origin_index: Some(250),
            }),
            level_gap_pct: Some(0.5),
            cross_index: Some(250),
            rsi_at_cross: Some(38.0),
            cross_signal: Some(Action::Sell),
            stall_reversal: Some(Action::Buy),
            abc_pattern: Some(AbcdPattern { a: 250, b: 260, c: 270, d: 280 }),
            abc_signal: Some(Action::Buy),
            last_reversal: Some(ReversalRecord {
                signal: Action::Buy,
                trend: Trend::Bearish,
                a_time: BASE_TS - 4 * BAR_MS,
                b_time: BASE_TS - 3 * BAR_MS,
                c_time: BASE_TS - 2 * BAR_MS,
                d_time: BASE_TS - BAR_MS,
                d_price: 100.75,
                detected_at: BASE_TS,
            }),
            chart_url: "https://www.tradingview.com/chart/?symbol=BINANCE:BTCUSDT".into(),
        }
    }

    #[test]
    fn signal_round_trips_through_json() {
        let candles = synthetic_candles(300);
        let engine = engine_for(&candles);
        let sig = engine.evaluate_symbol("SOLUSDT", &candles).unwrap();

        let json = serde_json::to_string(&sig).unwrap();
        assert!(!json.contains("NaN"));
        let back: SignalData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sig);
    }

    #[test]
    fn populated_signal_round_trips_through_json() {
        let sig = populated_signal();
        let value = serde_json::to_value(&sig).unwrap();
        assert_eq!(value["trend"], "bearish");
        assert_eq!(value["divergence_type"], "bullish");
        assert_eq!(value["divergence_from_level_type"], "bearish");
        assert_eq!(value["momentum_slowing_type"], "bearish");
        assert_eq!(value["level"]["kind"], "resistance");
        assert_eq!(value["cross_signal"], "sell");
        assert_eq!(value["stall_reversal"], "buy");
        assert_eq!(value["abc_signal"], "buy");
        assert_eq!(value["abc_pattern"]["d"], 280);
        assert_eq!(value["last_reversal"]["signal"], "buy");

        let back: SignalData = serde_json::from_value(value).unwrap();
        assert_eq!(back, sig);
    }

    #[test]
    fn missing_values_serialise_as_null() {
        let candles = synthetic_candles(300);
        let later = candles[299].timestamp + 10 * 24 * 3_600_000;
        let engine = SignalEngine::new(SignalConfig::default(), Arc::new(FixedClock(later))).unwrap();
        let sig = engine.evaluate_symbol("BTCUSDT", &candles).unwrap();

        let value = serde_json::to_value(&sig).unwrap();
        assert!(value["session_high"].is_null());
        assert_eq!(value["schema_version"], 1);
    }

    // ---- run_batch ----

    #[tokio::test]
    async fn failing_symbol_does_not_abort_batch() {
        let candles = synthetic_candles(300);
        let engine = engine_for(&candles);
        let mut data = HashMap::new();
        data.insert("AAAUSDT".to_string(), Ok(candles.clone()));
        data.insert("BBBUSDT".to_string(), Err(SignalError::Upstream("timeout".into())));
        data.insert("CCCUSDT".to_string(), Ok(candles.clone()));
        data.insert("DDDUSDT".to_string(), Ok(candles[..20].to_vec()));
        let source = MockSource { data };

        let symbols: Vec<String> = ["CCCUSDT", "BBBUSDT", "AAAUSDT", "DDDUSDT"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let report = engine.run_batch(&source, &symbols).await;

        let ok: Vec<&str> = report.signals.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(ok, vec!["CCCUSDT", "AAAUSDT"]);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failure("BBBUSDT").unwrap().kind, ErrorKind::Upstream);
        assert_eq!(report.failure("dddusdt").unwrap().kind, ErrorKind::Data);
        assert!(report.signal("AAAUSDT").is_some());
        assert_eq!(report.interval, "15m");
        assert!(!report.batch_id.is_empty());
    }

    #[tokio::test]
    async fn batch_runs_on_spawned_task() {
        let candles = synthetic_candles(300);
        let engine = Arc::new(engine_for(&candles));
        let mut data = HashMap::new();
        data.insert("AAAUSDT".to_string(), Ok(candles.clone()));
        data.insert("BBBUSDT".to_string(), Err(SignalError::Upstream("timeout".into())));
        let source: Arc<dyn CandleSource> = Arc::new(MockSource { data });
        let symbols = vec!["AAAUSDT".to_string(), "BBBUSDT".to_string()];

        let report = tokio::spawn(async move { engine.run_batch(source.as_ref(), &symbols).await })
            .await
            .unwrap();
        assert_eq!(report.signals.len(), 1);
        assert_eq!(report.failures[0].symbol, "BBBUSDT");
    }

    #[tokio::test]
    async fn empty_batch_is_empty_report() {
        let engine = engine_for(&[]);
        let source = MockSource { data: HashMap::new() };
        let report = engine.run_batch(&source, &[]).await;
        assert!(report.signals.is_empty());
        assert!(report.failures.is_empty());
    }

    // ---- fetch_and_evaluate ----

    #[tokio::test]
    async fn single_symbol_surfaces_upstream_error() {
        let candles = synthetic_candles(300);
        let engine = engine_for(&candles);
        let mut data = HashMap::new();
        data.insert("AAAUSDT".to_string(), Ok(candles.clone()));
        data.insert("BBBUSDT".to_string(), Err(SignalError::Upstream("timeout".into())));
        let source = MockSource { data };

        let sig = engine.fetch_and_evaluate(&source, "AAAUSDT").await.unwrap();
        assert_eq!(sig, engine.evaluate_symbol("AAAUSDT", &candles).unwrap());
        assert_eq!(
            engine.fetch_and_evaluate(&source, "BBBUSDT").await,
            Err(SignalError::Upstream("timeout".into()))
        );
    }

    // ---- resolve_symbols ----

    #[tokio::test]
    async fn configured_symbols_win_over_discovery() {
        let source = MockSource { data: HashMap::new() };
        let mut config = SignalConfig::default();
        config.symbols = vec!["btcusdt".into(), " ETHUSDT ".into(), "BTCUSDT".into()];
        let symbols = resolve_symbols(&config, &source).await.unwrap();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT"]);
    }

    #[tokio::test]
    async fn discovery_is_capped() {
        let mut data = HashMap::new();
        for s in ["AUSDT", "BUSDT", "CUSDT"] {
            data.insert(s.to_string(), Ok(Vec::new()));
        }
        let source = MockSource { data };
        let mut config = SignalConfig::default();
        config.symbols.clear();
        config.max_symbols = 2;
        let symbols = resolve_symbols(&config, &source).await.unwrap();
        assert_eq!(symbols, vec!["AUSDT", "BUSDT"]);
    }
}
