// =============================================================================
// Runtime Configuration — signal engine settings with atomic save
// =============================================================================
//
// Every tunable lives here: which symbols to scan, how candles are fetched,
// session boundaries, and the analysis thresholds.  All fields carry
// `#[serde(default)]` so that adding new fields never breaks loading an older
// config file.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.
// =============================================================================

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::market_data::SessionConfig;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
        "XRPUSDT".to_string(),
        "SOLUSDT".to_string(),
    ]
}

fn default_max_symbols() -> usize {
    30
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_interval() -> String {
    "15m".to_string()
}

fn default_candle_limit() -> u32 {
    500
}

fn default_refresh_interval_secs() -> u64 {
    300
}

fn default_max_concurrent_fetches() -> usize {
    4
}

fn default_min_candles() -> usize {
    100
}

fn default_chart_url_template() -> String {
    "https://www.tradingview.com/chart/?symbol=BINANCE:{symbol}".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_near_tolerance() -> f64 {
    0.002
}

fn default_ema_fast_period() -> usize {
    14
}

fn default_ema_slow_period() -> usize {
    70
}

fn default_rsi_period() -> usize {
    14
}

fn default_rsi_neutral_band() -> f64 {
    10.0
}

fn default_momentum_bars() -> usize {
    3
}

fn default_bounce_lookback() -> usize {
    3
}

fn default_continuation_window() -> usize {
    30
}

fn default_swing_strength() -> usize {
    2
}

// =============================================================================
// AnalysisParams
// =============================================================================

/// Which candles the session-divergence check compares the current session
/// against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DivergenceReference {
    /// The immediately prior session.
    PriorSession,
    /// The `bars` candles preceding the current session.
    Lookback { bars: usize },
}

impl Default for DivergenceReference {
    fn default() -> Self {
        Self::PriorSession
    }
}

/// Thresholds and periods shared by every detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    /// Relative distance under which two prices count as "near"
    /// (0.002 = 0.2 %). The only proximity constant in the engine.
    #[serde(default = "default_near_tolerance")]
    pub near_tolerance: f64,

    #[serde(default = "default_ema_fast_period")]
    pub ema_fast_period: usize,

    #[serde(default = "default_ema_slow_period")]
    pub ema_slow_period: usize,

    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    /// Half-width of the band around RSI 50 treated as neutral momentum.
    #[serde(default = "default_rsi_neutral_band")]
    pub rsi_neutral_band: f64,

    /// Consecutive histogram bars that must shrink for "momentum slowing".
    #[serde(default = "default_momentum_bars")]
    pub momentum_bars: usize,

    /// Closes inspected for EMA bounces.
    #[serde(default = "default_bounce_lookback")]
    pub bounce_lookback: usize,

    /// Bars scanned for swing structure by the continuation evaluator.
    #[serde(default = "default_continuation_window")]
    pub continuation_window: usize,

    /// Bars on each side a pivot must dominate to count as a swing point.
    #[serde(default = "default_swing_strength")]
    pub swing_strength: usize,

    #[serde(default)]
    pub divergence_reference: DivergenceReference,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            near_tolerance: default_near_tolerance(),
            ema_fast_period: default_ema_fast_period(),
            ema_slow_period: default_ema_slow_period(),
            rsi_period: default_rsi_period(),
            rsi_neutral_band: default_rsi_neutral_band(),
            momentum_bars: default_momentum_bars(),
            bounce_lookback: default_bounce_lookback(),
            continuation_window: default_continuation_window(),
            swing_strength: default_swing_strength(),
            divergence_reference: DivergenceReference::default(),
        }
    }
}

impl AnalysisParams {
    /// `true` when `price` lies within `near_tolerance` of `reference`,
    /// relative to `reference`.
    pub fn is_near(&self, price: f64, reference: f64) -> bool {
        reference != 0.0 && ((price - reference) / reference).abs() < self.near_tolerance
    }
}

// =============================================================================
// SignalConfig
// =============================================================================

/// Top-level configuration for the signal service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    // --- Universe -----------------------------------------------------------

    /// Symbols to scan. Empty means "discover from the provider".
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Cap on discovered symbols.
    #[serde(default = "default_max_symbols")]
    pub max_symbols: usize,

    /// Quote asset discovered symbols must trade against.
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    /// Rank discovered symbols by 24h quote volume.
    #[serde(default = "default_true")]
    pub rank_by_volume: bool,

    // --- Candle retrieval ---------------------------------------------------

    /// Kline interval, e.g. "15m".
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Candles requested per symbol.
    #[serde(default = "default_candle_limit")]
    pub candle_limit: u32,

    /// Seconds between full refreshes.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Symbols fetched concurrently within one batch.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Candles a symbol needs before structure detection runs.
    #[serde(default = "default_min_candles")]
    pub min_candles: usize,

    // --- Analysis -----------------------------------------------------------

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub analysis: AnalysisParams,

    // --- Presentation -------------------------------------------------------

    /// Chart link attached to each signal; `{symbol}` is substituted.
    #[serde(default = "default_chart_url_template")]
    pub chart_url_template: String,

    /// Address of the read-only JSON API.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            max_symbols: default_max_symbols(),
            quote_asset: default_quote_asset(),
            rank_by_volume: true,
            interval: default_interval(),
            candle_limit: default_candle_limit(),
            refresh_interval_secs: default_refresh_interval_secs(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            min_candles: default_min_candles(),
            session: SessionConfig::default(),
            analysis: AnalysisParams::default(),
            chart_url_template: default_chart_url_template(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl SignalConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read signal config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse signal config from {}", path.display()))?;

        config.validate()?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            interval = %config.interval,
            "signal config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise signal config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "signal config saved (atomic)");
        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        ensure!(a.near_tolerance > 0.0, "near_tolerance must be positive");
        ensure!(
            a.ema_fast_period > 0 && a.ema_slow_period > a.ema_fast_period,
            "EMA periods must satisfy 0 < fast < slow"
        );
        ensure!(a.rsi_period > 0, "rsi_period must be positive");
        ensure!(a.momentum_bars >= 2, "momentum_bars must be at least 2");
        ensure!(a.swing_strength > 0, "swing_strength must be positive");
        ensure!(self.max_concurrent_fetches > 0, "max_concurrent_fetches must be positive");
        ensure!(
            self.min_candles >= a.ema_slow_period,
            "min_candles must cover the slow EMA period"
        );
        self.session.schedule()?;
        Ok(())
    }

    /// Render the chart link for `symbol`.
    pub fn chart_url(&self, symbol: &str) -> String {
        self.chart_url_template.replace("{symbol}", symbol)
    }
}
