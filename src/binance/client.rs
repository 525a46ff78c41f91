// =============================================================================
// Binance REST API Client — public market data
// =============================================================================
//
// Only unauthenticated endpoints are used: klines for candle history,
// exchangeInfo + ticker/24hr for symbol discovery.  Every request is
// pre-flighted against the rate-limit tracker and feeds the returned weight
// header back into it.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument};

use super::rate_limit::{weight, RateLimitTracker};
use crate::error::{SignalError, SignalResult};
use crate::market_data::{normalize_klines, Candle, CandleSource, SymbolSource};
use crate::runtime_config::SignalConfig;

const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Binance public REST client.
#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
    rate_limit: Arc<RateLimitTracker>,
    candle_limit: u32,
    quote_asset: String,
    rank_by_volume: bool,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    pub fn from_config(config: &SignalConfig) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, config)
    }

    /// Point the client at another host, e.g. a regional mirror.
    pub fn with_base_url(base_url: impl Into<String>, config: &SignalConfig) -> Result<Self> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        debug!(base_url = %base_url, "BinanceClient initialised");

        Ok(Self {
            base_url,
            client,
            rate_limit: Arc::new(RateLimitTracker::new()),
            candle_limit: config.candle_limit,
            quote_asset: config.quote_asset.to_uppercase(),
            rank_by_volume: config.rank_by_volume,
        })
    }

    /// Shared handle to the request-weight tracker.
    pub fn rate_limit(&self) -> Arc<RateLimitTracker> {
        self.rate_limit.clone()
    }

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------

    async fn get_json(&self, path: &str, query: &[(&str, String)], weight: u32) -> SignalResult<Value> {
        if !self.rate_limit.can_send_request(weight, Utc::now().timestamp_millis()) {
            return Err(SignalError::Upstream(format!(
                "GET {path} deferred: request weight limit reached"
            )));
        }

        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).query(query).send().await?;
        self.rate_limit
            .update_from_headers(resp.headers(), Utc::now().timestamp_millis());

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| SignalError::Upstream(format!("failed to parse {path} response: {e}")))?;

        if !status.is_success() {
            return Err(SignalError::Upstream(format!(
                "Binance GET {path} returned {status}: {body}"
            )));
        }
        Ok(body)
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /api/v3/klines, normalised oldest-first.
    #[instrument(skip(self), name = "binance::get_klines")]
    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: u32) -> SignalResult<Vec<Candle>> {
        let query = [
            ("symbol", symbol.to_uppercase()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        let body = self.get_json("/api/v3/klines", &query, weight::klines(limit)).await?;
        let candles = normalize_klines(&body, 1)?;
        debug!(symbol, interval, count = candles.len(), "klines retrieved");
        Ok(candles)
    }

    /// Symbols in TRADING status quoted in the configured asset, most liquid
    /// first when volume ranking is on.
    #[instrument(skip(self), name = "binance::get_tradable_symbols")]
    pub async fn get_tradable_symbols(&self) -> SignalResult<Vec<String>> {
        let info = self.get_json("/api/v3/exchangeInfo", &[], weight::EXCHANGE_INFO).await?;
        let mut symbols = parse_tradable_symbols(&info, &self.quote_asset)?;

        if self.rank_by_volume {
            let tickers = self.get_json("/api/v3/ticker/24hr", &[], weight::TICKER_24HR_ALL).await?;
            rank_by_quote_volume(&mut symbols, &tickers);
        }

        debug!(count = symbols.len(), quote = %self.quote_asset, "tradable symbols retrieved");
        Ok(symbols)
    }
}

#[async_trait]
impl CandleSource for BinanceClient {
    async fn fetch_candles(&self, symbol: &str, interval: &str) -> SignalResult<Vec<Candle>> {
        self.get_klines(symbol, interval, self.candle_limit).await
    }
}

#[async_trait]
impl SymbolSource for BinanceClient {
    async fn tradable_symbols(&self) -> SignalResult<Vec<String>> {
        self.get_tradable_symbols().await
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .field("candle_limit", &self.candle_limit)
            .field("quote_asset", &self.quote_asset)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Payload helpers
// -----------------------------------------------------------------------------

fn parse_tradable_symbols(info: &Value, quote_asset: &str) -> SignalResult<Vec<String>> {
    let entries = info["symbols"]
        .as_array()
        .ok_or_else(|| SignalError::malformed("exchangeInfo response missing 'symbols' array"))?;

    Ok(entries
        .iter()
        .filter(|s| s["status"].as_str() == Some("TRADING"))
        .filter(|s| s["quoteAsset"].as_str() == Some(quote_asset))
        .filter_map(|s| s["symbol"].as_str().map(str::to_string))
        .collect())
}

/// Stable sort by 24h quote volume, highest first. Symbols without a ticker
/// sink to the end.
fn rank_by_quote_volume(symbols: &mut [String], tickers: &Value) {
    let volumes: HashMap<&str, f64> = tickers
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|t| {
                    let symbol = t["symbol"].as_str()?;
                    let volume = t["quoteVolume"].as_str()?.parse::<f64>().ok()?;
                    Some((symbol, volume))
                })
                .collect()
        })
        .unwrap_or_default();

    let volume_of = |s: &str| volumes.get(s).copied().filter(|v| v.is_finite()).unwrap_or(0.0);
    symbols.sort_by(|a, b| volume_of(b).total_cmp(&volume_of(a)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filters_trading_symbols_by_quote() {
        let info = json!({
            "symbols": [
                { "symbol": "BTCUSDT", "status": "TRADING", "quoteAsset": "USDT" },
                { "symbol": "ETHBTC", "status": "TRADING", "quoteAsset": "BTC" },
                { "symbol": "LUNAUSDT", "status": "BREAK", "quoteAsset": "USDT" },
                { "symbol": "SOLUSDT", "status": "TRADING", "quoteAsset": "USDT" }
            ]
        });
        let symbols = parse_tradable_symbols(&info, "USDT").unwrap();
        assert_eq!(symbols, vec!["BTCUSDT", "SOLUSDT"]);
    }

    #[test]
    fn missing_symbols_array_is_malformed() {
        let err = parse_tradable_symbols(&json!({ "code": -1 }), "USDT").unwrap_err();
        assert!(matches!(err, SignalError::MalformedData(_)));
    }

    #[test]
    fn ranks_by_quote_volume_descending() {
        let mut symbols = vec!["AUSDT".to_string(), "BUSDT".to_string(), "CUSDT".to_string()];
        let tickers = json!([
            { "symbol": "AUSDT", "quoteVolume": "100.5" },
            { "symbol": "CUSDT", "quoteVolume": "9000" }
        ]);
        rank_by_quote_volume(&mut symbols, &tickers);
        assert_eq!(symbols, vec!["CUSDT", "AUSDT", "BUSDT"]);
    }

    #[test]
    fn client_builds_from_default_config() {
        let client = BinanceClient::from_config(&SignalConfig::default()).unwrap();
        assert_eq!(client.candle_limit, 500);
        assert_eq!(client.quote_asset, "USDT");
        assert_eq!(client.rate_limit().current_weight(0), 0);
    }
}
