use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SignalError, SignalResult};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV observation. Immutable once normalised.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time, epoch milliseconds.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    fn validate(&self, idx: usize) -> SignalResult<()> {
        let fields = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
            ("volume", self.volume),
        ];
        for (name, v) in fields {
            if !v.is_finite() || v < 0.0 {
                return Err(SignalError::malformed(format!(
                    "candle {idx}: {name} must be a non-negative finite number, got {v}"
                )));
            }
        }
        if self.low > self.open.min(self.close) || self.high < self.open.max(self.close) {
            return Err(SignalError::malformed(format!(
                "candle {idx}: OHLC bounds violated (o={}, h={}, l={}, c={})",
                self.open, self.high, self.low, self.close
            )));
        }
        Ok(())
    }
}

/// Column-wise view of a candle series, the shape the detectors consume.
#[derive(Debug, Clone, Default)]
pub struct PriceColumns {
    pub closes: Vec<f64>,
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
}

impl PriceColumns {
    pub fn from_candles(candles: &[Candle]) -> Self {
        Self {
            closes: candles.iter().map(|c| c.close).collect(),
            highs: candles.iter().map(|c| c.high).collect(),
            lows: candles.iter().map(|c| c.low).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Normaliser
// ---------------------------------------------------------------------------

/// Convert a provider payload into an oldest-first candle series.
///
/// Accepted entry shapes:
/// - Binance kline arrays: `[openTime, "open", "high", "low", "close", "volume", ...]`
/// - Objects keyed `t|timestamp|openTime`, `o|open`, `h|high`, `l|low`,
///   `c|close`, `v|volume`
///
/// Numeric fields may be JSON numbers or numeric strings. Newest-first payloads
/// are reversed. Fails with a data error on missing or non-numeric fields,
/// OHLC bound violations, duplicate timestamps, or fewer than `min_candles`
/// entries.
pub fn normalize_klines(raw: &Value, min_candles: usize) -> SignalResult<Vec<Candle>> {
    let entries = raw
        .as_array()
        .ok_or_else(|| SignalError::malformed("candle payload is not an array"))?;

    let mut candles = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| parse_entry(i, entry))
        .collect::<SignalResult<Vec<_>>>()?;

    if let (Some(first), Some(last)) = (candles.first(), candles.last()) {
        if first.timestamp > last.timestamp {
            candles.reverse();
        }
    }

    check_series(&candles)?;
    SignalError::ensure_len(min_candles, candles.len())?;
    Ok(candles)
}

/// Verify an oldest-first series: every candle well-formed and open times
/// strictly increasing.
pub fn check_series(candles: &[Candle]) -> SignalResult<()> {
    for (i, c) in candles.iter().enumerate() {
        c.validate(i)?;
    }
    if let Some(pos) = candles.windows(2).position(|w| w[1].timestamp <= w[0].timestamp) {
        return Err(SignalError::malformed(format!(
            "timestamps not strictly increasing at index {}",
            pos + 1
        )));
    }
    Ok(())
}

fn parse_entry(idx: usize, entry: &Value) -> SignalResult<Candle> {
    let candle = match entry {
        Value::Array(arr) => {
            if arr.len() < 6 {
                return Err(SignalError::malformed(format!(
                    "kline {idx} has {} elements, expected at least 6",
                    arr.len()
                )));
            }
            Candle {
                timestamp: parse_i64(&arr[0], idx, "openTime")?,
                open: parse_f64(&arr[1], idx, "open")?,
                high: parse_f64(&arr[2], idx, "high")?,
                low: parse_f64(&arr[3], idx, "low")?,
                close: parse_f64(&arr[4], idx, "close")?,
                volume: parse_f64(&arr[5], idx, "volume")?,
            }
        }
        Value::Object(_) => Candle {
            timestamp: parse_i64(field(entry, &["t", "timestamp", "openTime"], idx)?, idx, "timestamp")?,
            open: parse_f64(field(entry, &["o", "open"], idx)?, idx, "open")?,
            high: parse_f64(field(entry, &["h", "high"], idx)?, idx, "high")?,
            low: parse_f64(field(entry, &["l", "low"], idx)?, idx, "low")?,
            close: parse_f64(field(entry, &["c", "close"], idx)?, idx, "close")?,
            volume: parse_f64(field(entry, &["v", "volume"], idx)?, idx, "volume")?,
        },
        _ => {
            return Err(SignalError::malformed(format!(
                "kline {idx} is neither an array nor an object"
            )))
        }
    };
    Ok(candle)
}

fn field<'a>(obj: &'a Value, keys: &[&str], idx: usize) -> SignalResult<&'a Value> {
    keys.iter()
        .find_map(|k| obj.get(*k))
        .ok_or_else(|| SignalError::malformed(format!("kline {idx}: missing field {}", keys[0])))
}

/// Providers send numbers either as JSON numbers or as numeric strings.
fn parse_f64(val: &Value, idx: usize, name: &str) -> SignalResult<f64> {
    let parsed = match val {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.ok_or_else(|| SignalError::malformed(format!("kline {idx}: {name} is not numeric: {val}")))
}

fn parse_i64(val: &Value, idx: usize, name: &str) -> SignalResult<i64> {
    let parsed = match val {
        Value::String(s) => s.parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    };
    parsed.ok_or_else(|| SignalError::malformed(format!("kline {idx}: {name} is not an integer: {val}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
