// =============================================================================
// Reversal Cache — last confirmed A-B-C-D reversal per symbol
// =============================================================================
//
// Shared between batch runs so a reversal stays visible after the structure
// scrolls out of the latest analysis.  Entries are keyed by symbol and never
// influence other symbols.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::AbcdPattern;
use crate::market_data::Candle;
use crate::types::{Action, Trend};

/// A confirmed reversal, stored with candle timestamps so it stays meaningful
/// as the analysed window slides forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversalRecord {
    pub signal: Action,
    /// Trend in force when the reversal was detected.
    pub trend: Trend,
    pub a_time: i64,
    pub b_time: i64,
    pub c_time: i64,
    pub d_time: i64,
    /// Close of the D bar.
    pub d_price: f64,
    pub detected_at: i64,
}

impl ReversalRecord {
    /// Resolve `pattern` indices against the candles they were found in.
    pub fn from_pattern(
        pattern: &AbcdPattern,
        candles: &[Candle],
        signal: Action,
        trend: Trend,
        detected_at: i64,
    ) -> Option<Self> {
        let at = |i: usize| candles.get(i);
        let d = at(pattern.d)?;
        Some(Self {
            signal,
            trend,
            a_time: at(pattern.a)?.timestamp,
            b_time: at(pattern.b)?.timestamp,
            c_time: at(pattern.c)?.timestamp,
            d_time: d.timestamp,
            d_price: d.close,
            detected_at,
        })
    }
}

/// Thread-safe per-symbol store.
#[derive(Debug, Default)]
pub struct ReversalCache {
    entries: RwLock<HashMap<String, ReversalRecord>>,
}

impl ReversalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` for `symbol`, replacing any older reversal. A record
    /// whose D bar is not newer than the stored one is ignored.
    pub fn remember(&self, symbol: &str, record: ReversalRecord) {
        let mut entries = self.entries.write();
        match entries.get(symbol) {
            Some(existing) if existing.d_time >= record.d_time => {}
            _ => {
                entries.insert(symbol.to_string(), record);
            }
        }
    }

    pub fn get(&self, symbol: &str) -> Option<ReversalRecord> {
        self.entries.read().get(symbol).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
