// =============================================================================
// Signal Analysis Module
// =============================================================================
//
// Detectors that turn aligned price + indicator series into discrete signals:
// - Key level inference and A-B-C-D reversal structure
// - Price / RSI divergence, EMA bounces, momentum slowdown
// - Trend continuation / breakdown
// - Per-symbol memory of the last confirmed reversal
//
// Every detector is direction-agnostic internally: bearish logic is the
// bullish logic applied to prices multiplied by `direction_sign(trend)`.

pub mod continuation;
pub mod divergence;
pub mod level;
pub mod reversal_cache;

pub use continuation::{detect_continuation, Continuation};
pub use divergence::{analyze_momentum, MomentumAnalysis, SessionRanges};
pub use level::{find_abcd_structure, find_relevant_level, AbcdPattern, Level, LevelAnalysis};
pub use reversal_cache::{ReversalCache, ReversalRecord};

use std::ops::Range;

use crate::error::{SignalError, SignalResult};
use crate::types::Trend;

/// Borrowed, index-aligned view over one symbol's price and indicator series.
#[derive(Debug, Clone, Copy)]
pub struct SeriesView<'a> {
    pub closes: &'a [f64],
    pub highs: &'a [f64],
    pub lows: &'a [f64],
    pub ema_fast: &'a [Option<f64>],
    pub ema_slow: &'a [Option<f64>],
    pub rsi: &'a [Option<f64>],
}

impl<'a> SeriesView<'a> {
    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    /// Every series must be aligned with `closes`.
    pub fn check_aligned(&self) -> SignalResult<()> {
        let n = self.len();
        let lens = [
            self.highs.len(),
            self.lows.len(),
            self.ema_fast.len(),
            self.ema_slow.len(),
            self.rsi.len(),
        ];
        if lens.iter().any(|&l| l != n) {
            return Err(SignalError::malformed(format!(
                "series misaligned: closes={n}, others={lens:?}"
            )));
        }
        Ok(())
    }

    /// The first `len` bars, as if later candles had not happened yet.
    pub fn prefix(&self, len: usize) -> SeriesView<'a> {
        let len = len.min(self.len());
        SeriesView {
            closes: &self.closes[..len],
            highs: &self.highs[..len],
            lows: &self.lows[..len],
            ema_fast: &self.ema_fast[..len],
            ema_slow: &self.ema_slow[..len],
            rsi: &self.rsi[..len],
        }
    }

    pub fn rsi_at(&self, idx: usize) -> Option<f64> {
        crate::indicators::value_at(self.rsi, idx)
    }
}

/// +1 for bullish, -1 for bearish.
pub(crate) fn direction_sign(trend: Trend) -> f64 {
    match trend {
        Trend::Bullish => 1.0,
        Trend::Bearish => -1.0,
    }
}

/// Index of the largest `sign * values[i]` in `range`; ties keep the first.
pub(crate) fn extreme_index(values: &[f64], range: Range<usize>, sign: f64) -> Option<usize> {
    let mut best: Option<usize> = None;
    for i in range {
        match best {
            Some(b) if sign * values[i] <= sign * values[b] => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Swing points of `values` inside `range`, oldest first.
///
/// A pivot must be strictly more extreme (in `sign` direction) than the
/// `strength` bars before it and at least as extreme as the `strength` bars
/// after it, all within `range`. Plateaus therefore resolve to their first bar.
pub(crate) fn swing_points(values: &[f64], range: Range<usize>, strength: usize, sign: f64) -> Vec<usize> {
    let end = range.end.min(values.len());
    let first = range.start + strength;
    if strength == 0 || first + strength >= end {
        return Vec::new();
    }

    (first..end - strength)
        .filter(|&i| {
            let v = sign * values[i];
            (i - strength..i).all(|j| v > sign * values[j])
                && (i + 1..=i + strength).all(|j| v >= sign * values[j])
        })
        .collect()
}
