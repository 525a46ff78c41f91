// =============================================================================
// Key Level & A-B-C-D Reversal Structure
// =============================================================================
//
// The key level is the close at the most recent EMA crossover that agrees
// with the current trend (bullish cross -> support, bearish cross ->
// resistance).  Without such a crossover the series' overall extreme stands
// in: highest high as resistance in a bullish trend, lowest low as support in
// a bearish one.
//
// Starting from the crossover bar (A), the reversal search looks for the
// structure that marks the end of the *previous* opposite move:
//
//   bullish trend:  A -> B highest high -> C low breaks A's low -> D RSI < RSI(B)
//   bearish trend:  A -> B lowest low   -> C high breaks A's high -> D RSI > RSI(B)
//
// Any bar after C that extends beyond B's extreme invalidates the search.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::{direction_sign, extreme_index, SeriesView};
use crate::error::{SignalError, SignalResult};
use crate::types::{Action, LevelKind, Trend};

/// Bars needed to look for a crossover at all.
pub const MIN_LEVEL_CANDLES: usize = 2;

/// Bars needed before the A-B-C-D search runs.
pub const MIN_REVERSAL_CANDLES: usize = 20;

/// An inferred support or resistance price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub kind: LevelKind,
    /// Bar the level was taken from. `None` for the series-extreme fallback.
    pub origin_index: Option<usize>,
}

/// Indices of a confirmed A-B-C-D structure, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbcdPattern {
    pub a: usize,
    pub b: usize,
    pub c: usize,
    pub d: usize,
}

/// Everything the level detector derives from one series.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelAnalysis {
    pub level: Level,
    pub cross_index: Option<usize>,
    pub rsi_at_cross: Option<f64>,
    /// Trend-following signal: RSI has cooled off since the crossover.
    pub cross_signal: Option<Action>,
    /// Counter-trend signal: the newest bar failed to extend the move on
    /// either price or RSI.
    pub stall_reversal: Option<Action>,
    pub abc_pattern: Option<AbcdPattern>,
    pub abc_signal: Option<Action>,
}

/// Locate the key level for `trend` and evaluate the signals anchored on it.
pub fn find_relevant_level(view: &SeriesView<'_>, trend: Trend) -> SignalResult<LevelAnalysis> {
    view.check_aligned()?;
    let n = view.len();
    SignalError::ensure_len(MIN_LEVEL_CANDLES, n)?;

    let Some(cross) = find_cross(view, trend) else {
        return Ok(fallback_level(view, trend));
    };

    let sign = direction_sign(trend);
    let last = n - 1;
    let rsi_at_cross = view.rsi_at(cross);
    let rsi_now = view.rsi_at(last);

    let cross_signal = match (rsi_now, rsi_at_cross) {
        (Some(now), Some(at_cross)) if sign * now < sign * at_cross => Some(Action::with_trend(trend)),
        _ => None,
    };

    let extension = if trend == Trend::Bullish { view.highs } else { view.lows };
    let stall_reversal = extreme_index(extension, cross..last, sign).and_then(|ext| {
        let price_failed = sign * extension[last] <= sign * extension[ext];
        let rsi_failed = match (rsi_now, view.rsi_at(ext)) {
            (Some(now), Some(at_ext)) => sign * now <= sign * at_ext,
            _ => false,
        };
        (price_failed && rsi_failed).then(|| Action::against_trend(trend))
    });

    // A short series leaves the structure unevaluated rather than guessing.
    let abc_pattern = if n >= MIN_REVERSAL_CANDLES {
        find_abcd_structure(cross, trend, view.highs, view.lows, view.rsi)?
    } else {
        None
    };

    let kind = match trend {
        Trend::Bullish => LevelKind::Support,
        Trend::Bearish => LevelKind::Resistance,
    };

    Ok(LevelAnalysis {
        level: Level {
            price: view.closes[cross],
            kind,
            origin_index: Some(cross),
        },
        cross_index: Some(cross),
        rsi_at_cross,
        cross_signal,
        stall_reversal,
        abc_pattern,
        abc_signal: abc_pattern.map(|_| Action::against_trend(trend)),
    })
}

/// Search forward from `a` for the A-B-C-D structure of the move that
/// preceded `trend`.
///
/// Returns `Ok(None)` when any leg never forms or price runs past B after C.
pub fn find_abcd_structure(
    a: usize,
    trend: Trend,
    highs: &[f64],
    lows: &[f64],
    rsi: &[Option<f64>],
) -> SignalResult<Option<AbcdPattern>> {
    let n = highs.len();
    SignalError::ensure_len(MIN_REVERSAL_CANDLES, n)?;
    if lows.len() != n || rsi.len() != n {
        return Err(SignalError::malformed(format!(
            "series misaligned: highs={n}, lows={}, rsi={}",
            lows.len(),
            rsi.len()
        )));
    }
    if a >= n {
        return Err(SignalError::malformed(format!("anchor {a} outside series of {n}")));
    }

    let sign = direction_sign(trend);
    let (extension, protection) = match trend {
        Trend::Bullish => (highs, lows),
        Trend::Bearish => (lows, highs),
    };

    // B: running extreme after A.  C: first bar that breaks A on the other side.
    let mut b: Option<usize> = None;
    let mut c: Option<usize> = None;
    for j in a + 1..n {
        match b {
            Some(bi) if sign * extension[j] <= sign * extension[bi] => {
                if sign * protection[j] < sign * protection[a] {
                    c = Some(j);
                    break;
                }
            }
            _ => b = Some(j),
        }
    }
    let (Some(b), Some(c)) = (b, c) else {
        return Ok(None);
    };
    let Some(rsi_b) = rsi[b] else {
        return Ok(None);
    };

    for d in c + 1..n {
        if sign * extension[d] > sign * extension[b] {
            return Ok(None);
        }
        if matches!(rsi[d], Some(r) if sign * r < sign * rsi_b) {
            return Ok(Some(AbcdPattern { a, b, c, d }));
        }
    }
    Ok(None)
}

/// Most recent bar `i` (excluding the newest) where the fast EMA crosses the
/// slow EMA in the direction of `trend`.
fn find_cross(view: &SeriesView<'_>, trend: Trend) -> Option<usize> {
    let sign = direction_sign(trend);
    let n = view.len();
    (1..n - 1).rev().find(|&i| {
        match (
            view.ema_fast[i - 1],
            view.ema_slow[i - 1],
            view.ema_fast[i],
            view.ema_slow[i],
        ) {
            (Some(pf), Some(ps), Some(cf), Some(cs)) => sign * (pf - ps) < 0.0 && sign * (cf - cs) > 0.0,
            _ => false,
        }
    })
}

fn fallback_level(view: &SeriesView<'_>, trend: Trend) -> LevelAnalysis {
    let (series, kind, sign) = match trend {
        Trend::Bullish => (view.highs, LevelKind::Resistance, 1.0),
        Trend::Bearish => (view.lows, LevelKind::Support, -1.0),
    };
    let price = extreme_index(series, 0..series.len(), sign)
        .map(|i| series[i])
        .unwrap_or(f64::NAN);

    LevelAnalysis {
        level: Level {
            price,
            kind,
            origin_index: None,
        },
        cross_index: None,
        rsi_at_cross: None,
        cross_signal: None,
        stall_reversal: None,
        abc_pattern: None,
        abc_signal: None,
    }
}
