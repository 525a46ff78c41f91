// =============================================================================
// Divergence & Momentum Analyzer
// =============================================================================
//
// Price/RSI disagreement and momentum decay, evaluated over session windows:
//
//   session divergence   current session's extreme vs. the reference window's
//   level divergence     price back at the key level with RSI off its origin
//   EMA bounces          recent closes tagged an EMA and price is back above
//   touched slow EMA     the prior session traded through the slow EMA
//   momentum slowing     shrinking MACD histogram with RSI near 50
//
// Extremes are tracked by index so the RSI read is always the one printed on
// the extreme bar itself.
// =============================================================================

use std::ops::Range;

use super::{extreme_index, Level, SeriesView};
use crate::error::{SignalError, SignalResult};
use crate::runtime_config::AnalysisParams;
use crate::types::{DivergenceType, Trend};

/// Index ranges (into the analysed series) for the session windows in play.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionRanges {
    pub current: Range<usize>,
    pub previous: Range<usize>,
    /// What the current session's extremes are compared against.
    pub reference: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MomentumAnalysis {
    pub divergence: Option<DivergenceType>,
    pub divergence_from_level: Option<DivergenceType>,
    pub ema_fast_bounce: bool,
    pub ema_slow_bounce: bool,
    pub touched_ema_slow_today: bool,
    pub momentum_slowing: Option<Trend>,
}

/// Run every momentum detector over one symbol.
pub fn analyze_momentum(
    view: &SeriesView<'_>,
    histogram: &[Option<f64>],
    trend: Trend,
    level: &Level,
    sessions: &SessionRanges,
    params: &AnalysisParams,
) -> SignalResult<MomentumAnalysis> {
    view.check_aligned()?;
    if histogram.len() != view.len() {
        return Err(SignalError::malformed(format!(
            "histogram misaligned: {} vs {}",
            histogram.len(),
            view.len()
        )));
    }

    Ok(MomentumAnalysis {
        divergence: session_divergence(view, sessions.current.clone(), sessions.reference.clone()),
        divergence_from_level: level_divergence(view, level, params),
        ema_fast_bounce: ema_bounce(view.closes, view.ema_fast, params),
        ema_slow_bounce: ema_bounce(view.closes, view.ema_slow, params),
        touched_ema_slow_today: touched_ema(view, view.ema_slow, sessions.previous.clone(), params),
        momentum_slowing: momentum_slowing(histogram, view.rsi, trend, params),
    })
}

/// Compare the current session's extremes against `reference`.
///
/// Bearish: higher high with a lower RSI at that high. Bullish: lower low with
/// a higher RSI at that low. When both fire, the more recent extreme decides.
pub fn session_divergence(
    view: &SeriesView<'_>,
    current: Range<usize>,
    reference: Range<usize>,
) -> Option<DivergenceType> {
    let bearish = diverging_extreme(view.highs, view.rsi, current.clone(), reference.clone(), 1.0);
    let bullish = diverging_extreme(view.lows, view.rsi, current, reference, -1.0);

    match (bearish, bullish) {
        (Some(high), Some(low)) if low > high => Some(DivergenceType::Bullish),
        (Some(_), _) => Some(DivergenceType::Bearish),
        (None, Some(_)) => Some(DivergenceType::Bullish),
        (None, None) => None,
    }
}

/// Index of the current-window extreme when it diverges from the reference
/// window's extreme.
fn diverging_extreme(
    prices: &[f64],
    rsi: &[Option<f64>],
    current: Range<usize>,
    reference: Range<usize>,
    sign: f64,
) -> Option<usize> {
    let now = extreme_index(prices, current, sign)?;
    let prior = extreme_index(prices, reference, sign)?;
    let (rsi_now, rsi_prior) = (rsi[now]?, rsi[prior]?);
    (sign * prices[now] > sign * prices[prior] && sign * rsi_now < sign * rsi_prior).then_some(now)
}

/// Divergence between the newest bar and the bar the key level came from.
///
/// Only fires while the last close is near the level.
pub fn level_divergence(view: &SeriesView<'_>, level: &Level, params: &AnalysisParams) -> Option<DivergenceType> {
    let origin = level.origin_index?;
    let last = view.len().checked_sub(1)?;
    if origin >= last {
        return None;
    }

    let close = view.closes[last];
    if !params.is_near(close, level.price) {
        return None;
    }

    let (rsi_now, rsi_origin) = (view.rsi_at(last)?, view.rsi_at(origin)?);
    if close >= level.price && rsi_now < rsi_origin {
        Some(DivergenceType::Bearish)
    } else if close <= level.price && rsi_now > rsi_origin {
        Some(DivergenceType::Bullish)
    } else {
        None
    }
}

/// A recent close came within tolerance of `ema` and price now closes above it.
pub fn ema_bounce(closes: &[f64], ema: &[Option<f64>], params: &AnalysisParams) -> bool {
    let n = closes.len().min(ema.len());
    let Some(last) = n.checked_sub(1) else {
        return false;
    };
    let Some(ema_now) = ema[last] else {
        return false;
    };
    if closes[last] <= ema_now {
        return false;
    }

    (n.saturating_sub(params.bounce_lookback)..n)
        .any(|i| matches!(ema[i], Some(e) if params.is_near(closes[i], e)))
}

/// The bars in `range` straddled `ema` (range low <= EMA <= range high) and
/// at least one close landed near it.
pub fn touched_ema(view: &SeriesView<'_>, ema: &[Option<f64>], range: Range<usize>, params: &AnalysisParams) -> bool {
    let range = range.start..range.end.min(view.len()).min(ema.len());
    let Some(last) = range.end.checked_sub(1).filter(|&l| l >= range.start) else {
        return false;
    };
    let Some(ema_ref) = ema[last] else {
        return false;
    };

    let high = view.highs[range.clone()].iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let low = view.lows[range.clone()].iter().copied().fold(f64::INFINITY, f64::min);
    if !(low <= ema_ref && ema_ref <= high) {
        return false;
    }

    range.into_iter().any(|i| matches!(ema[i], Some(e) if params.is_near(view.closes[i], e)))
}

/// MACD histogram magnitude shrinking for `momentum_bars` bars while RSI sits
/// inside the neutral band. Tagged with the trend being exhausted.
pub fn momentum_slowing(
    histogram: &[Option<f64>],
    rsi: &[Option<f64>],
    trend: Trend,
    params: &AnalysisParams,
) -> Option<Trend> {
    let bars = params.momentum_bars;
    let n = histogram.len();
    if bars < 2 || n < bars {
        return None;
    }

    let tail: Vec<f64> = histogram[n - bars..].iter().copied().collect::<Option<_>>()?;
    let shrinking = tail.windows(2).all(|w| w[1].abs() < w[0].abs());
    let rsi_now = crate::indicators::value_at(rsi, n - 1)?;
    let neutral = (rsi_now - 50.0).abs() <= params.rsi_neutral_band;

    (shrinking && neutral).then_some(trend)
}
