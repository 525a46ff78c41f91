// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// Each close-to-close change is split into a gain and a loss leg.  The first
// `period` legs are averaged to seed the smoothing, after which
//
//     avg = (prev_avg * (period - 1) + leg) / period
//     RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//
// A zero average loss (a flat market included) saturates at 100 rather than
// dividing by zero.
// =============================================================================

use super::IndicatorSeries;

/// Compute the RSI series for `closes`, index-aligned with the input.
///
/// The first defined value sits at index `period`; earlier indices are `None`.
/// `period == 0` or fewer than `period + 1` closes yields an all-`None` series.
/// A non-finite result ends the series.
pub fn calculate_rsi(closes: &[f64], period: usize) -> IndicatorSeries {
    let mut result = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return result;
    }

    // legs[i - 1] is the (gain, loss) leading into close i.
    let legs: Vec<(f64, f64)> = closes
        .windows(2)
        .map(|w| {
            let change = w[1] - w[0];
            (change.max(0.0), (-change).max(0.0))
        })
        .collect();

    let p = period as f64;
    let mut avg_gain = legs[..period].iter().map(|l| l.0).sum::<f64>() / p;
    let mut avg_loss = legs[..period].iter().map(|l| l.1).sum::<f64>() / p;

    for i in period..closes.len() {
        if i > period {
            let (gain, loss) = legs[i - 1];
            avg_gain = (avg_gain * (p - 1.0) + gain) / p;
            avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        }
        match saturated_rsi(avg_gain, avg_loss) {
            Some(rsi) => result[i] = Some(rsi),
            None => break,
        }
    }

    result
}

fn saturated_rsi(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };
    rsi.is_finite().then(|| rsi.clamp(0.0, 100.0))
}
