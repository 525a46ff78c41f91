// =============================================================================
// Trend Continuation Evaluator
// =============================================================================
//
// A trend is "continuing" while all of these hold over the recent window:
//   1. the fast EMA is still on the trend side of the slow EMA
//   2. the protective swings (lows in an uptrend, highs in a downtrend) are
//      not deteriorating and the newest bar has not broken the last one
//   3. RSI confirms the extension swings and the newest extreme
//
// The evaluation runs twice, with and without the newest candle, so that a
// continuation broken by that candle is reported as `ended`.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::{direction_sign, swing_points, SeriesView};
use crate::error::{SignalError, SignalResult};
use crate::runtime_config::AnalysisParams;
use crate::types::Trend;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation {
    pub continuation: bool,
    /// Valid one candle ago, invalid now.
    pub ended: bool,
    /// Why the current evaluation passed or failed.
    pub reason: String,
}

struct Check {
    valid: bool,
    reason: &'static str,
}

impl Check {
    fn fail(reason: &'static str) -> Self {
        Self { valid: false, reason }
    }
}

/// Evaluate whether `trend` is still structurally intact.
pub fn detect_continuation(
    view: &SeriesView<'_>,
    trend: Trend,
    params: &AnalysisParams,
) -> SignalResult<Continuation> {
    view.check_aligned()?;
    let n = view.len();
    SignalError::ensure_len(2 * params.swing_strength + 2, n)?;

    let now = evaluate(&view.prefix(n), trend, params);
    let before = evaluate(&view.prefix(n - 1), trend, params);

    Ok(Continuation {
        continuation: now.valid,
        ended: before.valid && !now.valid,
        reason: now.reason.to_string(),
    })
}

fn evaluate(view: &SeriesView<'_>, trend: Trend, params: &AnalysisParams) -> Check {
    let bullish = trend == Trend::Bullish;
    let sign = direction_sign(trend);
    let n = view.len();
    let last = n - 1;
    let window = n.saturating_sub(params.continuation_window)..n;

    match (view.ema_fast[last], view.ema_slow[last]) {
        (Some(fast), Some(slow)) if sign * (fast - slow) > 0.0 => {}
        (Some(_), Some(_)) => {
            return Check::fail(if bullish {
                "fast EMA fell below slow EMA"
            } else {
                "fast EMA rose above slow EMA"
            })
        }
        _ => return Check::fail("EMAs not yet defined"),
    }

    // Protective swings: lows in an uptrend, highs in a downtrend.
    let protection = if bullish { view.lows } else { view.highs };
    let pivots = swing_points(protection, window.clone(), params.swing_strength, -sign);
    if pivots.len() < 2 {
        return Check::fail("insufficient swing structure");
    }
    let deteriorating = pivots
        .windows(2)
        .any(|w| sign * (protection[w[1]] - protection[w[0]]) < 0.0);
    if deteriorating {
        return Check::fail(if bullish {
            "swing lows no longer rising"
        } else {
            "swing highs no longer falling"
        });
    }
    let guard = pivots[pivots.len() - 1];
    if sign * (protection[last] - protection[guard]) < 0.0 {
        return Check::fail(if bullish {
            "rising swing-low broken"
        } else {
            "falling swing-high broken"
        });
    }

    // Extension swings must be confirmed by RSI.
    let extension = if bullish { view.highs } else { view.lows };
    let peaks = swing_points(extension, window, params.swing_strength, sign);
    if let [.., p1, p2] = peaks[..] {
        if let (Some(r1), Some(r2)) = (view.rsi_at(p1), view.rsi_at(p2)) {
            if sign * extension[p2] > sign * extension[p1] && sign * r2 < sign * r1 {
                return Check::fail(if bullish {
                    "bearish RSI divergence between swing highs"
                } else {
                    "bullish RSI divergence between swing lows"
                });
            }
        }
    }
    if let Some(&peak) = peaks.last() {
        if let (Some(r_peak), Some(r_now)) = (view.rsi_at(peak), view.rsi_at(last)) {
            if sign * extension[last] > sign * extension[peak] && sign * r_now < sign * r_peak {
                return Check::fail(if bullish {
                    "RSI failed to confirm new high"
                } else {
                    "RSI failed to confirm new low"
                });
            }
        }
    }

    Check {
        valid: true,
        reason: if bullish {
            "higher lows intact above slow EMA"
        } else {
            "lower highs intact below slow EMA"
        },
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    struct Staircase {
        closes: Vec<f64>,
        highs: Vec<f64>,
        lows: Vec<f64>,
        fast: Vec<Option<f64>>,
        slow: Vec<Option<f64>>,
        rsi: Vec<Option<f64>>,
    }

    impl Staircase {
        /// Rising zig-zag with period 6: swing lows at multiples of 6, swing
        /// highs three bars later, RSI drifting up with price.
        fn rising(n: usize) -> Self {
            let mut s = Self {
                closes: Vec::new(),
                highs: Vec::new(),
                lows: Vec::new(),
                fast: Vec::new(),
                slow: Vec::new(),
                rsi: Vec::new(),
            };
            for i in 0..n {
                s.push_bar(i);
            }
            s
        }

        fn push_bar(&mut self, i: usize) {
            let offsets = [0.0, 1.0, 2.0, 3.0, 2.0, 1.0];
            let mid = 100.0 + i as f64 * 0.5 + offsets[i % 6];
            self.closes.push(mid);
            self.highs.push(mid + 1.0);
            self.lows.push(mid - 1.0);
            self.fast.push(Some(mid - 2.0));
            self.slow.push(Some(mid - 10.0));
            self.rsi.push(Some(50.0 + i as f64 * 0.1));
        }

        /// Mirror image: a falling zig-zag.
        fn falling(n: usize) -> Self {
            let mut s = Self::rising(n);
            for v in s
                .closes
                .iter_mut()
                .chain(s.highs.iter_mut())
                .chain(s.lows.iter_mut())
            {
                *v = 400.0 - *v;
            }
            std::mem::swap(&mut s.highs, &mut s.lows);
            for (f, sl) in s.fast.iter_mut().zip(s.slow.iter_mut()) {
                *f = f.map(|v| 400.0 - v);
                *sl = sl.map(|v| 400.0 - v);
            }
            for r in s.rsi.iter_mut() {
                *r = r.map(|v| 100.0 - v);
            }
            s
        }

        fn view(&self) -> SeriesView<'_> {
            SeriesView {
                closes: &self.closes,
                highs: &self.highs,
                lows: &self.lows,
                ema_fast: &self.fast,
                ema_slow: &self.slow,
                rsi: &self.rsi,
            }
        }
    }

    #[test]
    fn rising_staircase_continues() {
        let s = Staircase::rising(40);
        let out = detect_continuation(&s.view(), Trend::Bullish, &AnalysisParams::default()).unwrap();
        assert!(out.continuation, "{}", out.reason);
        assert!(!out.ended);
    }

    #[test]
    fn falling_staircase_continues() {
        let s = Staircase::falling(40);
        let out = detect_continuation(&s.view(), Trend::Bearish, &AnalysisParams::default()).unwrap();
        assert!(out.continuation, "{}", out.reason);
    }

    #[test]
    fn break_of_last_swing_low_ends_continuation() {
        let mut s = Staircase::rising(40);
        s.push_bar(40);
        s.lows[40] = 50.0;
        s.closes[40] = 55.0;
        let out = detect_continuation(&s.view(), Trend::Bullish, &AnalysisParams::default()).unwrap();
        assert!(!out.continuation);
        assert!(out.ended);
        assert_eq!(out.reason, "rising swing-low broken");
    }

    #[test]
    fn unconfirmed_new_high_ends_continuation() {
        let mut s = Staircase::rising(40);
        s.rsi[39] = Some(10.0);
        let out = detect_continuation(&s.view(), Trend::Bullish, &AnalysisParams::default()).unwrap();
        assert!(!out.continuation);
        assert!(out.ended);
        assert_eq!(out.reason, "RSI failed to confirm new high");
    }

    #[test]
    fn ema_cross_invalidates() {
        let mut s = Staircase::rising(40);
        s.fast[39] = Some(0.0);
        let out = detect_continuation(&s.view(), Trend::Bullish, &AnalysisParams::default()).unwrap();
        assert!(!out.continuation);
        assert!(out.ended);
        assert_eq!(out.reason, "fast EMA fell below slow EMA");
    }

    #[test]
    fn wrong_trend_is_not_continuation() {
        let s = Staircase::rising(40);
        let out = detect_continuation(&s.view(), Trend::Bearish, &AnalysisParams::default()).unwrap();
        assert!(!out.continuation);
        assert!(!out.ended);
    }

    #[test]
    fn flat_market_lacks_swing_structure() {
        let n = 40;
        let closes = vec![100.0; n];
        let fast = vec![Some(101.0); n];
        let slow = vec![Some(100.0); n];
        let rsi = vec![Some(50.0); n];
        let view = SeriesView {
            closes: &closes,
            highs: &closes,
            lows: &closes,
            ema_fast: &fast,
            ema_slow: &slow,
            rsi: &rsi,
        };
        let out = detect_continuation(&view, Trend::Bullish, &AnalysisParams::default()).unwrap();
        assert!(!out.continuation);
        assert_eq!(out.reason, "insufficient swing structure");
    }

    #[test]
    fn short_series_is_rejected() {
        let s = Staircase::rising(4);
        assert_eq!(
            detect_continuation(&s.view(), Trend::Bullish, &AnalysisParams::default()),
            Err(SignalError::InsufficientData { required: 6, got: 4 })
        );
    }
}
