// =============================================================================
// MACD — Moving Average Convergence Divergence
// =============================================================================
//
//   macd_line   = EMA(values, 12) - EMA(values, 26)
//   signal_line = EMA(macd_line, 9)
//   histogram   = macd_line - signal_line
//
// All three EMAs use the first-value seed, so every line is defined from
// index 0 once the input holds at least `SLOW_PERIOD` values.
// =============================================================================

use super::ema::calculate_ema_first_seed;
use super::IndicatorSeries;

pub const FAST_PERIOD: usize = 12;
pub const SLOW_PERIOD: usize = 26;
pub const SIGNAL_PERIOD: usize = 9;

/// The three MACD lines, each index-aligned with the input.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub macd_line: IndicatorSeries,
    pub signal_line: IndicatorSeries,
    pub histogram: IndicatorSeries,
}

/// Compute MACD(12, 26, 9).
///
/// Inputs shorter than [`SLOW_PERIOD`] produce all-`None` lines: the slow EMA
/// has not seen a full period and the histogram would be noise.
pub fn calculate_macd(values: &[f64]) -> MacdSeries {
    let undefined = || vec![None; values.len()];
    if values.len() < SLOW_PERIOD {
        return MacdSeries {
            macd_line: undefined(),
            signal_line: undefined(),
            histogram: undefined(),
        };
    }

    let fast = calculate_ema_first_seed(values, FAST_PERIOD);
    let slow = calculate_ema_first_seed(values, SLOW_PERIOD);
    let macd_line: IndicatorSeries = fast
        .iter()
        .zip(&slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    // The signal EMA runs over the defined prefix of the MACD line.
    let defined = macd_line.iter().take_while(|v| v.is_some()).count();
    let prefix: Vec<f64> = macd_line[..defined].iter().flatten().copied().collect();
    let mut signal_line = calculate_ema_first_seed(&prefix, SIGNAL_PERIOD);
    signal_line.resize(values.len(), None);

    let histogram = macd_line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    MacdSeries {
        macd_line,
        signal_line,
        histogram,
    }
}
