// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators the signal engine
// consumes.  Every series is index-aligned with its input: element `i` only
// describes inputs `[0..=i]`, and warm-up positions are `None` rather than a
// zero or NaN sentinel.

pub mod ema;
pub mod macd;
pub mod rsi;

pub use ema::{calculate_ema, calculate_ema_first_seed};
pub use macd::{calculate_macd, MacdSeries};
pub use rsi::calculate_rsi;

/// An indicator series right-aligned with the candle series it was computed
/// from. `None` marks an index where the indicator is not yet defined.
pub type IndicatorSeries = Vec<Option<f64>>;

/// Value at `idx`, flattening out-of-range and undefined positions.
pub fn value_at(series: &[Option<f64>], idx: usize) -> Option<f64> {
    series.get(idx).copied().flatten()
}
