// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = value_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// Two seeding strategies live here and are NOT interchangeable:
//   - `calculate_ema`            seeds index `period - 1` with the SMA of the
//                                first `period` values (trend EMAs 14 / 70).
//   - `calculate_ema_first_seed` seeds index 0 with the first value and is
//                                defined everywhere (MACD lines).
// =============================================================================

use super::IndicatorSeries;

fn multiplier(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// Compute the SMA-seeded EMA series for `values` and look-back `period`.
///
/// The output has the same length as `values`. Indices before `period - 1`
/// are `None`.
///
/// # Edge cases
/// - `period == 0` or `values.len() < period` => all-`None` series
/// - A non-finite intermediate value ends the series; later indices stay `None`.
pub fn calculate_ema(values: &[f64], period: usize) -> IndicatorSeries {
    let mut result = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return result;
    }

    let sma: f64 = values[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return result;
    }
    result[period - 1] = Some(sma);

    let k = multiplier(period);
    let mut prev = sma;
    for (i, &value) in values.iter().enumerate().skip(period) {
        let ema = value * k + prev * (1.0 - k);
        if !ema.is_finite() {
            break;
        }
        result[i] = Some(ema);
        prev = ema;
    }

    result
}

/// EMA seeded with the first value rather than an SMA.
///
/// Every index is defined (index 0 equals `values[0]`), which makes the series
/// converge differently from [`calculate_ema`] during warm-up.
///
/// # Edge cases
/// - `period == 0` => all-`None` series
/// - Empty input => empty series
/// - A non-finite intermediate value ends the series.
pub fn calculate_ema_first_seed(values: &[f64], period: usize) -> IndicatorSeries {
    let mut result = vec![None; values.len()];
    if period == 0 || values.is_empty() || !values[0].is_finite() {
        return result;
    }

    let k = multiplier(period);
    let mut prev = values[0];
    result[0] = Some(prev);
    for (i, &value) in values.iter().enumerate().skip(1) {
        let ema = value * k + prev * (1.0 - k);
        if !ema.is_finite() {
            break;
        }
        result[i] = Some(ema);
        prev = ema;
    }

    result
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    // ---- calculate_ema ---------------------------------------------------

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 5).is_empty());
    }

    #[test]
    fn ema_period_zero_is_undefined() {
        assert_eq!(calculate_ema(&[1.0, 2.0, 3.0], 0), vec![None, None, None]);
    }

    #[test]
    fn ema_insufficient_data_is_all_undefined() {
        let ema = calculate_ema(&[1.0, 2.0], 5);
        assert_eq!(ema.len(), 2);
        assert!(ema.iter().all(Option::is_none));
    }

    #[test]
    fn ema_seed_is_mean_of_first_period() {
        let data = [3.0, 9.0, 4.0, 8.0, 1.0, 6.0, 2.0];
        let ema = calculate_ema(&data, 4);
        assert!(ema[..3].iter().all(Option::is_none));
        let mean = (3.0 + 9.0 + 4.0 + 8.0) / 4.0;
        assert!((ema[3].unwrap() - mean).abs() < 1e-12);
    }

    #[test]
    fn ema_constant_input_stays_constant() {
        let data = vec![42.5; 90];
        for period in [14, 70] {
            let ema = calculate_ema(&data, period);
            for v in ema.iter().skip(period - 1) {
                assert!((v.unwrap() - 42.5).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn ema_known_values() {
        // 5-period EMA of [1..=10]: SMA seed 3.0, multiplier 1/3.
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let ema = calculate_ema(&closes, 5);
        assert_eq!(ema.len(), 10);

        let mult = 2.0 / 6.0;
        let mut expected = 3.0;
        assert!((ema[4].unwrap() - expected).abs() < 1e-10);
        for (i, &c) in closes.iter().enumerate().skip(5) {
            expected = c * mult + expected * (1.0 - mult);
            assert!((ema[i].unwrap() - expected).abs() < 1e-10, "index {i}");
        }
    }

    #[test]
    fn ema_14_and_70_are_independent() {
        let closes: Vec<f64> = (0..120).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let ema14 = calculate_ema(&closes, 14);
        let ema70 = calculate_ema(&closes, 70);
        assert_eq!(ema14.iter().filter(|v| v.is_some()).count(), 120 - 13);
        assert_eq!(ema70.iter().filter(|v| v.is_some()).count(), 120 - 69);
        assert_eq!(calculate_ema(&closes, 14), ema14);
    }

    #[test]
    fn ema_stops_on_nan() {
        let closes = vec![1.0, 2.0, 3.0, f64::NAN, 5.0];
        let ema = calculate_ema(&closes, 3);
        assert_eq!(ema[2], Some(2.0));
        assert_eq!(ema[3], None);
        assert_eq!(ema[4], None);
    }

    // ---- calculate_ema_first_seed ----------------------------------------

    #[test]
    fn first_seed_is_defined_from_index_zero() {
        let ema = calculate_ema_first_seed(&[10.0, 20.0, 30.0], 3);
        assert_eq!(ema[0], Some(10.0));
        // k = 0.5
        assert!((ema[1].unwrap() - 15.0).abs() < 1e-12);
        assert!((ema[2].unwrap() - 22.5).abs() < 1e-12);
    }

    #[test]
    fn first_seed_differs_from_sma_seed() {
        let data = [10.0, 20.0, 30.0, 40.0];
        let sma_seeded = calculate_ema(&data, 3);
        let first_seeded = calculate_ema_first_seed(&data, 3);
        // SMA seed at index 2 is 20.0; first-value seed has converged to 22.5.
        assert!((sma_seeded[2].unwrap() - 20.0).abs() < 1e-12);
        assert!((first_seeded[2].unwrap() - 22.5).abs() < 1e-12);
    }

    #[test]
    fn first_seed_constant_input() {
        let ema = calculate_ema_first_seed(&[7.0; 30], 9);
        assert!(ema.iter().all(|v| (v.unwrap() - 7.0).abs() < 1e-12));
    }

    #[test]
    fn first_seed_degenerate_inputs() {
        assert!(calculate_ema_first_seed(&[], 9).is_empty());
        assert_eq!(calculate_ema_first_seed(&[1.0, 2.0], 0), vec![None, None]);
    }
}
