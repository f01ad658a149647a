//! RSI (Relative Strength Index) indicator.
//!
//! Uses Wilder's smoothing for average gain/loss calculation:
//! - First average: simple mean of gains/losses over the first n deltas
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! Warmup: first n values are undefined (need n price changes for the seed).

use super::Series;

pub const DEFAULT_PERIOD: usize = 14;

pub fn rsi(values: &[f64], period: usize) -> Series {
    let mut out: Series = vec![None; values.len()];
    if period == 0 || values.len() <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    for i in (period + 1)..values.len() {
        let change = values[i] - values[i - 1];
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }

    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        (100.0 - (100.0 / (1.0 + avg_gain / avg_loss))).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::warmup_len;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn rsi_warmup_period() {
        let values: Vec<f64> = (1..=15).map(|i| 100.0 + (i % 5) as f64 * 2.0).collect();
        let series = rsi(&values, 14);
        assert_eq!(series.len(), 15);
        assert_eq!(warmup_len(&series), 14);
        assert!(series[14].is_some());
    }

    #[test]
    fn rsi_all_gains_no_losses() {
        let values: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        let series = rsi(&values, 14);
        assert_relative_eq!(series[14].unwrap(), 100.0);
    }

    #[test]
    fn rsi_all_losses_no_gains() {
        let values: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        let series = rsi(&values, 14);
        assert_relative_eq!(series[14].unwrap(), 0.0);
    }

    #[test]
    fn rsi_known_calculation() {
        let values = [
            44.0, 44.25, 44.50, 43.75, 44.50, 44.25, 44.75, 45.25, 45.50, 45.25, 45.50, 46.0,
            46.25, 46.0, 46.50,
        ];
        let series = rsi(&values, 14);
        let value = series[14].unwrap();
        assert!(value > 50.0 && value < 100.0, "RSI should be bullish: {value}");
    }

    #[test]
    fn rsi_short_input_is_all_undefined() {
        assert_eq!(rsi(&[1.0], 14), vec![None]);
        assert!(rsi(&[], 14).is_empty());
        assert_eq!(rsi(&[1.0, 2.0], 0), vec![None, None]);
    }

    proptest! {
        #[test]
        fn rsi_stays_in_range(values in prop::collection::vec(1.0f64..10_000.0, 0..120)) {
            for value in rsi(&values, DEFAULT_PERIOD).into_iter().flatten() {
                prop_assert!((0.0..=100.0).contains(&value));
            }
        }

        #[test]
        fn rsi_length_and_warmup(values in prop::collection::vec(1.0f64..500.0, 15..80), period in 1usize..15) {
            let series = rsi(&values, period);
            prop_assert_eq!(series.len(), values.len());
            prop_assert_eq!(warmup_len(&series), period);
        }
    }
}
