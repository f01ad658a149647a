//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seed with the SMA of the first n values, then
//! EMA[i] = (V[i] - EMA[i-1]) * k + EMA[i-1].
//! Warmup: first (n-1) values are undefined.

use super::Series;

pub fn ema(values: &[f64], period: usize) -> Series {
    if period == 0 {
        return vec![None; values.len()];
    }

    let mut out = Vec::with_capacity(values.len());
    let k = 2.0 / (period as f64 + 1.0);
    let mut current = 0.0;
    let mut sum = 0.0;

    for (i, &value) in values.iter().enumerate() {
        if i < period - 1 {
            sum += value;
            out.push(None);
        } else if i == period - 1 {
            sum += value;
            current = sum / period as f64;
            out.push(Some(current));
        } else {
            current = (value - current) * k + current;
            out.push(Some(current));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::{sma, warmup_len};
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn ema_warmup() {
        let series = ema(&[10.0, 20.0, 30.0, 40.0, 50.0], 3);
        assert_eq!(series.len(), 5);
        assert_eq!(warmup_len(&series), 2);
    }

    #[test]
    fn ema_seed_is_sma() {
        let series = ema(&[10.0, 20.0, 30.0], 3);
        assert_relative_eq!(series[2].unwrap(), 20.0);
    }

    #[test]
    fn ema_recursive_calculation() {
        let series = ema(&[10.0, 20.0, 30.0, 40.0, 50.0], 3);

        let k = 2.0 / 4.0;
        let seed = 20.0;
        let ema_3 = (40.0 - seed) * k + seed;
        let ema_4 = (50.0 - ema_3) * k + ema_3;

        assert_relative_eq!(series[3].unwrap(), ema_3);
        assert_relative_eq!(series[4].unwrap(), ema_4);
    }

    #[test]
    fn ema_period_1_tracks_input() {
        let series = ema(&[10.0, 20.0, 30.0], 1);
        assert_eq!(series, vec![Some(10.0), Some(20.0), Some(30.0)]);
    }

    #[test]
    fn ema_reacts_faster_than_sma_to_step() {
        let values = [10.0, 10.0, 10.0, 10.0, 10.0, 20.0, 20.0, 20.0];
        let fast = ema(&values, 3);
        let slow = sma(&values, 3);
        // first bar after the jump
        assert!(fast[5].unwrap() >= slow[5].unwrap());
    }

    #[test]
    fn ema_empty_and_period_0() {
        assert!(ema(&[], 3).is_empty());
        assert_eq!(ema(&[1.0, 2.0], 0), vec![None, None]);
    }

    proptest! {
        #[test]
        fn ema_length_and_warmup(values in prop::collection::vec(1.0f64..1e5, 1..100), period in 1usize..30) {
            let series = ema(&values, period);
            prop_assert_eq!(series.len(), values.len());
            prop_assert_eq!(warmup_len(&series), (period - 1).min(values.len()));
        }
    }
}
