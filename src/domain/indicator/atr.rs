//! Average True Range (Wilder smoothing).
//!
//! TR[0] = high - low, TR[i] = max(high - low, |high - C[i-1]|, |low - C[i-1]|).
//! Seed ATR at (n-1) with the mean of the first n true ranges, then
//! ATR[i] = (ATR[i-1] * (n-1) + TR[i]) / n.

use super::Series;
use crate::domain::bar::Bar;

pub const DEFAULT_PERIOD: usize = 14;

pub fn average_true_range(bars: &[Bar], period: usize) -> Series {
    let mut out: Series = vec![None; bars.len()];
    if period == 0 || bars.len() < period {
        return out;
    }

    let true_ranges: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.high - bar.low
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect();

    let mut atr = true_ranges[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(atr);

    for i in period..bars.len() {
        atr = (atr * (period - 1) as f64 + true_ranges[i]) / period as f64;
        out[i] = Some(atr);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn make_bar(day: u32, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn atr_warmup() {
        let bars: Vec<Bar> = (1..=5).map(|d| make_bar(d, 110.0, 90.0, 100.0)).collect();
        let series = average_true_range(&bars, 3);
        assert_eq!(series.len(), 5);
        assert!(series[1].is_none());
        assert!(series[2].is_some());
    }

    #[test]
    fn atr_seed_is_average() {
        let bars = vec![
            make_bar(1, 110.0, 100.0, 105.0),
            make_bar(2, 115.0, 105.0, 110.0),
            make_bar(3, 120.0, 110.0, 115.0),
        ];
        // TR = 10, max(10, 10, 0) = 10, max(10, 10, 0) = 10
        let series = average_true_range(&bars, 3);
        assert_relative_eq!(series[2].unwrap(), 10.0);
    }

    #[test]
    fn atr_wilder_smoothing() {
        let bars = vec![
            make_bar(1, 110.0, 100.0, 105.0),
            make_bar(2, 110.0, 100.0, 105.0),
            make_bar(3, 130.0, 100.0, 125.0),
        ];
        let series = average_true_range(&bars, 2);
        assert_relative_eq!(series[1].unwrap(), 10.0);
        assert_relative_eq!(series[2].unwrap(), (10.0 + 30.0) / 2.0);
    }

    #[test]
    fn atr_too_few_bars() {
        let bars = vec![make_bar(1, 110.0, 100.0, 105.0)];
        assert_eq!(average_true_range(&bars, 3), vec![None]);
    }
}
