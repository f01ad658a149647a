//! MACD (Moving Average Convergence Divergence) indicator.
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) over the defined portion of the MACD line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9
//! Warmup: the line is defined from max(fast, slow) - 1, the signal and
//! histogram another (signal - 1) values later.

use super::{ema, Series};

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    pub line: Series,
    pub signal: Series,
    pub histogram: Series,
}

pub fn macd(values: &[f64], fast: usize, slow: usize, signal_period: usize) -> Macd {
    let ema_fast = ema(values, fast);
    let ema_slow = ema(values, slow);

    let line: Series = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();

    let mut signal: Series = vec![None; values.len()];
    if let Some(start) = line.iter().position(Option::is_some) {
        let defined: Vec<f64> = line[start..].iter().map(|v| v.unwrap_or(0.0)).collect();
        for (offset, value) in ema(&defined, signal_period).into_iter().enumerate() {
            signal[start + offset] = value;
        }
    }

    let histogram = line
        .iter()
        .zip(&signal)
        .map(|(l, s)| match (l, s) {
            (Some(l), Some(s)) => Some(l - s),
            _ => None,
        })
        .collect();

    Macd {
        line,
        signal,
        histogram,
    }
}

pub fn macd_default(values: &[f64]) -> Macd {
    macd(values, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::warmup_len;
    use approx::assert_relative_eq;

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn macd_warmup_lengths() {
        let result = macd(&ramp(40), 3, 5, 4);
        assert_eq!(result.line.len(), 40);
        assert_eq!(warmup_len(&result.line), 4);
        assert_eq!(warmup_len(&result.signal), 4 + 3);
        assert_eq!(warmup_len(&result.histogram), 4 + 3);
    }

    #[test]
    fn macd_line_is_ema_difference() {
        let values = ramp(30);
        let result = macd(&values, 3, 5, 4);
        let fast = ema(&values, 3);
        let slow = ema(&values, 5);
        for i in 4..30 {
            assert_relative_eq!(result.line[i].unwrap(), fast[i].unwrap() - slow[i].unwrap());
        }
    }

    #[test]
    fn macd_histogram_is_line_minus_signal() {
        let values: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let result = macd_default(&values);
        for i in 0..values.len() {
            if let (Some(l), Some(s), Some(h)) = (result.line[i], result.signal[i], result.histogram[i]) {
                assert_relative_eq!(h, l - s);
            }
        }
    }

    #[test]
    fn macd_constant_prices_are_zero() {
        let result = macd_default(&[50.0; 40]);
        for value in result.histogram.iter().flatten() {
            assert_relative_eq!(*value, 0.0);
        }
    }

    #[test]
    fn macd_too_short_is_undefined() {
        let result = macd_default(&ramp(10));
        assert!(result.line.iter().all(Option::is_none));
        assert!(result.signal.iter().all(Option::is_none));
    }
}
