//! Bollinger Bands indicator.
//!
//! Bollinger Bands consist of:
//! - Middle: Simple Moving Average (SMA) over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! Where StdDev is population standard deviation (divides by N, not N-1).
//!
//! Default parameters: period=20, multiplier=2.0
//! Warmup: first (period-1) values are undefined.

use super::stddev::rolling_stddev;
use super::{sma, Series};

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Series,
    pub middle: Series,
    pub lower: Series,
}

pub fn bollinger_bands(values: &[f64], period: usize, multiplier: f64) -> BollingerBands {
    let middle = sma(values, period);
    let deviation = rolling_stddev(values, period);

    let (upper, lower) = middle
        .iter()
        .zip(&deviation)
        .map(|(m, d)| match (m, d) {
            (Some(m), Some(d)) => (Some(m + multiplier * d), Some(m - multiplier * d)),
            _ => (None, None),
        })
        .unzip();

    BollingerBands {
        upper,
        middle,
        lower,
    }
}
