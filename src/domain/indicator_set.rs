//! Per-asset precomputed indicators consumed by the evaluator.

use crate::domain::bar::{closes, volumes, Bar};
use crate::domain::indicator::{
    atr, average_true_range, average_volume, bollinger, bollinger_bands, ema, macd, percent_change,
    rsi, sma, volume, BollingerBands, Macd, MaKey, MaKind, Series,
};
use crate::domain::node::IndicatorRequirements;
use std::collections::HashMap;

/// The standard series are always present. Strategy-specific moving averages
/// and the optional Bollinger, MACD and ATR series are computed only when
/// requested.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSet {
    pub sma20: Series,
    pub sma50: Series,
    pub ema20: Series,
    pub rsi14: Series,
    pub avg_volume20: Series,
    pub price_change: Vec<f64>,
    pub moving_averages: HashMap<MaKey, Series>,
    pub bollinger: Option<BollingerBands>,
    pub macd: Option<Macd>,
    pub atr14: Option<Series>,
}

impl IndicatorSet {
    pub fn compute(bars: &[Bar], requirements: &IndicatorRequirements) -> Self {
        let close = closes(bars);
        let volume_series = volumes(bars);

        let moving_averages = requirements
            .moving_averages
            .iter()
            .filter(|key| !is_standard(key))
            .map(|key| (*key, key.compute(&close)))
            .collect();

        IndicatorSet {
            sma20: sma(&close, 20),
            sma50: sma(&close, 50),
            ema20: ema(&close, 20),
            rsi14: rsi(&close, rsi::DEFAULT_PERIOD),
            avg_volume20: average_volume(&volume_series, volume::DEFAULT_VOLUME_PERIOD),
            price_change: percent_change(&close),
            moving_averages,
            bollinger: requirements.bollinger.then(|| {
                bollinger_bands(
                    &close,
                    bollinger::DEFAULT_PERIOD,
                    bollinger::DEFAULT_MULTIPLIER,
                )
            }),
            macd: requirements.macd.then(|| {
                macd(
                    &close,
                    macd::DEFAULT_FAST,
                    macd::DEFAULT_SLOW,
                    macd::DEFAULT_SIGNAL,
                )
            }),
            atr14: requirements
                .atr
                .then(|| average_true_range(bars, atr::DEFAULT_PERIOD)),
        }
    }

    /// Series for a moving average, resolving the standard ones to their fields.
    pub fn moving_average(&self, key: &MaKey) -> Option<&Series> {
        match (key.kind, key.period) {
            (MaKind::Sma, 20) => Some(&self.sma20),
            (MaKind::Sma, 50) => Some(&self.sma50),
            (MaKind::Ema, 20) => Some(&self.ema20),
            _ => self.moving_averages.get(key),
        }
    }
}

fn is_standard(key: &MaKey) -> bool {
    matches!(
        (key.kind, key.period),
        (MaKind::Sma, 20) | (MaKind::Sma, 50) | (MaKind::Ema, 20)
    )
}
