//! Technical indicator implementations.
//!
//! Every indicator is a pure function over a price or volume sequence and
//! returns a series of the same length as its input. Warmup entries are
//! `None`; an indicator never reports zero for a value it could not compute.
//!
//! - `Series`: the output shape shared by all single-line indicators
//! - `MaKey`: moving-average identity (kind + period), used as a `HashMap` key

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stddev;
pub mod volume;

pub use atr::average_true_range;
pub use bollinger::{bollinger_bands, BollingerBands};
pub use ema::ema;
pub use macd::{macd, Macd};
pub use rsi::rsi;
pub use sma::sma;
pub use volume::{average_volume, percent_change};

use std::fmt;

pub type Series = Vec<Option<f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MaKind {
    Sma,
    Ema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MaKey {
    pub kind: MaKind,
    pub period: usize,
}

impl MaKey {
    pub fn sma(period: usize) -> Self {
        MaKey {
            kind: MaKind::Sma,
            period,
        }
    }

    pub fn ema(period: usize) -> Self {
        MaKey {
            kind: MaKind::Ema,
            period,
        }
    }

    pub fn compute(&self, closes: &[f64]) -> Series {
        match self.kind {
            MaKind::Sma => sma(closes, self.period),
            MaKind::Ema => ema(closes, self.period),
        }
    }
}

impl fmt::Display for MaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaKind::Sma => write!(f, "sma"),
            MaKind::Ema => write!(f, "ema"),
        }
    }
}

impl fmt::Display for MaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind, self.period)
    }
}

/// Number of `None` entries before the first defined value.
pub fn warmup_len(series: &[Option<f64>]) -> usize {
    series.iter().take_while(|v| v.is_none()).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ma_key_display_matches_cache_key_format() {
        assert_eq!(MaKey::sma(50).to_string(), "sma_50");
        assert_eq!(MaKey::ema(9).to_string(), "ema_9");
    }

    #[test]
    fn ma_key_hash_eq() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(MaKey::sma(20), "sma20_series".to_string());
        map.insert(MaKey::ema(20), "ema20_series".to_string());

        assert_eq!(map.get(&MaKey::sma(20)), Some(&"sma20_series".to_string()));
        assert_eq!(map.get(&MaKey::ema(20)), Some(&"ema20_series".to_string()));
        assert_eq!(map.get(&MaKey::sma(50)), None);
    }

    #[test]
    fn ma_key_compute_dispatches_on_kind() {
        let closes = [10.0, 20.0, 30.0, 40.0];
        assert_eq!(MaKey::sma(2).compute(&closes), sma(&closes, 2));
        assert_eq!(MaKey::ema(2).compute(&closes), ema(&closes, 2));
    }

    #[test]
    fn warmup_len_counts_leading_none() {
        assert_eq!(warmup_len(&[None, None, Some(1.0), None]), 2);
        assert_eq!(warmup_len(&[]), 0);
    }
}
