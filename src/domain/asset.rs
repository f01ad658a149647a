//! Per-asset price data and the unified multi-asset timeline.

use crate::domain::bar::Bar;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

/// Price history of one symbol, sorted ascending by date.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Asset {
    pub symbol: String,
    pub bars: Vec<Bar>,
}

impl Asset {
    pub fn new(symbol: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.date);
        Asset {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    /// Date to bar index lookup.
    pub fn date_index(&self) -> HashMap<NaiveDate, usize> {
        self.bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect()
    }
}

/// Union of all assets' dates, ascending.
pub fn build_unified_timeline(assets: &[Asset]) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = assets
        .iter()
        .flat_map(|asset| asset.bars.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}
