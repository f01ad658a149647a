//! Shared-cash portfolio state for unified multi-asset runs.

use chrono::NaiveDate;
use std::collections::BTreeMap;

use super::ledger::{EventType, Fill, Ledger};
use super::node::NodeSource;
use super::position::Holding;

/// One action attempt with the full portfolio state after it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortfolioEvent {
    pub date: NaiveDate,
    pub symbol: String,
    pub event_type: EventType,
    pub price: f64,
    pub units: Option<f64>,
    pub value: Option<f64>,
    pub reason: String,
    pub source: Option<NodeSource>,
    pub cash_after: f64,
    pub positions_after: BTreeMap<String, f64>,
    pub portfolio_value_after: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedPortfolioState {
    pub cash: f64,
    pub holdings: BTreeMap<String, Holding>,
    /// Latest known close per symbol, used for valuation.
    pub last_prices: BTreeMap<String, f64>,
    pub events: Vec<PortfolioEvent>,
}

impl UnifiedPortfolioState {
    pub fn new(initial_cash: f64) -> Self {
        UnifiedPortfolioState {
            cash: initial_cash,
            holdings: BTreeMap::new(),
            last_prices: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    pub fn holding(&self, symbol: &str) -> Holding {
        self.holdings.get(symbol).copied().unwrap_or_default()
    }

    /// Record the latest close of `symbol`.
    pub fn mark(&mut self, symbol: &str, close: f64) {
        self.last_prices.insert(symbol.to_string(), close);
    }

    pub fn total_value(&self) -> f64 {
        let position_value: f64 = self
            .holdings
            .iter()
            .filter_map(|(symbol, holding)| {
                self.last_prices
                    .get(symbol)
                    .map(|&price| holding.market_value(price))
            })
            .sum();
        self.cash + position_value
    }

    /// Units held per symbol, open positions only.
    pub fn positions_snapshot(&self) -> BTreeMap<String, f64> {
        self.holdings
            .iter()
            .filter(|(_, h)| h.is_open())
            .map(|(symbol, h)| (symbol.clone(), h.units))
            .collect()
    }

    /// Ledger view scoped to one symbol on one date.
    pub fn ledger_for<'a>(&'a mut self, symbol: &'a str, date: NaiveDate) -> AssetLedger<'a> {
        AssetLedger {
            state: self,
            symbol,
            date,
        }
    }
}

pub struct AssetLedger<'a> {
    state: &'a mut UnifiedPortfolioState,
    symbol: &'a str,
    date: NaiveDate,
}

impl Ledger for AssetLedger<'_> {
    fn cash(&self) -> f64 {
        self.state.cash
    }

    fn set_cash(&mut self, cash: f64) {
        self.state.cash = cash;
    }

    fn holding(&self) -> Holding {
        self.state.holding(self.symbol)
    }

    fn set_holding(&mut self, holding: Holding) {
        self.state.holdings.insert(self.symbol.to_string(), holding);
    }

    fn record(&mut self, fill: Fill) {
        let event = PortfolioEvent {
            date: self.date,
            symbol: self.symbol.to_string(),
            event_type: fill.event,
            price: fill.price,
            units: fill.units,
            value: fill.value,
            reason: fill.attribution.reason,
            source: fill.attribution.source,
            cash_after: self.state.cash,
            positions_after: self.state.positions_snapshot(),
            portfolio_value_after: self.state.total_value(),
        };
        self.state.events.push(event);
    }
}
