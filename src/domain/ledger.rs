//! Cash/position ledger shared by the single-asset and unified engines.
//!
//! A `Ledger` exposes the cash balance and the holding of the asset being
//! evaluated. The fill rules (`buy`/`sell`) are provided methods so both
//! engines apply identical semantics; implementors only store state and
//! append records.

use crate::domain::node::{Action, Condition, Modifier, NodeSource, Trigger};
use crate::domain::position::Holding;
use crate::ports::label_port::LabelPort;
use std::fmt;

/// Buys spending less than this are skipped.
pub const MIN_TRADE_VALUE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum EventType {
    Buy,
    Sell,
    SkipBuy,
    SkipSell,
}

impl EventType {
    pub fn is_skip(&self) -> bool {
        matches!(self, EventType::SkipBuy | EventType::SkipSell)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Buy => "buy",
            EventType::Sell => "sell",
            EventType::SkipBuy => "skip_buy",
            EventType::SkipSell => "skip_sell",
        };
        write!(f, "{}", s)
    }
}

/// Why something happened, before it is rendered by a `LabelPort`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reason {
    Trigger {
        trigger: Trigger,
        close: f64,
        change_percent: f64,
    },
    Condition {
        condition: Condition,
        value: f64,
    },
    Action {
        action: Action,
    },
    Modifier {
        modifier: Modifier,
        entry_price: f64,
        peak_price: f64,
        close: f64,
    },
    InsufficientCash {
        requested: f64,
        available: f64,
    },
    NoPosition {
        requested: f64,
    },
    BuyAndHold,
    EvenSplit {
        assets: usize,
    },
}

/// Rendered reason plus the preset that produced the node, if any.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attribution {
    pub reason: String,
    pub source: Option<NodeSource>,
}

/// One action attempt as handed to `Ledger::record`.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub event: EventType,
    pub price: f64,
    pub units: Option<f64>,
    pub value: Option<f64>,
    pub attribution: Attribution,
}

pub trait Ledger {
    fn cash(&self) -> f64;
    fn set_cash(&mut self, cash: f64);
    fn holding(&self) -> Holding;
    fn set_holding(&mut self, holding: Holding);

    /// Append a record. Called after cash and holding are updated.
    fn record(&mut self, fill: Fill);

    /// Spend `min(requested, cash)` at `price`.
    fn buy(
        &mut self,
        requested: f64,
        price: f64,
        attribution: Attribution,
        labels: &dyn LabelPort,
    ) -> EventType {
        let cash = self.cash();
        let spend = requested.min(cash);
        if spend.is_nan() || spend < MIN_TRADE_VALUE || price <= 0.0 {
            let reason = labels.describe(&Reason::InsufficientCash {
                requested,
                available: cash,
            });
            self.record(Fill {
                event: EventType::SkipBuy,
                price,
                units: None,
                value: Some(requested),
                attribution: Attribution {
                    reason,
                    source: attribution.source,
                },
            });
            return EventType::SkipBuy;
        }

        let units = spend / price;
        let mut holding = self.holding();
        holding.add(units, price);
        self.set_holding(holding);
        self.set_cash(cash - spend);
        self.record(Fill {
            event: EventType::Buy,
            price,
            units: Some(units),
            value: Some(spend),
            attribution,
        });
        EventType::Buy
    }

    /// Sell `min(requested, units held)` at `price`.
    fn sell(
        &mut self,
        requested: f64,
        price: f64,
        attribution: Attribution,
        labels: &dyn LabelPort,
    ) -> EventType {
        let mut holding = self.holding();
        if !holding.is_open() || requested.is_nan() || requested <= 0.0 {
            let reason = labels.describe(&Reason::NoPosition { requested });
            self.record(Fill {
                event: EventType::SkipSell,
                price,
                units: Some(requested),
                value: None,
                attribution: Attribution {
                    reason,
                    source: attribution.source,
                },
            });
            return EventType::SkipSell;
        }

        let units = requested.min(holding.units);
        let proceeds = units * price;
        holding.reduce(units);
        self.set_holding(holding);
        self.set_cash(self.cash() + proceeds);
        self.record(Fill {
            event: EventType::Sell,
            price,
            units: Some(units),
            value: Some(proceeds),
            attribution,
        });
        EventType::Sell
    }
}
