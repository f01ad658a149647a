//! Single-asset simulation engine.
//!
//! One engine holds the price history of one symbol. Each run owns a fresh
//! `SingleAssetState`; nothing is shared between runs, so the optimizer can
//! reuse one engine for every candidate.

use crate::domain::bar::Bar;
use crate::domain::error::StratlabError;
use crate::domain::evaluator::{evaluate_bar, EvalContext};
use crate::domain::indicator_set::IndicatorSet;
use crate::domain::ledger::{Attribution, EventType, Fill, Ledger, Reason};
use crate::domain::metrics::{compute_drawdown, EquityPoint};
use crate::domain::node::{collect_modifiers, extract_requirements, NodeSource, StrategyNode};
use crate::domain::position::Holding;
use crate::ports::label_port::LabelPort;
use chrono::NaiveDate;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Transaction {
    pub date: NaiveDate,
    pub event_type: EventType,
    pub price: f64,
    pub units: Option<f64>,
    pub value: Option<f64>,
    pub reason: String,
    pub source: Option<NodeSource>,
    pub cash_after: f64,
    pub position_after: f64,
}

/// Ledger of one single-asset run.
#[derive(Debug, Clone)]
pub struct SingleAssetState {
    pub cash: f64,
    pub holding: Holding,
    pub transactions: Vec<Transaction>,
    date: NaiveDate,
}

impl SingleAssetState {
    pub fn new(cash: f64) -> Self {
        SingleAssetState {
            cash,
            holding: Holding::default(),
            transactions: Vec::new(),
            date: NaiveDate::MIN,
        }
    }

    /// Date stamped on records appended from now on.
    pub fn set_date(&mut self, date: NaiveDate) {
        self.date = date;
    }

    pub fn value(&self, price: f64) -> f64 {
        self.cash + self.holding.market_value(price)
    }
}

impl Ledger for SingleAssetState {
    fn cash(&self) -> f64 {
        self.cash
    }

    fn set_cash(&mut self, cash: f64) {
        self.cash = cash;
    }

    fn holding(&self) -> Holding {
        self.holding
    }

    fn set_holding(&mut self, holding: Holding) {
        self.holding = holding;
    }

    fn record(&mut self, fill: Fill) {
        self.transactions.push(Transaction {
            date: self.date,
            event_type: fill.event,
            price: fill.price,
            units: fill.units,
            value: fill.value,
            reason: fill.attribution.reason,
            source: fill.attribution.source,
            cash_after: self.cash,
            position_after: self.holding.units,
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SimulationResult {
    pub symbol: String,
    pub initial_value: f64,
    pub final_value: f64,
    pub profit: f64,
    pub profit_percentage: f64,
    pub transactions: Vec<Transaction>,
    pub equity_curve: Vec<EquityPoint>,
    pub max_drawdown: f64,
    pub buys: usize,
    pub sells: usize,
}

impl SimulationResult {
    pub fn skipped(&self) -> usize {
        self.transactions
            .iter()
            .filter(|t| t.event_type.is_skip())
            .count()
    }
}

pub struct SimulationEngine<'a> {
    symbol: String,
    bars: Option<Vec<Bar>>,
    labels: &'a dyn LabelPort,
}

impl<'a> SimulationEngine<'a> {
    pub fn new(symbol: impl Into<String>, labels: &'a dyn LabelPort) -> Self {
        SimulationEngine {
            symbol: symbol.into(),
            bars: None,
            labels,
        }
    }

    /// Replace the price history. Bars are sorted ascending by date.
    pub fn load_prices(&mut self, mut bars: Vec<Bar>) {
        bars.sort_by_key(|b| b.date);
        self.bars = if bars.is_empty() { None } else { Some(bars) };
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> Option<&[Bar]> {
        self.bars.as_deref()
    }

    pub fn labels(&self) -> &'a dyn LabelPort {
        self.labels
    }

    fn require_bars(&self) -> Result<&[Bar], StratlabError> {
        self.bars().ok_or(StratlabError::NoPriceData)
    }

    /// Walk the strategy over every bar, starting with `investment` in cash.
    pub fn run_simulation(
        &self,
        investment: f64,
        nodes: &[StrategyNode],
    ) -> Result<SimulationResult, StratlabError> {
        let bars = self.require_bars()?;
        let indicators = IndicatorSet::compute(bars, &extract_requirements(nodes));
        let modifiers = collect_modifiers(nodes);

        let mut state = SingleAssetState::new(investment);
        let mut equity_curve = Vec::with_capacity(bars.len());
        for (index, bar) in bars.iter().enumerate() {
            state.set_date(bar.date);
            let ctx = EvalContext {
                bars,
                indicators: &indicators,
                index,
                labels: self.labels,
            };
            evaluate_bar(nodes, &modifiers, &ctx, &mut state);
            equity_curve.push(EquityPoint {
                date: bar.date,
                value: state.value(bar.close),
            });
        }

        self.finish(investment, state, equity_curve)
    }

    /// Spend all of `investment` on the first bar and hold to the last.
    pub fn run_buy_and_hold(&self, investment: f64) -> Result<SimulationResult, StratlabError> {
        let bars = self.require_bars()?;
        let mut state = SingleAssetState::new(investment);
        let mut equity_curve = Vec::with_capacity(bars.len());
        for (index, bar) in bars.iter().enumerate() {
            state.set_date(bar.date);
            if index == 0 {
                let attribution = Attribution {
                    reason: self.labels.describe(&Reason::BuyAndHold),
                    source: None,
                };
                state.buy(investment, bar.close, attribution, self.labels);
            }
            equity_curve.push(EquityPoint {
                date: bar.date,
                value: state.value(bar.close),
            });
        }

        self.finish(investment, state, equity_curve)
    }

    fn finish(
        &self,
        investment: f64,
        state: SingleAssetState,
        equity_curve: Vec<EquityPoint>,
    ) -> Result<SimulationResult, StratlabError> {
        let last_close = self.bars().and_then(|b| b.last()).map_or(0.0, |b| b.close);
        let final_value = state.value(last_close);
        if !final_value.is_finite() {
            return Err(StratlabError::NonFiniteResult { value: final_value });
        }

        let profit = final_value - investment;
        let profit_percentage = if investment > 0.0 {
            profit / investment * 100.0
        } else {
            0.0
        };
        let count = |event: EventType| {
            state
                .transactions
                .iter()
                .filter(|t| t.event_type == event)
                .count()
        };
        let buys = count(EventType::Buy);
        let sells = count(EventType::Sell);
        let max_drawdown = compute_drawdown(&equity_curve).max_percent;

        debug!(
            symbol = %self.symbol,
            bars = equity_curve.len(),
            transactions = state.transactions.len(),
            final_value,
            "simulation complete"
        );

        Ok(SimulationResult {
            symbol: self.symbol.clone(),
            initial_value: investment,
            final_value,
            profit,
            profit_percentage,
            transactions: state.transactions,
            equity_curve,
            max_drawdown,
            buys,
            sells,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::english_labels::EnglishLabels;
    use crate::domain::node_parser::parse;
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn bars_from(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                date: start + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 500.0,
            })
            .collect()
    }

    fn engine(closes: &[f64]) -> SimulationEngine<'static> {
        let mut engine = SimulationEngine::new("TEST", &EnglishLabels);
        engine.load_prices(bars_from(closes));
        engine
    }

    #[test]
    fn no_price_data_is_precondition_error() {
        let engine = SimulationEngine::new("TEST", &EnglishLabels);
        assert!(matches!(
            engine.run_simulation(1000.0, &[]),
            Err(StratlabError::NoPriceData)
        ));
        assert!(matches!(
            engine.run_buy_and_hold(1000.0),
            Err(StratlabError::NoPriceData)
        ));
    }

    #[test]
    fn buy_and_hold_profit() {
        let result = engine(&[100.0, 198.0]).run_buy_and_hold(10_000.0).unwrap();
        assert_relative_eq!(result.final_value, 19_800.0);
        assert_relative_eq!(result.profit_percentage, 98.0, epsilon = 1e-9);
        assert_eq!(result.buys, 1);
        assert_eq!(result.transactions[0].reason, "Buy and hold");
    }

    #[test]
    fn empty_strategy_keeps_cash() {
        let result = engine(&[100.0, 50.0, 300.0])
            .run_simulation(10_000.0, &[])
            .unwrap();
        assert!(result.transactions.is_empty());
        assert_relative_eq!(result.final_value, 10_000.0);
        assert_relative_eq!(result.profit_percentage, 0.0);
        assert_relative_eq!(result.max_drawdown, 0.0);
    }

    #[test]
    fn round_trip_through_strategy() {
        let nodes =
            parse("ON_FIRST_DAY { BUY_PERCENT(50) }, IF_PRICE_RISES(10) { SELL_PERCENT(100) }")
                .unwrap();
        let result = engine(&[100.0, 105.0, 120.0, 90.0])
            .run_simulation(1000.0, &nodes)
            .unwrap();
        // 5 units bought at 100, sold at 120 on the +14.3% bar
        assert_eq!(result.buys, 1);
        assert_eq!(result.sells, 1);
        assert_relative_eq!(result.final_value, 1100.0);
        assert_relative_eq!(result.profit, 100.0);
        assert_eq!(result.equity_curve.len(), 4);
        let sell = &result.transactions[1];
        assert_relative_eq!(sell.cash_after, 1100.0);
        assert_relative_eq!(sell.position_after, 0.0);
    }

    #[test]
    fn equity_curve_and_drawdown() {
        let result = engine(&[100.0, 50.0, 100.0])
            .run_buy_and_hold(1000.0)
            .unwrap();
        let values: Vec<f64> = result.equity_curve.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![1000.0, 500.0, 1000.0]);
        assert_relative_eq!(result.max_drawdown, 50.0);
    }

    #[test]
    fn skips_are_counted_separately() {
        let nodes = parse("SELL(1)").unwrap();
        let result = engine(&[10.0, 11.0]).run_simulation(100.0, &nodes).unwrap();
        assert_eq!(result.buys, 0);
        assert_eq!(result.sells, 0);
        assert_eq!(result.skipped(), 2);
    }

    #[test]
    fn non_finite_final_value_is_error() {
        let result = engine(&[1.0, f64::MAX]).run_buy_and_hold(10_000.0);
        assert!(matches!(
            result,
            Err(StratlabError::NonFiniteResult { .. })
        ));
    }

    #[test]
    fn load_prices_sorts_and_treats_empty_as_missing() {
        let mut engine = SimulationEngine::new("TEST", &EnglishLabels);
        let mut bars = bars_from(&[1.0, 2.0, 3.0]);
        bars.reverse();
        engine.load_prices(bars);
        let loaded = engine.bars().unwrap();
        assert!(loaded.windows(2).all(|w| w[0].date < w[1].date));

        engine.load_prices(Vec::new());
        assert!(engine.bars().is_none());
    }
}
