//! Unified multi-asset simulation: one strategy over many assets sharing a
//! single cash pool.

use crate::domain::asset::{build_unified_timeline, Asset};
use crate::domain::error::StratlabError;
use crate::domain::evaluator::{evaluate_bar, EvalContext};
use crate::domain::indicator_set::IndicatorSet;
use crate::domain::ledger::{Attribution, EventType, Ledger, Reason};
use crate::domain::node::{collect_modifiers, extract_requirements, StrategyNode};
use crate::domain::portfolio::{PortfolioEvent, UnifiedPortfolioState};
use crate::ports::label_port::LabelPort;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AssetSummary {
    pub symbol: String,
    pub units: f64,
    pub last_price: f64,
    pub value: f64,
    pub buys: usize,
    pub sells: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UnifiedResult {
    pub initial_cash: f64,
    pub final_cash: f64,
    pub final_value: f64,
    pub profit: f64,
    pub profit_percentage: f64,
    pub events: Vec<PortfolioEvent>,
    pub assets: Vec<AssetSummary>,
}

struct PreparedAsset<'a> {
    asset: &'a Asset,
    date_index: HashMap<NaiveDate, usize>,
    indicators: IndicatorSet,
}

/// Run `nodes` over every asset on the union of their dates.
///
/// On each date the assets are evaluated in the order given, against one
/// shared cash balance: an earlier asset can spend cash that a later asset
/// wanted on the same day. Callers control priority through this order.
///
/// With no nodes the cash is split evenly and each asset is bought on its
/// first bar.
pub fn run_unified_portfolio_simulation(
    assets: &[Asset],
    nodes: &[StrategyNode],
    initial_cash: f64,
    labels: &dyn LabelPort,
) -> Result<UnifiedResult, StratlabError> {
    if assets.is_empty() {
        return Err(StratlabError::NoAssets);
    }
    if nodes.is_empty() {
        return run_even_split(assets, initial_cash, labels);
    }

    let requirements = extract_requirements(nodes);
    let modifiers = collect_modifiers(nodes);
    let prepared: Vec<PreparedAsset<'_>> = assets
        .iter()
        .map(|asset| PreparedAsset {
            asset,
            date_index: asset.date_index(),
            indicators: IndicatorSet::compute(&asset.bars, &requirements),
        })
        .collect();

    let mut state = UnifiedPortfolioState::new(initial_cash);
    for date in build_unified_timeline(assets) {
        for entry in &prepared {
            let Some(&index) = entry.date_index.get(&date) else {
                continue;
            };
            let symbol = entry.asset.symbol.as_str();
            state.mark(symbol, entry.asset.bars[index].close);
            let ctx = EvalContext {
                bars: &entry.asset.bars,
                indicators: &entry.indicators,
                index,
                labels,
            };
            let mut ledger = state.ledger_for(symbol, date);
            evaluate_bar(nodes, &modifiers, &ctx, &mut ledger);
        }
    }

    finish(assets, initial_cash, state)
}

fn run_even_split(
    assets: &[Asset],
    initial_cash: f64,
    labels: &dyn LabelPort,
) -> Result<UnifiedResult, StratlabError> {
    let share = initial_cash / assets.len() as f64;
    let reason = labels.describe(&Reason::EvenSplit {
        assets: assets.len(),
    });

    let indexes: Vec<_> = assets.iter().map(Asset::date_index).collect();
    let mut state = UnifiedPortfolioState::new(initial_cash);
    for date in build_unified_timeline(assets) {
        for (asset, date_index) in assets.iter().zip(&indexes) {
            let Some(&index) = date_index.get(&date) else {
                continue;
            };
            let close = asset.bars[index].close;
            state.mark(&asset.symbol, close);
            if index == 0 {
                let attribution = Attribution {
                    reason: reason.clone(),
                    source: None,
                };
                state
                    .ledger_for(&asset.symbol, date)
                    .buy(share, close, attribution, labels);
            }
        }
    }

    finish(assets, initial_cash, state)
}

fn finish(
    assets: &[Asset],
    initial_cash: f64,
    state: UnifiedPortfolioState,
) -> Result<UnifiedResult, StratlabError> {
    let final_value = state.total_value();
    if !final_value.is_finite() {
        return Err(StratlabError::NonFiniteResult { value: final_value });
    }

    let summaries = assets
        .iter()
        .map(|asset| {
            let holding = state.holding(&asset.symbol);
            let last_price = state
                .last_prices
                .get(&asset.symbol)
                .copied()
                .unwrap_or(0.0);
            let count = |event: EventType| {
                state
                    .events
                    .iter()
                    .filter(|e| e.symbol == asset.symbol && e.event_type == event)
                    .count()
            };
            AssetSummary {
                symbol: asset.symbol.clone(),
                units: holding.units,
                last_price,
                value: holding.market_value(last_price),
                buys: count(EventType::Buy),
                sells: count(EventType::Sell),
                skipped: count(EventType::SkipBuy) + count(EventType::SkipSell),
            }
        })
        .collect();

    let profit = final_value - initial_cash;
    let profit_percentage = if initial_cash > 0.0 {
        profit / initial_cash * 100.0
    } else {
        0.0
    };

    debug!(
        assets = assets.len(),
        events = state.events.len(),
        final_value,
        "unified simulation complete"
    );

    Ok(UnifiedResult {
        initial_cash,
        final_cash: state.cash,
        final_value,
        profit,
        profit_percentage,
        events: state.events,
        assets: summaries,
    })
}
