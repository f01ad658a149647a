//! Strategy tree evaluation for one bar.
//!
//! # Evaluation Semantics
//!
//! - Triggers and conditions gate their children: children run only on bars
//!   where the predicate holds. Nesting is an AND.
//! - Actions execute when reached, attributed to the nearest satisfied parent.
//! - Nodes deeper than `MAX_DEPTH` are ignored.
//! - After the trigger walk the peak price is updated with the bar's close,
//!   then modifiers are checked against the open position regardless of any
//!   trigger state. The first modifier that fires liquidates the position.
//! - `IF_MOVING_AVG` and `IF_MACD_CROSS` are crossovers: they require
//!   `index >= 1` and compare the previous bar with the current one.

use crate::domain::bar::Bar;
use crate::domain::indicator::Series;
use crate::domain::indicator_set::IndicatorSet;
use crate::domain::ledger::{Attribution, Ledger, Reason};
use crate::domain::node::{
    Action, Band, Condition, Cross, Modifier, NodeKind, StrategyNode, Trigger, MAX_DEPTH,
};
use crate::ports::label_port::LabelPort;
use chrono::Datelike;

/// Everything the evaluator reads for one bar of one asset.
pub struct EvalContext<'a> {
    pub bars: &'a [Bar],
    pub indicators: &'a IndicatorSet,
    pub index: usize,
    pub labels: &'a dyn LabelPort,
}

impl EvalContext<'_> {
    fn bar(&self) -> &Bar {
        &self.bars[self.index]
    }

    fn close(&self) -> f64 {
        self.bar().close
    }
}

/// Run the trigger walk, the peak update and the modifier walk for one bar.
pub fn evaluate_bar(
    nodes: &[StrategyNode],
    modifiers: &[&StrategyNode],
    ctx: &EvalContext<'_>,
    ledger: &mut dyn Ledger,
) {
    if ctx.index >= ctx.bars.len() {
        return;
    }
    walk(nodes, 0, None, ctx, ledger);

    let mut holding = ledger.holding();
    holding.update_peak(ctx.close());
    ledger.set_holding(holding);

    apply_modifiers(modifiers, ctx, ledger);
}

fn walk(
    nodes: &[StrategyNode],
    depth: usize,
    parent: Option<&Attribution>,
    ctx: &EvalContext<'_>,
    ledger: &mut dyn Ledger,
) {
    if depth > MAX_DEPTH {
        return;
    }
    for node in nodes {
        let reason = match &node.kind {
            NodeKind::Trigger(trigger) => check_trigger(trigger, ctx),
            NodeKind::Condition(condition) => check_condition(condition, ctx),
            NodeKind::Action(action) => {
                let attribution = match parent {
                    Some(a) => Attribution {
                        reason: a.reason.clone(),
                        source: node.source.clone().or_else(|| a.source.clone()),
                    },
                    None => Attribution {
                        reason: ctx.labels.describe(&Reason::Action { action: *action }),
                        source: node.source.clone(),
                    },
                };
                execute_action(action, attribution, ctx, ledger);
                continue;
            }
            NodeKind::Modifier(_) => continue,
        };

        if let Some(reason) = reason {
            let attribution = Attribution {
                reason: ctx.labels.describe(&reason),
                source: node.source.clone(),
            };
            walk(&node.children, depth + 1, Some(&attribution), ctx, ledger);
        }
    }
}

fn execute_action(
    action: &Action,
    attribution: Attribution,
    ctx: &EvalContext<'_>,
    ledger: &mut dyn Ledger,
) {
    let price = ctx.close();
    match *action {
        Action::Buy { amount } => {
            ledger.buy(amount, price, attribution, ctx.labels);
        }
        Action::Sell { units } => {
            ledger.sell(units, price, attribution, ctx.labels);
        }
        Action::BuyPercent { percent } => {
            let amount = ledger.cash() * percent / 100.0;
            ledger.buy(amount, price, attribution, ctx.labels);
        }
        Action::SellPercent { percent } => {
            let units = ledger.holding().units * percent / 100.0;
            ledger.sell(units, price, attribution, ctx.labels);
        }
    }
}

fn apply_modifiers(modifiers: &[&StrategyNode], ctx: &EvalContext<'_>, ledger: &mut dyn Ledger) {
    let close = ctx.close();
    for node in modifiers {
        let NodeKind::Modifier(modifier) = &node.kind else {
            continue;
        };
        let holding = ledger.holding();
        if !holding.is_open() {
            return;
        }
        let fired = match *modifier {
            Modifier::StopLoss { percent } => holding.change_from_entry(close) <= -percent,
            Modifier::TakeProfit { percent } => holding.change_from_entry(close) >= percent,
            Modifier::TrailingStop { percent } => holding.drop_from_peak(close) >= percent,
        };
        if fired {
            let reason = ctx.labels.describe(&Reason::Modifier {
                modifier: *modifier,
                entry_price: holding.entry_price,
                peak_price: holding.peak_price,
                close,
            });
            let attribution = Attribution {
                reason,
                source: node.source.clone(),
            };
            ledger.sell(holding.units, close, attribution, ctx.labels);
            return;
        }
    }
}

fn at(series: &[Option<f64>], index: usize) -> Option<f64> {
    series.get(index).copied().flatten()
}

fn check_trigger(trigger: &Trigger, ctx: &EvalContext<'_>) -> Option<Reason> {
    let close = ctx.close();
    let change = ctx
        .indicators
        .price_change
        .get(ctx.index)
        .copied()
        .unwrap_or(0.0);
    let date = ctx.bar().date;

    let holds = match *trigger {
        Trigger::PriceAbove { price } => close > price,
        Trigger::PriceBelow { price } => close < price,
        Trigger::PriceDrops { percent } => ctx.index > 0 && change <= -percent,
        Trigger::PriceRises { percent } => ctx.index > 0 && change >= percent,
        Trigger::Weekday { day } => date.weekday() == day,
        Trigger::MonthDay { day } => {
            // first bar of the month on or after `day`
            date.day() >= day
                && match ctx.index.checked_sub(1).map(|i| ctx.bars[i].date) {
                    Some(prev) => {
                        prev.year() != date.year()
                            || prev.month() != date.month()
                            || prev.day() < day
                    }
                    None => true,
                }
        }
        Trigger::EveryNDays { days } => days > 0 && ctx.index % days == 0,
        Trigger::FirstDay => ctx.index == 0,
    };

    holds.then_some(Reason::Trigger {
        trigger: *trigger,
        close,
        change_percent: change,
    })
}

fn crossed(series_a: &Series, series_b: &Series, index: usize, direction: Cross) -> Option<f64> {
    if index == 0 {
        return None;
    }
    let (a_curr, b_curr) = (at(series_a, index)?, at(series_b, index)?);
    let (a_prev, b_prev) = (at(series_a, index - 1)?, at(series_b, index - 1)?);
    let hit = match direction {
        Cross::Above => a_curr > b_curr && a_prev <= b_prev,
        Cross::Below => a_curr < b_curr && a_prev >= b_prev,
    };
    hit.then_some(a_curr)
}

fn close_crossed(ma: &Series, ctx: &EvalContext<'_>, direction: Cross) -> Option<f64> {
    let i = ctx.index;
    if i == 0 {
        return None;
    }
    let (ma_curr, ma_prev) = (at(ma, i)?, at(ma, i - 1)?);
    let (curr, prev) = (ctx.bars[i].close, ctx.bars[i - 1].close);
    let hit = match direction {
        Cross::Above => curr > ma_curr && prev <= ma_prev,
        Cross::Below => curr < ma_curr && prev >= ma_prev,
    };
    hit.then_some(ma_curr)
}

fn check_condition(condition: &Condition, ctx: &EvalContext<'_>) -> Option<Reason> {
    let i = ctx.index;
    let ind = ctx.indicators;
    let close = ctx.close();

    let value = match *condition {
        Condition::RsiBelow { threshold } => at(&ind.rsi14, i).filter(|rsi| *rsi < threshold),
        Condition::RsiAbove { threshold } => at(&ind.rsi14, i).filter(|rsi| *rsi > threshold),
        Condition::MovingAverage { average, direction } => ind
            .moving_average(&average)
            .and_then(|ma| close_crossed(ma, ctx, direction)),
        Condition::VolumeSpike { multiplier } => at(&ind.avg_volume20, i)
            .filter(|avg| *avg > 0.0)
            .map(|avg| ctx.bar().volume / avg)
            .filter(|ratio| *ratio > multiplier),
        Condition::Bollinger { band } => ind.bollinger.as_ref().and_then(|bb| match band {
            Band::Lower => at(&bb.lower, i).filter(|lower| close <= *lower),
            Band::Upper => at(&bb.upper, i).filter(|upper| close >= *upper),
        }),
        Condition::MacdCross { direction } => ind
            .macd
            .as_ref()
            .and_then(|m| crossed(&m.line, &m.signal, i, direction)),
        Condition::VolatilityAbove { percent } => ind
            .atr14
            .as_ref()
            .and_then(|atr| at(atr, i))
            .filter(|_| close > 0.0)
            .map(|atr| atr / close * 100.0)
            .filter(|pct| *pct > percent),
    }?;

    Some(Reason::Condition {
        condition: *condition,
        value,
    })
}
