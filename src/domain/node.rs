//! Strategy tree data structures.
//!
//! A strategy is a list of `StrategyNode`s. Each node is one of four kinds:
//! - `Trigger`: price/date predicate, may own children
//! - `Condition`: indicator predicate, may own children
//! - `Action`: buy or sell, always a leaf
//! - `Modifier`: exit rule checked every bar, always a leaf
//!
//! Children run only when their parent's predicate holds on that bar.

use crate::domain::error::StratlabError;
use crate::domain::indicator::MaKey;
use chrono::Weekday;
use std::collections::BTreeSet;
use std::fmt;

/// Nesting deeper than this is ignored by the evaluator.
pub const MAX_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Trigger {
    PriceAbove { price: f64 },
    PriceBelow { price: f64 },
    PriceDrops { percent: f64 },
    PriceRises { percent: f64 },
    Weekday { day: Weekday },
    MonthDay { day: u32 },
    EveryNDays { days: usize },
    FirstDay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Cross {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Band {
    Lower,
    Upper,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Condition {
    RsiBelow { threshold: f64 },
    RsiAbove { threshold: f64 },
    MovingAverage { average: MaKey, direction: Cross },
    VolumeSpike { multiplier: f64 },
    Bollinger { band: Band },
    MacdCross { direction: Cross },
    VolatilityAbove { percent: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Action {
    Buy { amount: f64 },
    Sell { units: f64 },
    BuyPercent { percent: f64 },
    SellPercent { percent: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Modifier {
    StopLoss { percent: f64 },
    TakeProfit { percent: f64 },
    TrailingStop { percent: f64 },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum NodeKind {
    Trigger(Trigger),
    Condition(Condition),
    Action(Action),
    Modifier(Modifier),
}

/// Display attribution for nodes that come from a preset strategy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct NodeSource {
    pub name: String,
    pub icon: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StrategyNode {
    pub id: String,
    pub kind: NodeKind,
    pub children: Vec<StrategyNode>,
    pub source: Option<NodeSource>,
}

impl StrategyNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        StrategyNode {
            id: id.into(),
            kind,
            children: Vec::new(),
            source: None,
        }
    }

    pub fn trigger(id: impl Into<String>, trigger: Trigger) -> Self {
        Self::new(id, NodeKind::Trigger(trigger))
    }

    pub fn condition(id: impl Into<String>, condition: Condition) -> Self {
        Self::new(id, NodeKind::Condition(condition))
    }

    pub fn action(id: impl Into<String>, action: Action) -> Self {
        Self::new(id, NodeKind::Action(action))
    }

    pub fn modifier(id: impl Into<String>, modifier: Modifier) -> Self {
        Self::new(id, NodeKind::Modifier(modifier))
    }

    pub fn with_children(mut self, children: Vec<StrategyNode>) -> Self {
        self.children = children;
        self
    }

    /// Tag this node and all descendants with `source`.
    pub fn with_source(mut self, source: &NodeSource) -> Self {
        self.set_source(source);
        self
    }

    fn set_source(&mut self, source: &NodeSource) {
        self.source = Some(source.clone());
        for child in &mut self.children {
            child.set_source(source);
        }
    }

    pub fn can_have_children(&self) -> bool {
        matches!(self.kind, NodeKind::Trigger(_) | NodeKind::Condition(_))
    }

    pub fn operation(&self) -> &'static str {
        self.kind.operation()
    }
}

impl NodeKind {
    pub fn operation(&self) -> &'static str {
        match self {
            NodeKind::Trigger(t) => match t {
                Trigger::PriceAbove { .. } => "IF_PRICE_ABOVE",
                Trigger::PriceBelow { .. } => "IF_PRICE_BELOW",
                Trigger::PriceDrops { .. } => "IF_PRICE_DROPS",
                Trigger::PriceRises { .. } => "IF_PRICE_RISES",
                Trigger::Weekday { .. } => "ON_WEEKDAY",
                Trigger::MonthDay { .. } => "ON_MONTH_DAY",
                Trigger::EveryNDays { .. } => "EVERY_N_DAYS",
                Trigger::FirstDay => "ON_FIRST_DAY",
            },
            NodeKind::Condition(c) => match c {
                Condition::RsiBelow { .. } => "IF_RSI_BELOW",
                Condition::RsiAbove { .. } => "IF_RSI_ABOVE",
                Condition::MovingAverage { .. } => "IF_MOVING_AVG",
                Condition::VolumeSpike { .. } => "IF_VOLUME_SPIKE",
                Condition::Bollinger { .. } => "IF_BOLLINGER",
                Condition::MacdCross { .. } => "IF_MACD_CROSS",
                Condition::VolatilityAbove { .. } => "IF_VOLATILITY_ABOVE",
            },
            NodeKind::Action(a) => match a {
                Action::Buy { .. } => "BUY",
                Action::Sell { .. } => "SELL",
                Action::BuyPercent { .. } => "BUY_PERCENT",
                Action::SellPercent { .. } => "SELL_PERCENT",
            },
            NodeKind::Modifier(m) => match m {
                Modifier::StopLoss { .. } => "STOP_LOSS",
                Modifier::TakeProfit { .. } => "TAKE_PROFIT",
                Modifier::TrailingStop { .. } => "TRAILING_STOP",
            },
        }
    }
}

impl fmt::Display for Cross {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cross::Above => write!(f, "ABOVE"),
            Cross::Below => write!(f, "BELOW"),
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Band::Lower => write!(f, "LOWER"),
            Band::Upper => write!(f, "UPPER"),
        }
    }
}

/// Renders a node back into the DSL accepted by `node_parser::parse`.
impl fmt::Display for StrategyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.operation();
        match &self.kind {
            NodeKind::Trigger(t) => match t {
                Trigger::PriceAbove { price } | Trigger::PriceBelow { price } => {
                    write!(f, "{op}({price})")?
                }
                Trigger::PriceDrops { percent } | Trigger::PriceRises { percent } => {
                    write!(f, "{op}({percent})")?
                }
                Trigger::Weekday { day } => write!(f, "{op}({})", weekday_keyword(*day))?,
                Trigger::MonthDay { day } => write!(f, "{op}({day})")?,
                Trigger::EveryNDays { days } => write!(f, "{op}({days})")?,
                Trigger::FirstDay => write!(f, "{op}")?,
            },
            NodeKind::Condition(c) => match c {
                Condition::RsiBelow { threshold } | Condition::RsiAbove { threshold } => {
                    write!(f, "{op}({threshold})")?
                }
                Condition::MovingAverage { average, direction } => write!(
                    f,
                    "{op}({}, {}, {direction})",
                    average.kind.to_string().to_uppercase(),
                    average.period
                )?,
                Condition::VolumeSpike { multiplier } => write!(f, "{op}({multiplier})")?,
                Condition::Bollinger { band } => write!(f, "{op}({band})")?,
                Condition::MacdCross { direction } => write!(f, "{op}({direction})")?,
                Condition::VolatilityAbove { percent } => write!(f, "{op}({percent})")?,
            },
            NodeKind::Action(a) => match a {
                Action::Buy { amount } => write!(f, "{op}({amount})")?,
                Action::Sell { units } => write!(f, "{op}({units})")?,
                Action::BuyPercent { percent } | Action::SellPercent { percent } => {
                    write!(f, "{op}({percent})")?
                }
            },
            NodeKind::Modifier(
                Modifier::StopLoss { percent }
                | Modifier::TakeProfit { percent }
                | Modifier::TrailingStop { percent },
            ) => write!(f, "{op}({percent})")?,
        }

        if !self.children.is_empty() {
            write!(f, " {{ ")?;
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{child}")?;
            }
            write!(f, " }}")?;
        }
        Ok(())
    }
}

pub fn weekday_keyword(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        Weekday::Sat => "SAT",
        Weekday::Sun => "SUN",
    }
}

/// Indicators that a strategy needs beyond the standard set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorRequirements {
    pub moving_averages: BTreeSet<MaKey>,
    pub bollinger: bool,
    pub macd: bool,
    pub atr: bool,
}

/// Walk the tree (up to `MAX_DEPTH`) and collect indicator references.
pub fn extract_requirements(nodes: &[StrategyNode]) -> IndicatorRequirements {
    let mut req = IndicatorRequirements::default();
    collect_requirements(nodes, 0, &mut req);
    req
}

fn collect_requirements(nodes: &[StrategyNode], depth: usize, req: &mut IndicatorRequirements) {
    if depth > MAX_DEPTH {
        return;
    }
    for node in nodes {
        if let NodeKind::Condition(c) = &node.kind {
            match c {
                Condition::MovingAverage { average, .. } => {
                    req.moving_averages.insert(*average);
                }
                Condition::Bollinger { .. } => req.bollinger = true,
                Condition::MacdCross { .. } => req.macd = true,
                Condition::VolatilityAbove { .. } => req.atr = true,
                Condition::RsiBelow { .. }
                | Condition::RsiAbove { .. }
                | Condition::VolumeSpike { .. } => {}
            }
        }
        collect_requirements(&node.children, depth + 1, req);
    }
}

/// Modifier nodes anywhere in the tree (up to `MAX_DEPTH`), in depth-first order.
pub fn collect_modifiers(nodes: &[StrategyNode]) -> Vec<&StrategyNode> {
    let mut out = Vec::new();
    push_modifiers(nodes, 0, &mut out);
    out
}

fn push_modifiers<'a>(nodes: &'a [StrategyNode], depth: usize, out: &mut Vec<&'a StrategyNode>) {
    if depth > MAX_DEPTH {
        return;
    }
    for node in nodes {
        if matches!(node.kind, NodeKind::Modifier(_)) {
            out.push(node);
        }
        push_modifiers(&node.children, depth + 1, out);
    }
}

/// Check structure, nesting depth and parameters of a whole tree.
pub fn validate_nodes(nodes: &[StrategyNode]) -> Result<(), StratlabError> {
    validate_level(nodes, 0)
}

fn validate_level(nodes: &[StrategyNode], depth: usize) -> Result<(), StratlabError> {
    for node in nodes {
        validate_node(node, depth)?;
    }
    Ok(())
}

fn validate_node(node: &StrategyNode, depth: usize) -> Result<(), StratlabError> {
    let invalid = |reason: String| StratlabError::StrategyInvalid {
        node: node.id.clone(),
        reason,
    };

    if depth > MAX_DEPTH {
        return Err(invalid(format!("nested deeper than {MAX_DEPTH} levels")));
    }
    if !node.can_have_children() && !node.children.is_empty() {
        return Err(invalid(format!(
            "{} nodes cannot have children",
            node.operation()
        )));
    }

    match &node.kind {
        NodeKind::Trigger(t) => match *t {
            Trigger::PriceAbove { price } | Trigger::PriceBelow { price } => {
                require_positive(price, "price").map_err(invalid)?
            }
            Trigger::PriceDrops { percent } | Trigger::PriceRises { percent } => {
                require_positive(percent, "percent").map_err(invalid)?
            }
            Trigger::MonthDay { day } => {
                if !(1..=31).contains(&day) {
                    return Err(invalid(format!("day of month must be 1-31, got {day}")));
                }
            }
            Trigger::EveryNDays { days } => {
                if days == 0 {
                    return Err(invalid("interval must be at least 1 day".into()));
                }
            }
            Trigger::Weekday { .. } | Trigger::FirstDay => {}
        },
        NodeKind::Condition(c) => match *c {
            Condition::RsiBelow { threshold } | Condition::RsiAbove { threshold } => {
                if !(0.0..=100.0).contains(&threshold) {
                    return Err(invalid(format!(
                        "RSI threshold must be within 0-100, got {threshold}"
                    )));
                }
            }
            Condition::MovingAverage { average, .. } => {
                if average.period == 0 {
                    return Err(invalid("moving average period must be positive".into()));
                }
            }
            Condition::VolumeSpike { multiplier } => {
                require_positive(multiplier, "multiplier").map_err(invalid)?
            }
            Condition::VolatilityAbove { percent } => {
                require_positive(percent, "percent").map_err(invalid)?
            }
            Condition::Bollinger { .. } | Condition::MacdCross { .. } => {}
        },
        NodeKind::Action(a) => match *a {
            Action::Buy { amount } => require_positive(amount, "amount").map_err(invalid)?,
            Action::Sell { units } => require_positive(units, "units").map_err(invalid)?,
            Action::BuyPercent { percent } | Action::SellPercent { percent } => {
                require_percent(percent).map_err(invalid)?
            }
        },
        NodeKind::Modifier(
            Modifier::StopLoss { percent }
            | Modifier::TakeProfit { percent }
            | Modifier::TrailingStop { percent },
        ) => require_percent(*percent).map_err(invalid)?,
    }

    validate_level(&node.children, depth + 1)
}

fn require_positive(value: f64, name: &str) -> Result<(), String> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(format!("{name} must be a positive number, got {value}"))
    }
}

fn require_percent(value: f64) -> Result<(), String> {
    if value.is_finite() && value > 0.0 && value <= 100.0 {
        Ok(())
    } else {
        Err(format!("percent must be within (0, 100], got {value}"))
    }
}
