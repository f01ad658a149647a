//! Named preset strategies and the catalog that holds them.
//!
//! A catalog is loaded once from INI configuration (one section per preset)
//! and is read-only afterwards.

use crate::domain::error::StratlabError;
use crate::domain::indicator::MaKey;
use crate::domain::node::{
    Action, Condition, Cross, Modifier, NodeKind, NodeSource, StrategyNode, Trigger,
};
use crate::domain::node_parser::parse_strategy;
use crate::ports::config_port::ConfigPort;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Category {
    Trend,
    Momentum,
    ValueDip,
    Dca,
    Protection,
    Volatility,
    Reversal,
    Scalper,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Trend,
        Category::Momentum,
        Category::ValueDip,
        Category::Dca,
        Category::Protection,
        Category::Volatility,
        Category::Reversal,
        Category::Scalper,
    ];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Trend => "trend",
            Category::Momentum => "momentum",
            Category::ValueDip => "value",
            Category::Dca => "dca",
            Category::Protection => "protection",
            Category::Volatility => "volatility",
            Category::Reversal => "reversal",
            Category::Scalper => "scalper",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trend" => Ok(Category::Trend),
            "momentum" => Ok(Category::Momentum),
            "value" | "dip" | "value/dip" => Ok(Category::ValueDip),
            "dca" => Ok(Category::Dca),
            "protection" => Ok(Category::Protection),
            "volatility" => Ok(Category::Volatility),
            "reversal" => Ok(Category::Reversal),
            "scalper" => Ok(Category::Scalper),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level '{}'", other)),
        }
    }
}

/// Which exit a protection preset provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectionKind {
    StopLoss,
    TakeProfit,
    TrailingStop,
}

impl ProtectionKind {
    /// Stop-loss and trailing-stop both cap losses.
    pub fn is_stop(&self) -> bool {
        matches!(self, ProtectionKind::StopLoss | ProtectionKind::TrailingStop)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PresetStrategy {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub color: String,
    pub category: Category,
    pub risk_level: RiskLevel,
    pub nodes: Vec<StrategyNode>,
}

impl PresetStrategy {
    /// The kind of the first modifier of a protection preset.
    pub fn protection_kind(&self) -> Option<ProtectionKind> {
        if self.category != Category::Protection {
            return None;
        }
        crate::domain::node::collect_modifiers(&self.nodes)
            .into_iter()
            .find_map(|node| match node.kind {
                NodeKind::Modifier(Modifier::StopLoss { .. }) => Some(ProtectionKind::StopLoss),
                NodeKind::Modifier(Modifier::TakeProfit { .. }) => {
                    Some(ProtectionKind::TakeProfit)
                }
                NodeKind::Modifier(Modifier::TrailingStop { .. }) => {
                    Some(ProtectionKind::TrailingStop)
                }
                _ => None,
            })
    }

    pub fn source(&self) -> NodeSource {
        NodeSource {
            name: self.name.clone(),
            icon: self.icon.clone(),
            color: self.color.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PresetCatalog {
    presets: Vec<PresetStrategy>,
}

impl PresetCatalog {
    pub fn new(presets: Vec<PresetStrategy>) -> Self {
        PresetCatalog { presets }
    }

    /// Build a catalog from INI sections, one preset per section, ordered by id.
    ///
    /// Keys: `name` (required), `icon`, `color`, `category` (required),
    /// `risk` (default medium), `nodes` (required, node DSL).
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StratlabError> {
        let mut ids = config.sections();
        ids.sort();

        let mut presets = Vec::with_capacity(ids.len());
        for id in ids {
            let required = |key: &str| {
                config
                    .get_string(&id, key)
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| StratlabError::ConfigMissing {
                        section: id.clone(),
                        key: key.to_string(),
                    })
            };
            let invalid = |key: &str, reason: String| StratlabError::ConfigInvalid {
                section: id.clone(),
                key: key.to_string(),
                reason,
            };

            let name = required("name")?;
            let category: Category = required("category")?
                .parse()
                .map_err(|e| invalid("category", e))?;
            let risk_level: RiskLevel = match config.get_string(&id, "risk") {
                Some(risk) => risk.parse().map_err(|e| invalid("risk", e))?,
                None => RiskLevel::Medium,
            };
            let dsl = required("nodes")?;

            let source = NodeSource {
                name: name.clone(),
                icon: config.get_string(&id, "icon").unwrap_or_default(),
                color: config.get_string(&id, "color").unwrap_or_default(),
            };
            let nodes = parse_strategy(&dsl, &id)
                .map_err(|e| invalid("nodes", e.to_string()))?
                .into_iter()
                .map(|node| node.with_source(&source))
                .collect();

            presets.push(PresetStrategy {
                id,
                name,
                icon: source.icon,
                color: source.color,
                category,
                risk_level,
                nodes,
            });
        }

        Ok(PresetCatalog { presets })
    }

    pub fn get(&self, id: &str) -> Result<&PresetStrategy, StratlabError> {
        self.presets
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| StratlabError::PresetNotFound { id: id.to_string() })
    }

    pub fn iter(&self) -> impl Iterator<Item = &PresetStrategy> {
        self.presets.iter()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

fn preset(
    id: &str,
    name: &str,
    icon: &str,
    color: &str,
    category: Category,
    risk_level: RiskLevel,
    nodes: Vec<StrategyNode>,
) -> PresetStrategy {
    let mut preset = PresetStrategy {
        id: id.to_string(),
        name: name.to_string(),
        icon: icon.to_string(),
        color: color.to_string(),
        category,
        risk_level,
        nodes: Vec::new(),
    };
    let source = preset.source();
    preset.nodes = nodes.into_iter().map(|n| n.with_source(&source)).collect();
    preset
}

/// Entries the optimizer falls back to when nothing in the catalog matches.
pub fn fallback_entries() -> Vec<PresetStrategy> {
    let buy_percent = |id: &str, percent| StrategyNode::action(id, Action::BuyPercent { percent });
    vec![
        preset(
            "fallback-dip-buyer",
            "Dip Buyer",
            "anchor",
            "blue",
            Category::ValueDip,
            RiskLevel::Medium,
            vec![
                StrategyNode::trigger("fallback-dip-buyer.0", Trigger::PriceDrops { percent: 3.0 })
                    .with_children(vec![buy_percent("fallback-dip-buyer.0.0", 25.0)]),
            ],
        ),
        preset(
            "fallback-monthly-dca",
            "Monthly DCA",
            "calendar",
            "green",
            Category::Dca,
            RiskLevel::Low,
            vec![
                StrategyNode::trigger("fallback-monthly-dca.0", Trigger::MonthDay { day: 1 })
                    .with_children(vec![buy_percent("fallback-monthly-dca.0.0", 10.0)]),
            ],
        ),
        preset(
            "fallback-golden-cross",
            "Golden Cross",
            "trending-up",
            "gold",
            Category::Trend,
            RiskLevel::Medium,
            vec![
                StrategyNode::condition(
                    "fallback-golden-cross.0",
                    Condition::MovingAverage {
                        average: MaKey::sma(50),
                        direction: Cross::Above,
                    },
                )
                .with_children(vec![buy_percent("fallback-golden-cross.0.0", 100.0)]),
                StrategyNode::condition(
                    "fallback-golden-cross.1",
                    Condition::MovingAverage {
                        average: MaKey::sma(50),
                        direction: Cross::Below,
                    },
                )
                .with_children(vec![StrategyNode::action(
                    "fallback-golden-cross.1.0",
                    Action::SellPercent { percent: 100.0 },
                )]),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    const CATALOG: &str = "\
[trailing]
name = Trailing Stop 10%
icon = shield
color = orange
category = protection
risk = low
nodes = TRAILING_STOP(10)

[dip]
name = Dip Buyer
icon = anchor
color = blue
category = value
nodes = IF_PRICE_DROPS(3) { BUY_PERCENT(25) }
";

    #[test]
    fn category_round_trips_through_display() {
        for category in Category::ALL {
            assert_eq!(category.to_string().parse::<Category>(), Ok(category));
        }
        assert_eq!("Value/Dip".parse::<Category>(), Ok(Category::ValueDip));
        assert!("crypto".parse::<Category>().is_err());
    }

    #[test]
    fn from_config_orders_by_id_and_attaches_source() {
        let config = FileConfigAdapter::from_string(CATALOG).unwrap();
        let catalog = PresetCatalog::from_config(&config).unwrap();
        let ids: Vec<&str> = catalog.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["dip", "trailing"]);

        let dip = catalog.get("dip").unwrap();
        assert_eq!(dip.category, Category::ValueDip);
        assert_eq!(dip.risk_level, RiskLevel::Medium);
        assert_eq!(dip.nodes[0].id, "dip.0");
        let source = dip.nodes[0].children[0].source.as_ref().unwrap();
        assert_eq!(source.name, "Dip Buyer");
        assert_eq!(source.color, "blue");
    }

    #[test]
    fn protection_kind_from_modifier() {
        let config = FileConfigAdapter::from_string(CATALOG).unwrap();
        let catalog = PresetCatalog::from_config(&config).unwrap();
        assert_eq!(
            catalog.get("trailing").unwrap().protection_kind(),
            Some(ProtectionKind::TrailingStop)
        );
        assert_eq!(catalog.get("dip").unwrap().protection_kind(), None);
        assert!(ProtectionKind::StopLoss.is_stop());
        assert!(!ProtectionKind::TakeProfit.is_stop());
    }

    #[test]
    fn unknown_preset() {
        let catalog = PresetCatalog::default();
        assert!(matches!(
            catalog.get("nope"),
            Err(StratlabError::PresetNotFound { .. })
        ));
    }

    #[test]
    fn missing_and_invalid_keys() {
        let config = FileConfigAdapter::from_string("[x]\nname = X\nnodes = BUY(1)\n").unwrap();
        assert!(matches!(
            PresetCatalog::from_config(&config),
            Err(StratlabError::ConfigMissing { ref key, .. }) if key == "category"
        ));

        let config = FileConfigAdapter::from_string(
            "[x]\nname = X\ncategory = trend\nnodes = BUY_PERCENT(500)\n",
        )
        .unwrap();
        assert!(matches!(
            PresetCatalog::from_config(&config),
            Err(StratlabError::ConfigInvalid { ref key, .. }) if key == "nodes"
        ));
    }

    #[test]
    fn fallback_entries_are_valid() {
        let entries = fallback_entries();
        assert_eq!(entries.len(), 3);
        for entry in &entries {
            crate::domain::node::validate_nodes(&entry.nodes).unwrap();
            assert!(entry.nodes[0].source.is_some());
        }
        assert_eq!(
            entries[2].nodes[0].to_string(),
            "IF_MOVING_AVG(SMA, 50, ABOVE) { BUY_PERCENT(100) }"
        );
    }
}
