//! Market-aware combinatorial search over the preset catalog.
//!
//! The search runs in phases: a buy-and-hold benchmark, every recommended
//! entry alone, compatible pairs, then the best small combinations extended
//! with one more protection. Every candidate is a full simulation; results
//! are ranked by profit percentage.

use crate::domain::asset::Asset;
use crate::domain::error::StratlabError;
use crate::domain::ledger::EventType;
use crate::domain::market::analyze;
use crate::domain::node::StrategyNode;
use crate::domain::preset::{
    fallback_entries, Category, PresetCatalog, PresetStrategy, ProtectionKind,
};
use crate::domain::simulation::SimulationEngine;
use crate::domain::unified::run_unified_portfolio_simulation;
use crate::ports::label_port::LabelPort;
use crate::ports::yield_port::YieldPoint;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// Number of ranked results returned.
    pub top_n: usize,
    /// Simulations between yields in a single-asset search.
    pub single_batch: usize,
    /// Simulations between yields in a multi-asset search.
    pub multi_batch: usize,
    /// Best 1-2 component results extended in the triples phase.
    pub phase3_seeds: usize,
    pub max_stop_protections: usize,
    pub max_take_profit_protections: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            top_n: 20,
            single_batch: 5,
            multi_batch: 3,
            phase3_seeds: 5,
            max_stop_protections: 3,
            max_take_profit_protections: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Phase {
    Analyzing,
    Single,
    Pairs,
    Triples,
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Analyzing => "analyzing",
            Phase::Single => "single",
            Phase::Pairs => "pairs",
            Phase::Triples => "triples",
            Phase::Complete => "complete",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BestSoFar {
    pub label: String,
    pub profit_percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Progress {
    pub current: usize,
    /// Estimated number of tests; raised whenever `current` passes it.
    pub total: usize,
    pub current_label: String,
    pub best_so_far: Option<BestSoFar>,
    pub profitable_count: usize,
    pub phase: Phase,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct OptimizationResult {
    pub label: String,
    /// Preset ids, in combination order. Empty for the buy-and-hold benchmark.
    pub components: Vec<String>,
    pub names: Vec<String>,
    pub profit_percentage: f64,
    pub final_value: f64,
    pub trades: usize,
}

/// Profit descending, then fewer components, then label.
pub fn rank(a: &OptimizationResult, b: &OptimizationResult) -> Ordering {
    b.profit_percentage
        .total_cmp(&a.profit_percentage)
        .then_with(|| a.components.len().cmp(&b.components.len()))
        .then_with(|| a.label.cmp(&b.label))
}

/// Whether two presets may be combined in one candidate.
pub fn compatible(a: &PresetStrategy, b: &PresetStrategy) -> bool {
    if a.id == b.id {
        return false;
    }
    if a.category == Category::Dca && b.category == Category::Dca {
        return false;
    }
    match (a.protection_kind(), b.protection_kind()) {
        (Some(x), Some(y)) => matches!(
            (x, y),
            (ProtectionKind::StopLoss, ProtectionKind::TakeProfit)
                | (ProtectionKind::TakeProfit, ProtectionKind::StopLoss)
                | (ProtectionKind::TrailingStop, ProtectionKind::TakeProfit)
                | (ProtectionKind::TakeProfit, ProtectionKind::TrailingStop)
        ),
        _ if a.category == Category::Protection && b.category == Category::Protection => false,
        _ => true,
    }
}

struct Outcome {
    profit_percentage: f64,
    final_value: f64,
    trades: usize,
}

type Runner<'r> = dyn FnMut(&[StrategyNode]) -> Result<Outcome, StratlabError> + 'r;

/// Mutable bookkeeping of one search.
struct Search<'s> {
    labels: &'s dyn LabelPort,
    yielder: &'s dyn YieldPoint,
    progress: &'s mut dyn FnMut(&Progress),
    batch: usize,
    results: Vec<OptimizationResult>,
    tested: HashSet<Vec<String>>,
    current: usize,
    total: usize,
    phase: Phase,
    since_yield: usize,
}

impl<'s> Search<'s> {
    fn best(&self) -> Option<BestSoFar> {
        self.results.iter().min_by(|a, b| rank(a, b)).map(|r| BestSoFar {
            label: r.label.clone(),
            profit_percentage: r.profit_percentage,
        })
    }

    fn report(&mut self, current_label: String) {
        let progress = Progress {
            current: self.current,
            total: self.total,
            current_label,
            best_so_far: self.best(),
            profitable_count: self
                .results
                .iter()
                .filter(|r| r.profit_percentage > 0.0)
                .count(),
            phase: self.phase,
        };
        (self.progress)(&progress);
    }

    fn enter(&mut self, phase: Phase) {
        debug!(%phase, tested = self.current, results = self.results.len(), "optimizer phase");
        self.phase = phase;
    }

    fn after_simulation(&mut self) {
        self.since_yield += 1;
        if self.since_yield >= self.batch {
            self.yielder.yield_now();
            self.since_yield = 0;
        }
    }

    fn begin_test(&mut self, label: &str) {
        self.current += 1;
        if self.current > self.total {
            self.total = self.current;
        }
        self.report(label.to_string());
    }

    fn record(
        &mut self,
        label: String,
        combo: &[&PresetStrategy],
        outcome: Result<Outcome, StratlabError>,
    ) {
        match outcome {
            Ok(outcome) => self.results.push(OptimizationResult {
                label,
                components: combo.iter().map(|p| p.id.clone()).collect(),
                names: combo.iter().map(|p| p.name.clone()).collect(),
                profit_percentage: outcome.profit_percentage,
                final_value: outcome.final_value,
                trades: outcome.trades,
            }),
            Err(e) => warn!(candidate = %label, error = %e, "dropping optimizer candidate"),
        }
        self.after_simulation();
    }

    fn benchmark(&mut self, run: impl FnOnce() -> Result<Outcome, StratlabError>) {
        let label = self.labels.buy_and_hold();
        self.begin_test(&label);
        let outcome = run();
        self.record(label, &[], outcome);
    }

    /// Simulate `combo` unless the same set of presets was already tested.
    fn test(&mut self, combo: &[&PresetStrategy], run: &mut Runner<'_>) {
        let mut key: Vec<String> = combo.iter().map(|p| p.id.clone()).collect();
        key.sort();
        if !self.tested.insert(key) {
            return;
        }

        let names: Vec<&str> = combo.iter().map(|p| p.name.as_str()).collect();
        let label = self.labels.combination(&names);
        self.begin_test(&label);

        let nodes: Vec<StrategyNode> = combo.iter().flat_map(|p| p.nodes.iter().cloned()).collect();
        let outcome = run(&nodes);
        self.record(label, combo, outcome);
    }
}

pub struct Optimizer<'a> {
    catalog: &'a PresetCatalog,
    config: OptimizerConfig,
    yielder: &'a dyn YieldPoint,
}

impl<'a> Optimizer<'a> {
    pub fn new(catalog: &'a PresetCatalog, yielder: &'a dyn YieldPoint) -> Self {
        Optimizer {
            catalog,
            config: OptimizerConfig::default(),
            yielder,
        }
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Search the catalog against the engine's price history.
    pub fn quick_optimize(
        &self,
        engine: &SimulationEngine<'_>,
        investment: f64,
        progress: &mut dyn FnMut(&Progress),
    ) -> Result<Vec<OptimizationResult>, StratlabError> {
        let bars = engine.bars().ok_or(StratlabError::NoPriceData)?;
        let analysis = analyze(bars);
        debug!(symbol = engine.symbol(), summary = %analysis.summary, "market analysis");

        let mut run = |nodes: &[StrategyNode]| {
            engine.run_simulation(investment, nodes).map(|r| Outcome {
                profit_percentage: r.profit_percentage,
                final_value: r.final_value,
                trades: r.buys + r.sells,
            })
        };
        let benchmark = || {
            engine.run_buy_and_hold(investment).map(|r| Outcome {
                profit_percentage: r.profit_percentage,
                final_value: r.final_value,
                trades: r.buys + r.sells,
            })
        };

        Ok(self.search(
            &analysis.recommended_categories,
            engine.labels(),
            self.config.single_batch,
            benchmark,
            &mut run,
            progress,
        ))
    }

    /// Search the catalog against a shared-cash portfolio of `assets`.
    ///
    /// Recommendations are the union over every asset's analysis.
    pub fn multi_asset_optimize(
        &self,
        assets: &[Asset],
        initial_cash: f64,
        labels: &dyn LabelPort,
        progress: &mut dyn FnMut(&Progress),
    ) -> Result<Vec<OptimizationResult>, StratlabError> {
        if assets.is_empty() {
            return Err(StratlabError::NoAssets);
        }

        let mut recommended: Vec<Category> = Vec::new();
        for asset in assets {
            for category in analyze(&asset.bars).recommended_categories {
                if !recommended.contains(&category) {
                    recommended.push(category);
                }
            }
        }

        let unified = |nodes: &[StrategyNode]| {
            run_unified_portfolio_simulation(assets, nodes, initial_cash, labels).map(|r| Outcome {
                profit_percentage: r.profit_percentage,
                final_value: r.final_value,
                trades: r
                    .events
                    .iter()
                    .filter(|e| matches!(e.event_type, EventType::Buy | EventType::Sell))
                    .count(),
            })
        };
        Ok(self.search(
            &recommended,
            labels,
            self.config.multi_batch,
            || unified(&[]),
            &mut |nodes: &[StrategyNode]| unified(nodes),
            progress,
        ))
    }

    fn search(
        &self,
        recommended: &[Category],
        labels: &dyn LabelPort,
        batch: usize,
        benchmark: impl FnOnce() -> Result<Outcome, StratlabError>,
        run: &mut Runner<'_>,
        progress: &mut dyn FnMut(&Progress),
    ) -> Vec<OptimizationResult> {
        let protections: Vec<&PresetStrategy> = self
            .catalog
            .iter()
            .filter(|p| p.category == Category::Protection)
            .collect();
        let matching: Vec<&PresetStrategy> = self
            .catalog
            .iter()
            .filter(|p| p.category != Category::Protection && recommended.contains(&p.category))
            .collect();
        let fallback;
        let entries: Vec<&PresetStrategy> = if matching.is_empty() {
            debug!("no catalog entry matches the market, using fallback entries");
            fallback = fallback_entries();
            fallback.iter().collect()
        } else {
            matching
        };

        let entry_pairs = entries
            .iter()
            .enumerate()
            .flat_map(|(i, a)| entries[i + 1..].iter().map(move |b| (*a, *b)))
            .filter(|(a, b)| compatible(a, b))
            .count();
        let stops: Vec<&PresetStrategy> = protections
            .iter()
            .copied()
            .filter(|p| p.protection_kind().is_some_and(|k| k.is_stop()))
            .take(self.config.max_stop_protections)
            .collect();
        let take_profits: Vec<&PresetStrategy> = protections
            .iter()
            .copied()
            .filter(|p| p.protection_kind() == Some(ProtectionKind::TakeProfit))
            .take(self.config.max_take_profit_protections)
            .collect();

        let mut search = Search {
            labels,
            yielder: self.yielder,
            progress,
            batch: batch.max(1),
            results: Vec::new(),
            tested: HashSet::new(),
            current: 0,
            total: 1
                + entries.len()
                + entry_pairs
                + entries.len() * protections.len()
                + self.config.phase3_seeds * (stops.len() + take_profits.len()),
            phase: Phase::Analyzing,
            since_yield: 0,
        };

        search.benchmark(benchmark);

        search.enter(Phase::Single);
        for entry in &entries {
            search.test(&[*entry], run);
        }

        search.enter(Phase::Pairs);
        for (i, a) in entries.iter().enumerate() {
            for b in &entries[i + 1..] {
                if compatible(a, b) {
                    search.test(&[*a, *b], run);
                }
            }
        }
        for entry in &entries {
            for protection in &protections {
                search.test(&[*entry, *protection], run);
            }
        }

        search.enter(Phase::Triples);
        let by_id: HashMap<&str, &PresetStrategy> = entries
            .iter()
            .chain(protections.iter())
            .map(|p| (p.id.as_str(), *p))
            .collect();
        let mut seeds: Vec<&OptimizationResult> = search
            .results
            .iter()
            .filter(|r| (1..=2).contains(&r.components.len()))
            .collect();
        seeds.sort_by(|a, b| rank(a, b));
        let seeds: Vec<Vec<&PresetStrategy>> = seeds
            .into_iter()
            .take(self.config.phase3_seeds)
            .filter_map(|r| {
                r.components
                    .iter()
                    .map(|id| by_id.get(id.as_str()).copied())
                    .collect()
            })
            .collect();
        for seed in &seeds {
            for addition in stops.iter().chain(take_profits.iter()) {
                if seed.iter().any(|p| p.id == addition.id) {
                    continue;
                }
                if !seed.iter().all(|p| compatible(p, addition)) {
                    continue;
                }
                let mut combo = seed.clone();
                combo.push(*addition);
                search.test(&combo, run);
            }
        }

        search.enter(Phase::Complete);
        search.total = search.current;
        search.report(String::new());

        let mut results = search.results;
        results.sort_by(rank);
        results.truncate(self.config.top_n);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::builtin_catalog::builtin_catalog;
    use crate::adapters::english_labels::EnglishLabels;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::adapters::yield_adapter::NoYield;
    use crate::domain::bar::Bar;
    use chrono::{Duration, NaiveDate};
    use std::cell::Cell;

    struct CountingYield(Cell<usize>);

    impl YieldPoint for CountingYield {
        fn yield_now(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn bars_from(closes: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                date: start + Duration::days(i as i64),
                open: close,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume: 1000.0 + (i % 7) as f64 * 100.0,
            })
            .collect()
    }

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    fn wavy(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + 10.0 * (i as f64 / 6.0).sin() + i as f64 * 0.1)
            .collect()
    }

    const SMALL_CATALOG: &str = "
[hold]
name = Hold
category = trend
nodes = ON_FIRST_DAY { BUY_PERCENT(100) }

[sl]
name = Stop
category = protection
nodes = STOP_LOSS(5)

[tp]
name = Target
category = protection
nodes = TAKE_PROFIT(10)

[ts]
name = Trail
category = protection
nodes = TRAILING_STOP(5)
";

    fn small_catalog() -> PresetCatalog {
        PresetCatalog::from_config(&FileConfigAdapter::from_string(SMALL_CATALOG).unwrap())
            .unwrap()
    }

    fn engine(closes: &[f64]) -> SimulationEngine<'static> {
        let mut engine = SimulationEngine::new("TEST", &EnglishLabels);
        engine.load_prices(bars_from(closes));
        engine
    }

    #[test]
    fn protection_compatibility() {
        let catalog = small_catalog();
        let get = |id| catalog.get(id).unwrap();
        assert!(compatible(get("sl"), get("tp")));
        assert!(compatible(get("tp"), get("ts")));
        assert!(!compatible(get("sl"), get("ts")));
        assert!(!compatible(get("sl"), get("sl")));
        assert!(compatible(get("hold"), get("ts")));
    }

    #[test]
    fn two_dca_entries_are_incompatible() {
        let catalog = builtin_catalog().unwrap();
        let dca: Vec<&PresetStrategy> =
            catalog.iter().filter(|p| p.category == Category::Dca).collect();
        assert!(dca.len() >= 2);
        assert!(!compatible(dca[0], dca[1]));
        let trend = catalog.iter().find(|p| p.category == Category::Trend).unwrap();
        assert!(compatible(dca[0], trend));
    }

    #[test]
    fn small_search_tests_each_combination_once() {
        let catalog = small_catalog();
        let optimizer = Optimizer::new(&catalog, &NoYield);
        let mut reports = Vec::new();
        let results = optimizer
            .quick_optimize(&engine(&rising(60)), 10_000.0, &mut |p| reports.push(p.clone()))
            .unwrap();

        // benchmark, hold, hold+{sl,tp,ts}, hold+sl+tp, hold+tp+ts
        assert_eq!(results.len(), 7);
        let mut keys: Vec<Vec<String>> = results
            .iter()
            .map(|r| {
                let mut k = r.components.clone();
                k.sort();
                k
            })
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 7);
        assert!(!results
            .iter()
            .any(|r| r.components.contains(&"sl".to_string())
                && r.components.contains(&"ts".to_string())));

        let last = reports.last().unwrap();
        assert_eq!(last.phase, Phase::Complete);
        assert_eq!(last.current, 7);
        assert_eq!(last.total, 7);
        assert!(reports.windows(2).all(|w| w[0].phase <= w[1].phase));
        assert!(reports.iter().all(|p| p.current <= p.total));
        assert_eq!(reports[0].current_label, "Buy & Hold");
        assert_eq!(reports[0].phase, Phase::Analyzing);
    }

    #[test]
    fn results_are_ranked() {
        let catalog = builtin_catalog().unwrap();
        let optimizer = Optimizer::new(&catalog, &NoYield);
        let mut saw_complete = false;
        let results = optimizer
            .quick_optimize(&engine(&wavy(200)), 10_000.0, &mut |p| {
                saw_complete |= p.phase == Phase::Complete
            })
            .unwrap();
        assert!(saw_complete);
        assert!(!results.is_empty());
        assert!(results.len() <= 20);
        assert!(results
            .windows(2)
            .all(|w| w[0].profit_percentage >= w[1].profit_percentage));
    }

    #[test]
    fn ties_prefer_fewer_components() {
        let catalog = small_catalog();
        let optimizer = Optimizer::new(&catalog, &NoYield);
        let results = optimizer
            .quick_optimize(&engine(&rising(60)), 10_000.0, &mut |_| {})
            .unwrap();
        // holding from day one matches the benchmark exactly
        assert!(results[0].components.is_empty());
        assert_eq!(results[0].label, "Buy & Hold");
        assert_eq!(results[1].components, vec!["hold".to_string()]);
    }

    #[test]
    fn top_n_is_respected() {
        let catalog = builtin_catalog().unwrap();
        let config = OptimizerConfig {
            top_n: 3,
            ..OptimizerConfig::default()
        };
        let optimizer = Optimizer::new(&catalog, &NoYield).with_config(config);
        let results = optimizer
            .quick_optimize(&engine(&wavy(120)), 5_000.0, &mut |_| {})
            .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn yields_after_each_batch() {
        let catalog = small_catalog();
        let yielder = CountingYield(Cell::new(0));
        let optimizer = Optimizer::new(&catalog, &yielder);
        optimizer
            .quick_optimize(&engine(&rising(60)), 10_000.0, &mut |_| {})
            .unwrap();
        // 7 simulations, batch of 5
        assert_eq!(yielder.0.get(), 1);

        let yielder = CountingYield(Cell::new(0));
        let optimizer = Optimizer::new(&catalog, &yielder);
        let assets = vec![Asset::new("AAA", bars_from(&rising(60)))];
        optimizer
            .multi_asset_optimize(&assets, 10_000.0, &EnglishLabels, &mut |_| {})
            .unwrap();
        // 7 simulations, batch of 3
        assert_eq!(yielder.0.get(), 2);
    }

    #[test]
    fn falls_back_when_nothing_matches() {
        let catalog = PresetCatalog::from_config(
            &FileConfigAdapter::from_string(
                "[sl]\nname = Stop\ncategory = protection\nnodes = STOP_LOSS(5)\n",
            )
            .unwrap(),
        )
        .unwrap();
        let optimizer = Optimizer::new(&catalog, &NoYield);
        let results = optimizer
            .quick_optimize(&engine(&wavy(90)), 10_000.0, &mut |_| {})
            .unwrap();
        assert!(results
            .iter()
            .any(|r| r.components.contains(&"fallback-dip-buyer".to_string())));
        assert!(results
            .iter()
            .any(|r| r.components == vec!["fallback-monthly-dca".to_string(), "sl".to_string()]));
    }

    #[test]
    fn failing_candidates_are_dropped() {
        let catalog = small_catalog();
        let optimizer = Optimizer::new(&catalog, &NoYield);
        let mut last = None;
        let results = optimizer
            .quick_optimize(&engine(&[1.0, f64::MAX]), 10_000.0, &mut |p| {
                last = Some(p.clone())
            })
            .unwrap();
        // every candidate buys on day one and overflows
        assert!(results.is_empty());
        assert_eq!(last.unwrap().phase, Phase::Complete);
    }

    #[test]
    fn preconditions() {
        let catalog = small_catalog();
        let optimizer = Optimizer::new(&catalog, &NoYield);
        let empty = SimulationEngine::new("NONE", &EnglishLabels);
        assert!(matches!(
            optimizer.quick_optimize(&empty, 1000.0, &mut |_| {}),
            Err(StratlabError::NoPriceData)
        ));
        assert!(matches!(
            optimizer.multi_asset_optimize(&[], 1000.0, &EnglishLabels, &mut |_| {}),
            Err(StratlabError::NoAssets)
        ));
    }

    #[test]
    fn multi_asset_search_uses_shared_portfolio() {
        let catalog = small_catalog();
        let optimizer = Optimizer::new(&catalog, &NoYield);
        let assets = vec![
            Asset::new("AAA", bars_from(&rising(60))),
            Asset::new("BBB", bars_from(&rising(60))),
        ];
        let results = optimizer
            .multi_asset_optimize(&assets, 10_000.0, &EnglishLabels, &mut |_| {})
            .unwrap();
        let benchmark = results.iter().find(|r| r.components.is_empty()).unwrap();
        assert_eq!(benchmark.trades, 2);
        assert!(benchmark.profit_percentage > 0.0);
    }
}
