//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::builtin_catalog::{builtin_catalog, load_catalog};
use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::english_labels::EnglishLabels;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::yield_adapter::ThreadYield;
use crate::domain::asset::Asset;
use crate::domain::bar::Bar;
use crate::domain::config_validation::{
    build_optimizer_config, build_simulation_settings, catalog_path, SimulationSettings,
};
use crate::domain::error::StratlabError;
use crate::domain::market::{analyze, MarketAnalysis};
use crate::domain::node::StrategyNode;
use crate::domain::node_parser::parse_strategy;
use crate::domain::optimizer::{OptimizationResult, Optimizer, OptimizerConfig, Phase, Progress};
use crate::domain::preset::{Category, PresetCatalog};
use crate::domain::simulation::{SimulationEngine, SimulationResult};
use crate::domain::unified::{run_unified_portfolio_simulation, UnifiedResult};
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "stratlab", about = "Strategy backtester and optimizer")]
pub struct Cli {
    /// INI file with [simulation], [optimizer] and [catalog] sections
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DataArgs {
    /// Directory holding <SYMBOL>.csv files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// First date to load (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,
    /// Last date to load (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,
    /// Starting cash
    #[arg(short, long)]
    pub investment: Option<f64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a strategy (preset id or node DSL) over one symbol
    Simulate {
        #[arg(short, long)]
        symbol: String,
        #[arg(long)]
        strategy: String,
        #[command(flatten)]
        data: DataArgs,
    },
    /// Buy on the first bar and hold
    Hold {
        #[arg(short, long)]
        symbol: String,
        #[command(flatten)]
        data: DataArgs,
    },
    /// Run one strategy over several symbols sharing one cash pool
    Portfolio {
        /// Comma-separated symbols, in priority order
        #[arg(long)]
        symbols: String,
        /// Omit to split cash evenly and hold
        #[arg(long)]
        strategy: Option<String>,
        #[command(flatten)]
        data: DataArgs,
    },
    /// Classify the market regime of a symbol
    Analyze {
        #[arg(short, long)]
        symbol: String,
        #[command(flatten)]
        data: DataArgs,
    },
    /// Search preset combinations for the best performer
    Optimize {
        /// One symbol, or several comma-separated for a shared portfolio
        #[arg(long)]
        symbols: String,
        #[command(flatten)]
        data: DataArgs,
    },
    /// List the preset catalog
    Presets {
        #[arg(long)]
        category: Option<String>,
    },
}

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub settings: SimulationSettings,
    pub optimizer: OptimizerConfig,
    pub catalog: PresetCatalog,
}

pub fn run(cli: Cli) -> ExitCode {
    let config = cli.config.as_deref();
    let result = match &cli.command {
        Command::Simulate {
            symbol,
            strategy,
            data,
        } => run_simulate(config, data, symbol, Some(strategy)),
        Command::Hold { symbol, data } => run_simulate(config, data, symbol, None),
        Command::Portfolio {
            symbols,
            strategy,
            data,
        } => run_portfolio(config, data, symbols, strategy.as_deref()),
        Command::Analyze { symbol, data } => run_analyze(config, data, symbol),
        Command::Optimize { symbols, data } => run_optimize(config, data, symbols),
        Command::Presets { category } => run_presets(config, category.as_deref()),
    };

    match result {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, StratlabError> {
    match path {
        Some(path) => {
            eprintln!("Loading config from {}", path.display());
            FileConfigAdapter::from_file(path)
        }
        None => FileConfigAdapter::from_string(""),
    }
}

/// Load settings and the catalog, then apply command-line overrides.
pub fn build_context(
    config_path: Option<&Path>,
    overrides: &DataArgs,
) -> Result<Context, StratlabError> {
    let config = load_config(config_path)?;
    let mut settings = build_simulation_settings(&config)?;
    let optimizer = build_optimizer_config(&config)?;
    let catalog = match catalog_path(&config) {
        Some(path) => load_catalog(path)?,
        None => builtin_catalog()?,
    };

    if let Some(dir) = &overrides.data_dir {
        settings.data_dir = dir.display().to_string();
    }
    if let Some(start) = overrides.start {
        settings.start_date = start;
    }
    if let Some(end) = overrides.end {
        settings.end_date = end;
    }
    if let Some(investment) = overrides.investment {
        if !investment.is_finite() || investment <= 0.0 {
            return Err(StratlabError::ConfigInvalid {
                section: "simulation".into(),
                key: "investment".into(),
                reason: "investment must be positive".into(),
            });
        }
        settings.investment = investment;
    }

    Ok(Context {
        settings,
        optimizer,
        catalog,
    })
}

pub fn parse_symbols(symbols: &str) -> Vec<String> {
    symbols
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// A preset id from the catalog, or node DSL.
///
/// Preset ids are lowercase and DSL keywords uppercase, so text with a
/// lowercase letter that matches no preset is reported as an unknown preset.
pub fn resolve_strategy(
    catalog: &PresetCatalog,
    text: &str,
) -> Result<Vec<StrategyNode>, StratlabError> {
    let text = text.trim();
    if let Ok(preset) = catalog.get(&text.to_lowercase()) {
        return Ok(preset.nodes.clone());
    }
    if text.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(StratlabError::PresetNotFound {
            id: text.to_string(),
        });
    }
    parse_strategy(text, "").inspect_err(|e| {
        if let StratlabError::StrategyParse(parse) = e {
            eprintln!("{}", parse.display_with_context(text));
        }
    })
}

pub fn load_assets(
    data_port: &dyn DataPort,
    symbols: &[String],
    settings: &SimulationSettings,
) -> Result<Vec<Asset>, StratlabError> {
    let mut assets = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        match data_port.fetch_bars(symbol, settings.start_date, settings.end_date) {
            Ok(bars) if bars.is_empty() => eprintln!("warning: skipping {} (no bars)", symbol),
            Ok(bars) => assets.push(Asset::new(symbol.clone(), bars)),
            Err(e) => eprintln!("warning: skipping {} ({})", symbol, e),
        }
    }
    if assets.is_empty() {
        return Err(StratlabError::NoAssets);
    }
    Ok(assets)
}

fn load_single(
    data_port: &dyn DataPort,
    symbol: &str,
    settings: &SimulationSettings,
) -> Result<Vec<Bar>, StratlabError> {
    let symbol = symbol.to_uppercase();
    let bars = data_port.fetch_bars(&symbol, settings.start_date, settings.end_date)?;
    if bars.is_empty() {
        return Err(StratlabError::NoData { symbol });
    }
    eprintln!("Loaded {} bars for {}", bars.len(), symbol);
    Ok(bars)
}

fn run_simulate(
    config: Option<&Path>,
    args: &DataArgs,
    symbol: &str,
    strategy: Option<&str>,
) -> Result<String, StratlabError> {
    let ctx = build_context(config, args)?;
    let data_port = CsvAdapter::new(PathBuf::from(&ctx.settings.data_dir));
    let result = simulate_pipeline(&data_port, &ctx, symbol, strategy)?;
    Ok(format_simulation(&result))
}

pub fn simulate_pipeline(
    data_port: &dyn DataPort,
    ctx: &Context,
    symbol: &str,
    strategy: Option<&str>,
) -> Result<SimulationResult, StratlabError> {
    let nodes = strategy
        .map(|text| resolve_strategy(&ctx.catalog, text))
        .transpose()?;
    let bars = load_single(data_port, symbol, &ctx.settings)?;

    let mut engine = SimulationEngine::new(symbol.to_uppercase(), &EnglishLabels);
    engine.load_prices(bars);
    match nodes {
        Some(nodes) => engine.run_simulation(ctx.settings.investment, &nodes),
        None => engine.run_buy_and_hold(ctx.settings.investment),
    }
}

fn run_portfolio(
    config: Option<&Path>,
    args: &DataArgs,
    symbols: &str,
    strategy: Option<&str>,
) -> Result<String, StratlabError> {
    let ctx = build_context(config, args)?;
    let data_port = CsvAdapter::new(PathBuf::from(&ctx.settings.data_dir));
    let result = portfolio_pipeline(&data_port, &ctx, &parse_symbols(symbols), strategy)?;
    Ok(format_unified(&result))
}

pub fn portfolio_pipeline(
    data_port: &dyn DataPort,
    ctx: &Context,
    symbols: &[String],
    strategy: Option<&str>,
) -> Result<UnifiedResult, StratlabError> {
    let nodes = match strategy {
        Some(text) => resolve_strategy(&ctx.catalog, text)?,
        None => Vec::new(),
    };
    let assets = load_assets(data_port, symbols, &ctx.settings)?;
    run_unified_portfolio_simulation(&assets, &nodes, ctx.settings.investment, &EnglishLabels)
}

fn run_analyze(
    config: Option<&Path>,
    args: &DataArgs,
    symbol: &str,
) -> Result<String, StratlabError> {
    let ctx = build_context(config, args)?;
    let data_port = CsvAdapter::new(PathBuf::from(&ctx.settings.data_dir));
    let bars = load_single(&data_port, symbol, &ctx.settings)?;
    Ok(format_analysis(&symbol.to_uppercase(), &analyze(&bars)))
}

fn run_optimize(
    config: Option<&Path>,
    args: &DataArgs,
    symbols: &str,
) -> Result<String, StratlabError> {
    let ctx = build_context(config, args)?;
    let data_port = CsvAdapter::new(PathBuf::from(&ctx.settings.data_dir));
    let results = optimize_pipeline(&data_port, &ctx, &parse_symbols(symbols))?;
    Ok(format_optimization(&results))
}

pub fn optimize_pipeline(
    data_port: &dyn DataPort,
    ctx: &Context,
    symbols: &[String],
) -> Result<Vec<OptimizationResult>, StratlabError> {
    let optimizer = Optimizer::new(&ctx.catalog, &ThreadYield).with_config(ctx.optimizer.clone());
    let mut last_phase = None;
    let mut report = |p: &Progress| {
        if last_phase != Some(p.phase) {
            last_phase = Some(p.phase);
            match &p.best_so_far {
                Some(best) if p.phase != Phase::Analyzing => eprintln!(
                    "[{}/{}] {} (best so far: {} {:+.2}%)",
                    p.current, p.total, p.phase, best.label, best.profit_percentage
                ),
                _ => eprintln!("[{}/{}] {}", p.current, p.total, p.phase),
            }
        }
    };

    match symbols {
        [] => Err(StratlabError::NoAssets),
        [symbol] => {
            let bars = load_single(data_port, symbol, &ctx.settings)?;
            let mut engine = SimulationEngine::new(symbol.clone(), &EnglishLabels);
            engine.load_prices(bars);
            optimizer.quick_optimize(&engine, ctx.settings.investment, &mut report)
        }
        _ => {
            let assets = load_assets(data_port, symbols, &ctx.settings)?;
            optimizer.multi_asset_optimize(
                &assets,
                ctx.settings.investment,
                &EnglishLabels,
                &mut report,
            )
        }
    }
}

fn run_presets(config: Option<&Path>, category: Option<&str>) -> Result<String, StratlabError> {
    let ctx = build_context(config, &DataArgs::default())?;
    let filter: Option<Category> = category
        .map(|c| {
            c.parse().map_err(|reason| StratlabError::ConfigInvalid {
                section: "presets".into(),
                key: "category".into(),
                reason,
            })
        })
        .transpose()?;
    Ok(format_presets(&ctx.catalog, filter))
}

pub fn format_simulation(result: &SimulationResult) -> String {
    let mut out = format!(
        "{}: {:.2} -> {:.2} ({:+.2}%), max drawdown {:.2}%\n",
        result.symbol,
        result.initial_value,
        result.final_value,
        result.profit_percentage,
        result.max_drawdown
    );
    out.push_str(&format!(
        "{} buys, {} sells, {} skipped\n",
        result.buys,
        result.sells,
        result.skipped()
    ));
    for t in &result.transactions {
        out.push_str(&format!(
            "  {} {:<9} @ {:>10.2}  cash {:>12.2}  units {:>12.4}  {}\n",
            t.date,
            t.event_type.to_string(),
            t.price, t.cash_after, t.position_after, t.reason
        ));
    }
    out.trim_end().to_string()
}

pub fn format_unified(result: &UnifiedResult) -> String {
    let mut out = format!(
        "portfolio: {:.2} -> {:.2} ({:+.2}%), cash {:.2}\n",
        result.initial_cash, result.final_value, result.profit_percentage, result.final_cash
    );
    for asset in &result.assets {
        out.push_str(&format!(
            "  {:<8} units {:>12.4}  last {:>10.2}  value {:>12.2}  buys {} sells {} skipped {}\n",
            asset.symbol,
            asset.units,
            asset.last_price,
            asset.value,
            asset.buys,
            asset.sells,
            asset.skipped
        ));
    }
    for e in &result.events {
        out.push_str(&format!(
            "  {} {:<8} {:<9} @ {:>10.2}  cash {:>12.2}  value {:>12.2}  {}\n",
            e.date,
            e.symbol,
            e.event_type.to_string(),
            e.price,
            e.cash_after,
            e.portfolio_value_after,
            e.reason
        ));
    }
    out.trim_end().to_string()
}

pub fn format_analysis(symbol: &str, analysis: &MarketAnalysis) -> String {
    let categories: Vec<String> = analysis
        .recommended_categories
        .iter()
        .map(|c| c.to_string())
        .collect();
    format!(
        "{}: {}\ntrend strength {:.0}\nrecommended: {}",
        symbol,
        analysis.summary,
        analysis.trend_strength,
        categories.join(", ")
    )
}

pub fn format_optimization(results: &[OptimizationResult]) -> String {
    if results.is_empty() {
        return "no successful candidates".to_string();
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{:>2}. {:+8.2}%  {:>12.2}  {:>4} trades  {}",
                i + 1,
                r.profit_percentage,
                r.final_value,
                r.trades,
                r.label
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_presets(catalog: &PresetCatalog, category: Option<Category>) -> String {
    catalog
        .iter()
        .filter(|p| category.is_none_or(|c| p.category == c))
        .map(|p| {
            let nodes: Vec<String> = p.nodes.iter().map(|n| n.to_string()).collect();
            format!(
                "{:<20} {:<24} {:<10} {:<6}  {}",
                p.id,
                p.name,
                p.category.to_string(),
                p.risk_level.to_string(),
                nodes.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
