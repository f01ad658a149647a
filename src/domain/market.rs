//! Market regime classifier.
//!
//! Labels a price series by trend, volatility, momentum, RSI level and
//! volume trend, and recommends the preset categories that suit it.

use crate::domain::bar::{closes, Bar};
use crate::domain::indicator::stddev::population_stddev;
use crate::domain::indicator::{percent_change, rsi};
use crate::domain::preset::Category;
use std::fmt;

const STRONG_TREND_PERCENT: f64 = 15.0;
const TREND_PERCENT: f64 = 5.0;
const MOMENTUM_PERCENT: f64 = 5.0;
const SHORT_TERM_FRACTION: f64 = 0.2;
const RECENT_VOLUME_BARS: usize = 7;
const BASELINE_VOLUME_BARS: usize = 23;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Trend {
    StrongUptrend,
    Uptrend,
    Sideways,
    Downtrend,
    StrongDowntrend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Volatility {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Momentum {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum RsiLevel {
    Oversold,
    Neutral,
    Overbought,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum VolumeTrend {
    Increasing,
    Stable,
    Decreasing,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Trend::StrongUptrend => "strong uptrend",
            Trend::Uptrend => "uptrend",
            Trend::Sideways => "sideways",
            Trend::Downtrend => "downtrend",
            Trend::StrongDowntrend => "strong downtrend",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Volatility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Volatility::Low => "low",
            Volatility::Medium => "medium",
            Volatility::High => "high",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Momentum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Momentum::Positive => "positive",
            Momentum::Neutral => "neutral",
            Momentum::Negative => "negative",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for RsiLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RsiLevel::Oversold => "oversold",
            RsiLevel::Neutral => "neutral",
            RsiLevel::Overbought => "overbought",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for VolumeTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VolumeTrend::Increasing => "increasing",
            VolumeTrend::Stable => "stable",
            VolumeTrend::Decreasing => "decreasing",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MarketAnalysis {
    pub trend: Trend,
    /// 0..=100, proportional to the overall move.
    pub trend_strength: f64,
    pub volatility: Volatility,
    pub momentum: Momentum,
    pub rsi_level: RsiLevel,
    pub volume_trend: VolumeTrend,
    pub overall_change: f64,
    pub short_term_change: f64,
    pub recommended_categories: Vec<Category>,
    pub summary: String,
}

fn change_percent(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        0.0
    } else {
        (to - from) / from * 100.0
    }
}

fn classify_trend(overall: f64, short_term: f64) -> Trend {
    if overall > STRONG_TREND_PERCENT && short_term > MOMENTUM_PERCENT {
        Trend::StrongUptrend
    } else if overall > TREND_PERCENT {
        Trend::Uptrend
    } else if overall < -STRONG_TREND_PERCENT && short_term < -MOMENTUM_PERCENT {
        Trend::StrongDowntrend
    } else if overall < -TREND_PERCENT {
        Trend::Downtrend
    } else {
        Trend::Sideways
    }
}

fn classify_volatility(close: &[f64]) -> Volatility {
    let changes = percent_change(close);
    let returns = changes.get(1..).unwrap_or(&[]);
    match population_stddev(returns) {
        Some(sd) if sd < 2.0 => Volatility::Low,
        Some(sd) if sd < 5.0 => Volatility::Medium,
        Some(_) => Volatility::High,
        None => Volatility::Low,
    }
}

fn classify_momentum(short_term: f64) -> Momentum {
    if short_term > MOMENTUM_PERCENT {
        Momentum::Positive
    } else if short_term < -MOMENTUM_PERCENT {
        Momentum::Negative
    } else {
        Momentum::Neutral
    }
}

fn classify_rsi(close: &[f64]) -> RsiLevel {
    let last = rsi(close, crate::domain::indicator::rsi::DEFAULT_PERIOD)
        .into_iter()
        .flatten()
        .last();
    match last {
        Some(value) if value < 30.0 => RsiLevel::Oversold,
        Some(value) if value > 70.0 => RsiLevel::Overbought,
        _ => RsiLevel::Neutral,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn classify_volume(bars: &[Bar]) -> VolumeTrend {
    if bars.len() <= RECENT_VOLUME_BARS {
        return VolumeTrend::Stable;
    }
    let split = bars.len() - RECENT_VOLUME_BARS;
    let baseline_start = split.saturating_sub(BASELINE_VOLUME_BARS);
    let recent: Vec<f64> = bars[split..].iter().map(|b| b.volume).collect();
    let baseline: Vec<f64> = bars[baseline_start..split].iter().map(|b| b.volume).collect();

    match (mean(&recent), mean(&baseline)) {
        (Some(r), Some(b)) if b > 0.0 => {
            let ratio = r / b;
            if ratio > 1.3 {
                VolumeTrend::Increasing
            } else if ratio < 0.7 {
                VolumeTrend::Decreasing
            } else {
                VolumeTrend::Stable
            }
        }
        _ => VolumeTrend::Stable,
    }
}

/// Categories suited to the regime, de-duplicated, protection always last.
pub fn recommend(
    trend: Trend,
    volatility: Volatility,
    momentum: Momentum,
    rsi_level: RsiLevel,
) -> Vec<Category> {
    let mut out: Vec<Category> = Vec::new();
    let mut push = |category: Category| {
        if !out.contains(&category) {
            out.push(category);
        }
    };

    match trend {
        Trend::StrongUptrend => {
            push(Category::Trend);
            push(Category::Momentum);
        }
        Trend::Uptrend => {
            push(Category::Trend);
            push(Category::Dca);
        }
        Trend::Sideways => {
            push(Category::Reversal);
            push(Category::Scalper);
            push(Category::Dca);
        }
        Trend::Downtrend => {
            push(Category::ValueDip);
            push(Category::Dca);
        }
        Trend::StrongDowntrend => {
            push(Category::ValueDip);
            push(Category::Reversal);
        }
    }
    if volatility == Volatility::High {
        push(Category::Volatility);
        push(Category::Scalper);
    }
    if momentum == Momentum::Positive {
        push(Category::Momentum);
    }
    match rsi_level {
        RsiLevel::Oversold => {
            push(Category::ValueDip);
            push(Category::Reversal);
            // bearish and oversold: rebound candidates
            if matches!(trend, Trend::Downtrend | Trend::StrongDowntrend) {
                push(Category::Momentum);
            }
        }
        RsiLevel::Overbought => push(Category::Reversal),
        RsiLevel::Neutral => {}
    }
    push(Category::Protection);
    out
}

fn build(
    trend: Trend,
    overall_change: f64,
    short_term_change: f64,
    volatility: Volatility,
    rsi_level: RsiLevel,
    volume_trend: VolumeTrend,
) -> MarketAnalysis {
    let momentum = classify_momentum(short_term_change);
    let recommended_categories = recommend(trend, volatility, momentum, rsi_level);
    let summary = format!(
        "{} ({:+.1}% overall, {:+.1}% recent), {} volatility, {} momentum, RSI {}, volume {}",
        trend,
        overall_change,
        short_term_change,
        volatility,
        momentum,
        rsi_level,
        volume_trend
    );
    MarketAnalysis {
        trend,
        trend_strength: (overall_change.abs() / STRONG_TREND_PERCENT * 100.0).min(100.0),
        volatility,
        momentum,
        rsi_level,
        volume_trend,
        overall_change,
        short_term_change,
        recommended_categories,
        summary,
    }
}

pub fn analyze(bars: &[Bar]) -> MarketAnalysis {
    if bars.len() < 2 {
        return build(
            Trend::Sideways,
            0.0,
            0.0,
            Volatility::Medium,
            RsiLevel::Neutral,
            VolumeTrend::Stable,
        );
    }

    let close = closes(bars);
    let n = close.len();
    let overall = change_percent(close[0], close[n - 1]);

    let window = ((n as f64 * SHORT_TERM_FRACTION).ceil() as usize).clamp(2, n);
    let short_term = change_percent(close[n - window], close[n - 1]);

    build(
        classify_trend(overall, short_term),
        overall,
        short_term,
        classify_volatility(&close),
        classify_rsi(&close),
        classify_volume(bars),
    )
}
