//! Equity curve statistics.

use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Drawdown {
    /// Largest peak-to-trough decline, in percent of the peak.
    pub max_percent: f64,
    /// Longest run of bars spent below a prior peak.
    pub max_duration: usize,
}

pub fn compute_drawdown(equity_curve: &[EquityPoint]) -> Drawdown {
    let Some(first) = equity_curve.first() else {
        return Drawdown::default();
    };

    let mut peak = first.value;
    let mut max_dd = 0.0_f64;
    let mut max_duration = 0usize;
    let mut current_duration = 0usize;

    for point in equity_curve {
        if point.value >= peak {
            peak = point.value;
            current_duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - point.value) / peak;
            max_dd = max_dd.max(dd);
            current_duration += 1;
            max_duration = max_duration.max(current_duration);
        }
    }

    Drawdown {
        max_percent: max_dd * 100.0,
        max_duration,
    }
}
