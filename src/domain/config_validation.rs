//! Configuration validation.
//!
//! Turns the `[simulation]` and `[optimizer]` sections into typed settings,
//! rejecting values the engines cannot run with. Missing keys fall back to
//! defaults; present but malformed keys are errors.

use crate::domain::error::StratlabError;
use crate::domain::optimizer::OptimizerConfig;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub const DEFAULT_INVESTMENT: f64 = 10_000.0;
pub const DEFAULT_DATA_DIR: &str = "data";

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    pub investment: f64,
    pub data_dir: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> StratlabError {
    StratlabError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn present(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_count(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
    min: usize,
) -> Result<usize, StratlabError> {
    let Some(raw) = present(config, section, key) else {
        return Ok(default);
    };
    let value: usize = raw
        .parse()
        .map_err(|_| invalid(section, key, format!("{} must be a whole number", key)))?;
    if value < min {
        return Err(invalid(
            section,
            key,
            format!("{} must be at least {}", key, min),
        ));
    }
    Ok(value)
}

fn read_date(
    config: &dyn ConfigPort,
    key: &str,
    default: NaiveDate,
) -> Result<NaiveDate, StratlabError> {
    match present(config, "simulation", key) {
        None => Ok(default),
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|_| {
            invalid(
                "simulation",
                key,
                format!("invalid {} format, expected YYYY-MM-DD", key),
            )
        }),
    }
}

pub fn build_simulation_settings(
    config: &dyn ConfigPort,
) -> Result<SimulationSettings, StratlabError> {
    let investment = match present(config, "simulation", "investment") {
        None => DEFAULT_INVESTMENT,
        Some(raw) => raw
            .parse::<f64>()
            .map_err(|_| invalid("simulation", "investment", "investment must be a number"))?,
    };
    if !investment.is_finite() || investment <= 0.0 {
        return Err(invalid(
            "simulation",
            "investment",
            "investment must be positive",
        ));
    }

    let start_date = read_date(config, "start_date", NaiveDate::MIN)?;
    let end_date = read_date(config, "end_date", NaiveDate::MAX)?;
    if start_date > end_date {
        return Err(invalid(
            "simulation",
            "start_date",
            "start_date must not be after end_date",
        ));
    }

    Ok(SimulationSettings {
        investment,
        data_dir: present(config, "simulation", "data_dir")
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        start_date,
        end_date,
    })
}

pub fn build_optimizer_config(config: &dyn ConfigPort) -> Result<OptimizerConfig, StratlabError> {
    let defaults = OptimizerConfig::default();
    Ok(OptimizerConfig {
        top_n: read_count(config, "optimizer", "top_n", defaults.top_n, 1)?,
        single_batch: read_count(config, "optimizer", "single_batch", defaults.single_batch, 1)?,
        multi_batch: read_count(config, "optimizer", "multi_batch", defaults.multi_batch, 1)?,
        phase3_seeds: read_count(config, "optimizer", "phase3_seeds", defaults.phase3_seeds, 0)?,
        max_stop_protections: read_count(
            config,
            "optimizer",
            "max_stop_protections",
            defaults.max_stop_protections,
            0,
        )?,
        max_take_profit_protections: read_count(
            config,
            "optimizer",
            "max_take_profit_protections",
            defaults.max_take_profit_protections,
            0,
        )?,
    })
}

/// External preset file, if one is configured.
pub fn catalog_path(config: &dyn ConfigPort) -> Option<String> {
    present(config, "catalog", "path")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use approx::assert_relative_eq;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = make_config("");
        let settings = build_simulation_settings(&config).unwrap();
        assert_relative_eq!(settings.investment, DEFAULT_INVESTMENT);
        assert_eq!(settings.data_dir, "data");
        assert_eq!(settings.start_date, NaiveDate::MIN);
        assert_eq!(build_optimizer_config(&config).unwrap(), OptimizerConfig::default());
        assert_eq!(catalog_path(&config), None);
    }

    #[test]
    fn full_config_is_read() {
        let config = make_config(
            r#"
[simulation]
investment = 2500
data_dir = /srv/prices
start_date = 2021-01-01
end_date = 2023-12-31

[optimizer]
top_n = 5
single_batch = 10
multi_batch = 2
phase3_seeds = 0
max_stop_protections = 1
max_take_profit_protections = 2

[catalog]
path = presets/mine.ini
"#,
        );
        let settings = build_simulation_settings(&config).unwrap();
        assert_relative_eq!(settings.investment, 2500.0);
        assert_eq!(settings.data_dir, "/srv/prices");
        assert_eq!(
            settings.end_date,
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap()
        );

        let optimizer = build_optimizer_config(&config).unwrap();
        assert_eq!(optimizer.top_n, 5);
        assert_eq!(optimizer.single_batch, 10);
        assert_eq!(optimizer.multi_batch, 2);
        assert_eq!(optimizer.phase3_seeds, 0);
        assert_eq!(optimizer.max_stop_protections, 1);
        assert_eq!(optimizer.max_take_profit_protections, 2);
        assert_eq!(catalog_path(&config).as_deref(), Some("presets/mine.ini"));
    }

    #[test]
    fn investment_must_be_positive() {
        for value in ["0", "-100", "lots"] {
            let config = make_config(&format!("[simulation]\ninvestment = {}\n", value));
            let err = build_simulation_settings(&config).unwrap_err();
            assert!(
                matches!(err, StratlabError::ConfigInvalid { ref key, .. } if key == "investment"),
                "{value}"
            );
        }
    }

    #[test]
    fn dates_must_be_ordered_and_well_formed() {
        let config = make_config("[simulation]\nstart_date = 2024-01-01\nend_date = 2023-01-01\n");
        let err = build_simulation_settings(&config).unwrap_err();
        assert!(matches!(err, StratlabError::ConfigInvalid { ref key, .. } if key == "start_date"));

        let config = make_config("[simulation]\nend_date = 31/12/2023\n");
        let err = build_simulation_settings(&config).unwrap_err();
        assert!(matches!(err, StratlabError::ConfigInvalid { ref key, .. } if key == "end_date"));
    }

    #[test]
    fn batch_sizes_must_be_at_least_one() {
        let config = make_config("[optimizer]\nsingle_batch = 0\n");
        let err = build_optimizer_config(&config).unwrap_err();
        assert!(
            matches!(err, StratlabError::ConfigInvalid { ref key, .. } if key == "single_batch")
        );

        let config = make_config("[optimizer]\ntop_n = 0\n");
        assert!(build_optimizer_config(&config).is_err());
    }

    #[test]
    fn malformed_counts_are_rejected() {
        let config = make_config("[optimizer]\nmulti_batch = three\n");
        let err = build_optimizer_config(&config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid config value [optimizer] multi_batch: multi_batch must be a whole number"
        );
    }
}
