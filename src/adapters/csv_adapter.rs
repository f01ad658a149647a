//! CSV file data adapter.
//!
//! One file per symbol, `<dir>/<SYMBOL>.csv`, with a header row and the
//! columns `date,open,high,low,close,volume`. Malformed rows are skipped
//! with a warning rather than failing the whole series.

use crate::domain::bar::Bar;
use crate::domain::error::StratlabError;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }
}

fn parse_row(record: &csv::StringRecord) -> Result<Bar, String> {
    let field = |idx: usize, name: &str| {
        record
            .get(idx)
            .map(str::trim)
            .ok_or_else(|| format!("missing {} column", name))
    };
    let number = |idx: usize, name: &str| -> Result<f64, String> {
        let value: f64 = field(idx, name)?
            .parse()
            .map_err(|e| format!("invalid {} value: {}", name, e))?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(format!("non-finite {} value", name))
        }
    };

    let date = NaiveDate::parse_from_str(field(0, "date")?, "%Y-%m-%d")
        .map_err(|e| format!("invalid date: {}", e))?;
    let close = number(4, "close")?;
    if close <= 0.0 {
        return Err(format!("non-positive close {}", close));
    }

    Ok(Bar {
        date,
        open: number(1, "open")?,
        high: number(2, "high")?,
        low: number(3, "low")?,
        close,
        volume: number(5, "volume")?,
    })
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, StratlabError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StratlabError::NoData {
                symbol: symbol.to_string(),
            },
            _ => StratlabError::Data {
                reason: format!("failed to read {}: {}", path.display(), e),
            },
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| StratlabError::Data {
                reason: format!("CSV parse error in {}: {}", path.display(), e),
            })?;

            match parse_row(&record) {
                Ok(bar) if bar.date >= start_date && bar.date <= end_date => bars.push(bar),
                Ok(_) => {}
                Err(reason) => {
                    // header is line 1
                    warn!(symbol, line = line + 2, %reason, "skipping CSV row");
                }
            }
        }

        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        debug!(symbol, bars = bars.len(), "loaded price history");
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, StratlabError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| StratlabError::Data {
            reason: format!("failed to read {}: {}", self.base_path.display(), e),
        })?;

        let mut symbols: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension()? != "csv" {
                    return None;
                }
                path.file_stem()?.to_str().map(str::to_string)
            })
            .collect();
        symbols.sort();
        Ok(symbols)
    }
}
