//! Price history access port trait.

use crate::domain::bar::Bar;
use crate::domain::error::StratlabError;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `symbol` within `[start_date, end_date]`, ascending by date.
    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, StratlabError>;

    fn list_symbols(&self) -> Result<Vec<String>, StratlabError>;
}
