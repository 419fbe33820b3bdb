//! Bar source port trait.

use crate::domain::bar::Bar;
use crate::domain::error::RangetraderError;
use chrono::NaiveDate;

pub trait DataPort {
    /// One-minute bars for `symbol` with dates in `[start, end]`, in source order.
    ///
    /// Implementations must not reorder or deduplicate: ordering problems are
    /// detected downstream and reported per day.
    fn fetch_bars(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, RangetraderError>;

    /// First date, last date and bar count available for `symbol`.
    fn data_range(&self, symbol: &str) -> Result<Option<(NaiveDate, NaiveDate, usize)>, RangetraderError>;
}
