//! Opening range ("initial balance") built from the range window of a day.

use chrono::{NaiveDate, NaiveTime};

use crate::domain::bar::Bar;
use crate::domain::session::DaySkip;

#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub date: NaiveDate,
    pub window_start: NaiveTime,
    pub window_end: NaiveTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub size: f64,
    pub bar_count: usize,
}

impl Range {
    /// Range size as a percentage of the range low.
    pub fn size_pct(&self) -> f64 {
        if self.low > 0.0 {
            self.size / self.low * 100.0
        } else {
            0.0
        }
    }
}

/// Build the range from the bars inside `[window_start, window_end)`.
///
/// Fewer than `min_bars` bars or a zero-size range skip the day.
pub fn build_range(
    date: NaiveDate,
    window_start: NaiveTime,
    window_end: NaiveTime,
    window: &[Bar],
    min_bars: usize,
) -> Result<Range, DaySkip> {
    if window.is_empty() || window.len() < min_bars {
        return Err(DaySkip::InsufficientRangeBars {
            bars: window.len(),
            minimum: min_bars,
        });
    }

    let high = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    let size = high - low;

    if size <= 0.0 {
        return Err(DaySkip::DegenerateRange);
    }

    Ok(Range {
        date,
        window_start,
        window_end,
        open: window[0].open,
        high,
        low,
        close: window[window.len() - 1].close,
        size,
        bar_count: window.len(),
    })
}
