//! Session calendar and day segmentation.
//!
//! Splits a continuous one-minute series into calendar trading days, drops
//! bars outside the regular session, flags anomalous days, and admits a day
//! into a variant's pipeline by applying its [`DayFilters`] and building the
//! opening [`Range`].

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::bar::Bar;
use crate::domain::range::{build_range, Range};
use crate::domain::strategy::DayFilters;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionCalendar {
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub range_minutes: u32,
    pub min_range_bars: usize,
    pub holidays: BTreeSet<NaiveDate>,
}

impl Default for SessionCalendar {
    fn default() -> Self {
        SessionCalendar {
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN),
            range_minutes: 30,
            min_range_bars: 15,
            holidays: BTreeSet::new(),
        }
    }
}

impl SessionCalendar {
    pub fn range_window_end(&self) -> NaiveTime {
        self.open + Duration::minutes(i64::from(self.range_minutes))
    }

    pub fn in_session(&self, time: NaiveTime) -> bool {
        time >= self.open && time < self.close
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }
}

/// Bars of one session, chronological and validated.
#[derive(Debug, Clone, PartialEq)]
pub struct TradingDay {
    pub date: NaiveDate,
    pub bars: Vec<Bar>,
}

impl TradingDay {
    /// Index of the first bar at or after `time`, or `bars.len()`.
    pub fn index_at(&self, time: NaiveTime) -> usize {
        self.bars.partition_point(|b| b.time() < time)
    }

    pub fn range_window(&self, calendar: &SessionCalendar) -> &[Bar] {
        let start = self.index_at(calendar.open);
        let end = self.index_at(calendar.range_window_end());
        &self.bars[start..end]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnomalyKind {
    NonMonotonic { at: NaiveDateTime },
    MalformedBar { at: NaiveDateTime },
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::NonMonotonic { at } => write!(f, "non-monotonic timestamp at {at}"),
            AnomalyKind::MalformedBar { at } => write!(f, "malformed OHLC at {at}"),
        }
    }
}

/// Why a day did not enter a variant's pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DaySkip {
    #[error("holiday")]
    Holiday,

    #[error("weekday {0} filtered")]
    Weekday(Weekday),

    #[error("range window has {bars} bars, need {minimum}")]
    InsufficientRangeBars { bars: usize, minimum: usize },

    #[error("degenerate zero-size range")]
    DegenerateRange,

    #[error("range size {size:.4} outside configured bounds")]
    RangeOutOfBounds { size: f64 },

    #[error("{0}")]
    Anomaly(AnomalyKind),
}

impl DaySkip {
    /// Short stable label used to group skip counts.
    pub fn label(&self) -> &'static str {
        match self {
            DaySkip::Holiday => "holiday",
            DaySkip::Weekday(_) => "weekday",
            DaySkip::InsufficientRangeBars { .. } => "thin_range",
            DaySkip::DegenerateRange => "degenerate_range",
            DaySkip::RangeOutOfBounds { .. } => "range_bounds",
            DaySkip::Anomaly(_) => "anomaly",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDay {
    pub date: NaiveDate,
    pub reason: DaySkip,
}

/// Output of [`segment_days`]: admissible days plus calendar-level skips.
#[derive(Debug, Clone, Default)]
pub struct Segmentation {
    pub days: Vec<TradingDay>,
    pub skipped: Vec<SkippedDay>,
}

impl Segmentation {
    pub fn anomalies(&self) -> impl Iterator<Item = &SkippedDay> {
        self.skipped
            .iter()
            .filter(|s| matches!(s.reason, DaySkip::Anomaly(_)))
    }
}

/// Group bars by calendar date, keep in-session bars, and validate each day.
///
/// Input order within a day is preserved so that out-of-order or duplicated
/// timestamps are detected rather than silently repaired.
pub fn segment_days(bars: &[Bar], calendar: &SessionCalendar) -> Segmentation {
    let mut by_date: BTreeMap<NaiveDate, Vec<Bar>> = BTreeMap::new();
    for bar in bars {
        if calendar.in_session(bar.time()) {
            by_date.entry(bar.date()).or_default().push(bar.clone());
        }
    }

    let mut segmentation = Segmentation::default();

    for (date, day_bars) in by_date {
        if calendar.is_holiday(date) {
            segmentation.skipped.push(SkippedDay {
                date,
                reason: DaySkip::Holiday,
            });
            continue;
        }

        if let Some(kind) = find_anomaly(&day_bars) {
            tracing::warn!("skipping {date}: {kind}");
            segmentation.skipped.push(SkippedDay {
                date,
                reason: DaySkip::Anomaly(kind),
            });
            continue;
        }

        segmentation.days.push(TradingDay {
            date,
            bars: day_bars,
        });
    }

    segmentation
}

fn find_anomaly(bars: &[Bar]) -> Option<AnomalyKind> {
    if let Some(bad) = bars.iter().find(|b| !b.is_well_formed()) {
        return Some(AnomalyKind::MalformedBar { at: bad.timestamp });
    }
    bars.windows(2)
        .find(|w| w[1].timestamp <= w[0].timestamp)
        .map(|w| AnomalyKind::NonMonotonic {
            at: w[1].timestamp,
        })
}

/// Apply a variant's day filters and build the day's range.
pub fn admit_day(
    day: &TradingDay,
    calendar: &SessionCalendar,
    filters: &DayFilters,
) -> Result<Range, DaySkip> {
    let weekday = day.date.weekday();
    if filters.skip_weekdays.contains(&weekday) {
        return Err(DaySkip::Weekday(weekday));
    }

    let range = build_range(
        day.date,
        calendar.open,
        calendar.range_window_end(),
        day.range_window(calendar),
        calendar.min_range_bars,
    )?;

    let too_small = filters.min_range.is_some_and(|m| range.size < m)
        || filters.min_range_pct.is_some_and(|m| range.size_pct() < m);
    let too_large = filters.max_range.is_some_and(|m| range.size > m)
        || filters.max_range_pct.is_some_and(|m| range.size_pct() > m);
    if too_small || too_large {
        return Err(DaySkip::RangeOutOfBounds { size: range.size });
    }

    Ok(range)
}
