//! Confluence zones used to gate pullback and breakout entries.
//!
//! Two independent zone sources:
//! - Fibonacci retracement bands of the swing from the opposite range extreme
//!   to the most extreme post-breakout price.
//! - Fair-Value-Gap imbalances found in bars resampled to an auxiliary
//!   timeframe (bullish: `c3.low > c1.high`, bearish: `c1.low > c3.high`).
//!
//! Everything here is read-only and computed from the bars handed in; callers
//! pass only bars strictly before the candidate bar.

use chrono::{NaiveTime, Timelike};

use crate::domain::bar::Bar;
use crate::domain::range::Range;
use crate::domain::strategy::{ConfluenceConfig, Direction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneKind {
    Fibonacci,
    FairValueGap,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfluenceZone {
    pub kind: ZoneKind,
    pub low: f64,
    pub high: f64,
    pub weight: f64,
}

impl ConfluenceZone {
    pub fn contains(&self, price: f64) -> bool {
        self.low <= price && price <= self.high
    }
}

/// Retracement bands between `anchor` (swing origin) and `extreme` (swing end).
pub fn fibonacci_zones(
    direction: Direction,
    anchor: f64,
    extreme: f64,
    config: &ConfluenceConfig,
) -> Vec<ConfluenceZone> {
    let swing = (extreme - anchor).abs();
    if swing <= 0.0 {
        return Vec::new();
    }
    let band = swing * config.fib_band_pct / 100.0;

    config
        .fib_levels
        .iter()
        .map(|ratio| {
            let level = extreme - direction.sign() * swing * ratio;
            ConfluenceZone {
                kind: ZoneKind::Fibonacci,
                low: level - band,
                high: level + band,
                weight: config.fib_weight,
            }
        })
        .collect()
}

/// Aggregate one-minute bars into `minutes`-wide buckets aligned to `origin`.
///
/// Only buckets that end at or before `cutoff` are returned.
pub fn resample(bars: &[Bar], origin: NaiveTime, minutes: u32, cutoff: NaiveTime) -> Vec<Bar> {
    let width = i64::from(minutes.max(1));
    let origin_min = i64::from(origin.num_seconds_from_midnight() / 60);
    let cutoff_min = i64::from(cutoff.num_seconds_from_midnight() / 60);

    let mut out: Vec<Bar> = Vec::new();
    let mut current_bucket: Option<i64> = None;

    for bar in bars {
        let minute = i64::from(bar.time().num_seconds_from_midnight() / 60);
        if minute < origin_min {
            continue;
        }
        let bucket = (minute - origin_min) / width;
        if origin_min + (bucket + 1) * width > cutoff_min {
            break;
        }

        match (current_bucket, out.last_mut()) {
            (Some(b), Some(agg)) if b == bucket => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume = match (agg.volume, bar.volume) {
                    (Some(a), Some(v)) => Some(a + v),
                    (a, v) => a.or(v),
                };
            }
            _ => {
                out.push(bar.clone());
                current_bucket = Some(bucket);
            }
        }
    }

    out
}

/// Three-bar imbalances pointing in `direction`.
pub fn fair_value_gaps(
    bars: &[Bar],
    direction: Direction,
    config: &ConfluenceConfig,
) -> Vec<ConfluenceZone> {
    bars.windows(3)
        .filter_map(|w| {
            let (c1, c3) = (&w[0], &w[2]);
            let (low, high) = match direction {
                Direction::Long if c3.low > c1.high => (c1.high, c3.low),
                Direction::Short if c1.low > c3.high => (c3.high, c1.low),
                _ => return None,
            };
            let gap_pct = (high - low) / w[1].close * 100.0;
            (gap_pct >= config.fvg_min_gap_pct).then_some(ConfluenceZone {
                kind: ZoneKind::FairValueGap,
                low,
                high,
                weight: config.fvg_weight,
            })
        })
        .collect()
}

/// All zones visible before a candidate bar.
///
/// `history` holds the day's session bars strictly before the candidate.
pub fn zones_for(
    direction: Direction,
    range: &Range,
    history: &[Bar],
    cutoff: NaiveTime,
    config: &ConfluenceConfig,
) -> Vec<ConfluenceZone> {
    let post_breakout = history.iter().filter(|b| b.time() >= range.window_end);
    let (anchor, extreme) = match direction {
        Direction::Long => (
            range.low,
            post_breakout.map(|b| b.high).fold(range.high, f64::max),
        ),
        Direction::Short => (
            range.high,
            post_breakout.map(|b| b.low).fold(range.low, f64::min),
        ),
    };

    let mut zones = fibonacci_zones(direction, anchor, extreme, config);
    let aux = resample(history, range.window_start, config.fvg_timeframe_minutes, cutoff);
    zones.extend(fair_value_gaps(&aux, direction, config));
    zones
}

/// Sum of the weights of every zone containing `price`.
pub fn score(zones: &[ConfluenceZone], price: f64) -> f64 {
    zones
        .iter()
        .filter(|z| z.contains(price))
        .map(|z| z.weight)
        .sum()
}

pub fn is_confluent(zones: &[ConfluenceZone], price: f64, config: &ConfluenceConfig) -> bool {
    let s = score(zones, price);
    s > 0.0 && s >= config.min_score
}
