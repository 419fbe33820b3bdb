//! Immutable trade records produced from closed positions.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;

use crate::domain::position::Position;
use crate::domain::range::Range;
use crate::domain::strategy::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ExitReason {
    #[serde(rename = "SL")]
    StopLoss,
    #[serde(rename = "TP")]
    TakeProfit,
    #[serde(rename = "TIME")]
    Time,
    #[serde(rename = "INVALIDATED")]
    Invalidated,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "SL",
            ExitReason::TakeProfit => "TP",
            ExitReason::Time => "TIME",
            ExitReason::Invalidated => "INVALIDATED",
        };
        f.write_str(s)
    }
}

/// One row of the trade table. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub date: NaiveDate,
    pub variant: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub exit_price: f64,
    pub exit_time: NaiveDateTime,
    pub exit_reason: ExitReason,
    pub pnl_pct: f64,
    pub mae_pct: f64,
    pub mfe_pct: f64,
    pub tiers_hit: usize,
    pub range_high: f64,
    pub range_low: f64,
    pub r_multiple: f64,
    pub bars_held: usize,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl_pct > 0.0
    }
}

/// Convert a closed position into a [`Trade`].
///
/// `pnl_pct` is the size-weighted sum of every fill's return minus
/// `cost_pct`; the exit price, time and reason come from the final fill.
/// Returns `None` while the position is still open.
pub fn record_trade(position: &Position, variant: &str, range: &Range, cost_pct: f64) -> Option<Trade> {
    if position.is_open() {
        return None;
    }
    let last = position.last_fill()?;

    let entry = position.entry_price;
    let direction = position.direction;

    let gross_pct: f64 = position
        .fills
        .iter()
        .map(|f| f.fraction * direction.pnl_pct(entry, f.price))
        .sum();
    let achieved: f64 = position
        .fills
        .iter()
        .map(|f| f.fraction * direction.sign() * (f.price - entry))
        .sum();
    let risk = position.risk();
    let r_multiple = if risk > 0.0 { achieved / risk } else { 0.0 };

    Some(Trade {
        date: range.date,
        variant: variant.to_string(),
        direction,
        entry_price: entry,
        entry_time: position.entry_time,
        exit_price: last.price,
        exit_time: last.time,
        exit_reason: last.reason,
        pnl_pct: gross_pct - cost_pct,
        mae_pct: position.mae_pct,
        mfe_pct: position.mfe_pct,
        tiers_hit: position.tiers_hit(),
        range_high: range.high,
        range_low: range.low,
        r_multiple,
        bars_held: position.bars_held,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bar::Bar;
    use crate::domain::entry::EntrySignal;
    use crate::domain::strategy::{StrategyConfig, Tier};
    use approx::assert_relative_eq;
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_time(t(h, m))
    }

    fn bar(h: u32, m: u32, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: at(h, m),
            open: close.clamp(low, high),
            high,
            low,
            close,
            volume: None,
        }
    }

    fn range() -> Range {
        Range {
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            window_start: t(9, 30),
            window_end: t(10, 0),
            open: 101.0,
            high: 105.0,
            low: 100.0,
            close: 104.0,
            size: 5.0,
            bar_count: 30,
        }
    }

    fn signal(direction: Direction, price: f64) -> EntrySignal {
        EntrySignal {
            direction,
            price,
            time: at(10, 5),
            bar_index: 0,
            breakout_index: 0,
        }
    }

    #[test]
    fn open_position_is_not_recorded() {
        let cfg = StrategyConfig::breakout("orb", t(15, 55));
        let pos = Position::open(&signal(Direction::Long, 106.0), &cfg, &range());
        assert!(record_trade(&pos, "orb", &range(), 0.0).is_none());
    }

    #[test]
    fn stop_loss_trade_metrics() {
        let cfg = StrategyConfig::breakout("orb", t(15, 55));
        let mut pos = Position::open(&signal(Direction::Long, 106.0), &cfg, &range());
        pos.on_bar(&bar(10, 6, 106.5, 99.9, 100.1), &cfg, &range());
        let trade = record_trade(&pos, "orb", &range(), 0.0).unwrap();

        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(trade.exit_price, 100.0);
        assert_relative_eq!(trade.pnl_pct, -6.0 / 106.0 * 100.0);
        assert!((trade.pnl_pct - (-5.66)).abs() < 0.01);
        assert_relative_eq!(trade.r_multiple, -1.0);
        assert_eq!(trade.tiers_hit, 0);
        assert_eq!(trade.range_high, 105.0);
        assert_eq!(trade.range_low, 100.0);
        assert_eq!(trade.bars_held, 1);
        assert!(!trade.is_win());
    }

    #[test]
    fn blended_pnl_across_tiers_with_cost() {
        let cfg = StrategyConfig {
            tiers: vec![
                Tier {
                    size_fraction: 0.5,
                    target: 1.0,
                },
                Tier {
                    size_fraction: 0.5,
                    target: 2.0,
                },
            ],
            ..StrategyConfig::breakout("tiered", t(15, 55))
        };
        let mut pos = Position::open(&signal(Direction::Short, 99.0), &cfg, &range());
        // stop 105, risk 6, targets 93 and 87
        pos.on_bar(&bar(10, 6, 99.5, 92.5, 93.0), &cfg, &range());
        pos.on_bar(&bar(15, 55, 94.0, 92.0, 93.5), &cfg, &range());
        let trade = record_trade(&pos, "tiered", &range(), 0.1).unwrap();

        assert_eq!(trade.exit_reason, ExitReason::Time);
        assert_eq!(trade.exit_price, 93.5);
        assert_eq!(trade.tiers_hit, 1);
        let expected = 0.5 * (6.0 / 99.0 * 100.0) + 0.5 * (5.5 / 99.0 * 100.0) - 0.1;
        assert_relative_eq!(trade.pnl_pct, expected, epsilon = 1e-12);
        assert_relative_eq!(trade.r_multiple, (0.5 * 6.0 + 0.5 * 5.5) / 6.0, epsilon = 1e-12);
    }

    #[test]
    fn exit_reason_display_matches_table_codes() {
        assert_eq!(ExitReason::StopLoss.to_string(), "SL");
        assert_eq!(ExitReason::TakeProfit.to_string(), "TP");
        assert_eq!(ExitReason::Time.to_string(), "TIME");
        assert_eq!(ExitReason::Invalidated.to_string(), "INVALIDATED");
    }
}
