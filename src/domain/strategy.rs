//! Strategy configuration: one immutable value per named variant.
//!
//! Every behavioural switch is a closed enum selected by pattern matching.
//! Values are built and validated once by
//! [`crate::domain::config_validation`] before any simulation runs.

use chrono::{NaiveTime, Weekday};
use serde::Serialize;
use std::fmt;

use crate::domain::range::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    #[serde(rename = "LONG")]
    Long,
    #[serde(rename = "SHORT")]
    Short,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Signed percentage move from `entry` to `price`, positive when favourable.
    pub fn pnl_pct(self, entry: f64, price: f64) -> f64 {
        self.sign() * (price - entry) / entry * 100.0
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionFilter {
    Both,
    LongOnly,
    ShortOnly,
}

impl DirectionFilter {
    pub fn allows(self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (DirectionFilter::Both, _)
                | (DirectionFilter::LongOnly, Direction::Long)
                | (DirectionFilter::ShortOnly, Direction::Short)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryMode {
    /// Enter at the close of the first bar closing outside the range.
    Breakout,
    /// Wait for a retracement to `depth` of the range size back into the range.
    Pullback { depth: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopMode {
    /// Opposite range boundary.
    StructuralOpposite,
    /// Percentage of the entry price.
    FixedPct(f64),
    /// Half the range size away from the entry.
    HalfRange,
}

/// How each tier's `target` value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeProfitMode {
    FixedPct,
    RMultiple,
    DynamicRangeFraction,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tier {
    pub size_fraction: f64,
    pub target: f64,
}

/// Which exit wins when stop and target are both touched inside one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPrecedence {
    StopFirst,
    TargetFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyExitOrder {
    BeforeTarget,
    AfterTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyExit {
    None,
    /// A bar closing back inside the range closes the position at that close.
    CloseInsideRange { order: EarlyExitOrder },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DayFilters {
    pub skip_weekdays: Vec<Weekday>,
    pub min_range: Option<f64>,
    pub max_range: Option<f64>,
    pub min_range_pct: Option<f64>,
    pub max_range_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfluenceConfig {
    pub min_score: f64,
    pub fib_levels: Vec<f64>,
    /// Half-width of each Fibonacci band as a percentage of the swing size.
    pub fib_band_pct: f64,
    pub fib_weight: f64,
    pub fvg_timeframe_minutes: u32,
    pub fvg_weight: f64,
    /// Minimum gap size as a percentage of price.
    pub fvg_min_gap_pct: f64,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        ConfluenceConfig {
            min_score: 1.0,
            fib_levels: vec![0.382, 0.5, 0.618, 0.786],
            fib_band_pct: 2.5,
            fib_weight: 1.0,
            fvg_timeframe_minutes: 5,
            fvg_weight: 1.0,
            fvg_min_gap_pct: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub name: String,
    pub entry_mode: EntryMode,
    pub direction: DirectionFilter,
    pub stop_mode: StopMode,
    pub take_profit_mode: TakeProfitMode,
    pub tiers: Vec<Tier>,
    pub hard_exit: NaiveTime,
    pub day_filters: DayFilters,
    pub confluence: Option<ConfluenceConfig>,
    pub exit_precedence: ExitPrecedence,
    pub early_exit: EarlyExit,
    pub breakeven_after_first_tier: bool,
    pub allow_reentry: bool,
    pub max_entries: usize,
    pub cost_pct: f64,
}

impl StrategyConfig {
    /// Plain breakout variant: structural stop, single 2R target.
    pub fn breakout(name: &str, hard_exit: NaiveTime) -> Self {
        StrategyConfig {
            name: name.to_string(),
            entry_mode: EntryMode::Breakout,
            direction: DirectionFilter::Both,
            stop_mode: StopMode::StructuralOpposite,
            take_profit_mode: TakeProfitMode::RMultiple,
            tiers: vec![Tier {
                size_fraction: 1.0,
                target: 2.0,
            }],
            hard_exit,
            day_filters: DayFilters::default(),
            confluence: None,
            exit_precedence: ExitPrecedence::StopFirst,
            early_exit: EarlyExit::None,
            breakeven_after_first_tier: false,
            allow_reentry: false,
            max_entries: 1,
            cost_pct: 0.0,
        }
    }

    pub fn stop_price(&self, direction: Direction, entry: f64, range: &Range) -> f64 {
        match (self.stop_mode, direction) {
            (StopMode::StructuralOpposite, Direction::Long) => range.low,
            (StopMode::StructuralOpposite, Direction::Short) => range.high,
            (StopMode::FixedPct(pct), dir) => entry * (1.0 - dir.sign() * pct / 100.0),
            (StopMode::HalfRange, dir) => entry - dir.sign() * range.size / 2.0,
        }
    }

    /// Target price for every tier, in tier order.
    pub fn tier_targets(&self, direction: Direction, entry: f64, stop: f64, range: &Range) -> Vec<f64> {
        let risk = (entry - stop).abs();
        self.tiers
            .iter()
            .map(|tier| {
                let distance = match self.take_profit_mode {
                    TakeProfitMode::FixedPct => entry * tier.target / 100.0,
                    TakeProfitMode::RMultiple => risk * tier.target,
                    TakeProfitMode::DynamicRangeFraction => range.size * tier.target,
                };
                entry + direction.sign() * distance
            })
            .collect()
    }
}
