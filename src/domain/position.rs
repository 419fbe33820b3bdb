//! Open position management.
//!
//! A [`Position`] is owned by the day simulation from the fill until it is
//! fully closed. Each bar after the fill bar is processed in this order:
//!
//! 1. excursion update (MAE/MFE, both non-negative and non-decreasing)
//! 2. stop check (under [`ExitPrecedence::StopFirst`])
//! 3. early exit, when configured to run before targets
//! 4. take-profit tiers
//! 5. stop check (under [`ExitPrecedence::TargetFirst`])
//! 6. early exit, when configured to run after targets
//! 7. hard-exit time
//!
//! Every fill happens at an exact level: stop fills at the stop price, tier
//! fills at the tier target, early and time exits at the bar close.

use chrono::NaiveDateTime;

use crate::domain::bar::Bar;
use crate::domain::entry::EntrySignal;
use crate::domain::range::Range;
use crate::domain::strategy::{
    Direction, EarlyExit, EarlyExitOrder, ExitPrecedence, StrategyConfig,
};
use crate::domain::trade::ExitReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    pub price: f64,
    pub fraction: f64,
    pub time: NaiveDateTime,
    pub reason: ExitReason,
}

#[derive(Debug, Clone)]
pub struct TierSlot {
    pub target: f64,
    pub fraction: f64,
    pub filled: bool,
}

#[derive(Debug, Clone)]
pub struct Position {
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub entry_index: usize,
    pub initial_stop: f64,
    pub stop_price: f64,
    pub tiers: Vec<TierSlot>,
    pub mae_pct: f64,
    pub mfe_pct: f64,
    pub fills: Vec<Fill>,
    pub bars_held: usize,
    pub state: PositionState,
}

impl Position {
    pub fn open(signal: &EntrySignal, config: &StrategyConfig, range: &Range) -> Self {
        let stop = config.stop_price(signal.direction, signal.price, range);
        let targets = config.tier_targets(signal.direction, signal.price, stop, range);
        let tiers = targets
            .into_iter()
            .zip(&config.tiers)
            .map(|(target, tier)| TierSlot {
                target,
                fraction: tier.size_fraction,
                filled: false,
            })
            .collect();

        Position {
            direction: signal.direction,
            entry_price: signal.price,
            entry_time: signal.time,
            entry_index: signal.bar_index,
            initial_stop: stop,
            stop_price: stop,
            tiers,
            mae_pct: 0.0,
            mfe_pct: 0.0,
            fills: Vec::new(),
            bars_held: 0,
            state: PositionState::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == PositionState::Open
    }

    pub fn risk(&self) -> f64 {
        (self.entry_price - self.initial_stop).abs()
    }

    pub fn remaining_fraction(&self) -> f64 {
        self.tiers
            .iter()
            .filter(|t| !t.filled)
            .map(|t| t.fraction)
            .sum()
    }

    pub fn tiers_hit(&self) -> usize {
        self.fills
            .iter()
            .filter(|f| f.reason == ExitReason::TakeProfit)
            .count()
    }

    pub fn last_fill(&self) -> Option<&Fill> {
        self.fills.last()
    }

    pub fn update_excursion(&mut self, bar: &Bar) {
        let (adverse, favorable) = match self.direction {
            Direction::Long => (self.entry_price - bar.low, bar.high - self.entry_price),
            Direction::Short => (bar.high - self.entry_price, self.entry_price - bar.low),
        };
        let to_pct = |d: f64| (d / self.entry_price * 100.0).max(0.0);
        self.mae_pct = self.mae_pct.max(to_pct(adverse));
        self.mfe_pct = self.mfe_pct.max(to_pct(favorable));
    }

    fn stop_hit(&self, bar: &Bar, stop: f64) -> bool {
        match self.direction {
            Direction::Long => bar.low <= stop,
            Direction::Short => bar.high >= stop,
        }
    }

    fn target_hit(&self, bar: &Bar, target: f64) -> bool {
        match self.direction {
            Direction::Long => bar.high >= target,
            Direction::Short => bar.low <= target,
        }
    }

    fn closed_inside_range(&self, bar: &Bar, range: &Range) -> bool {
        match self.direction {
            Direction::Long => bar.close < range.high,
            Direction::Short => bar.close > range.low,
        }
    }

    /// Close every unfilled tier at `price`.
    pub fn close_remaining(&mut self, price: f64, time: NaiveDateTime, reason: ExitReason) {
        let fraction = self.remaining_fraction();
        for tier in self.tiers.iter_mut() {
            tier.filled = true;
        }
        if fraction > 0.0 {
            self.fills.push(Fill {
                price,
                fraction,
                time,
                reason,
            });
        }
        self.state = PositionState::Closed;
    }

    fn fill_tiers(&mut self, bar: &Bar, config: &StrategyConfig) {
        let mut any = false;
        for i in 0..self.tiers.len() {
            if self.tiers[i].filled || !self.target_hit(bar, self.tiers[i].target) {
                continue;
            }
            let tier = &mut self.tiers[i];
            tier.filled = true;
            self.fills.push(Fill {
                price: tier.target,
                fraction: tier.fraction,
                time: bar.timestamp,
                reason: ExitReason::TakeProfit,
            });
            any = true;
        }

        if self.tiers.iter().all(|t| t.filled) {
            self.state = PositionState::Closed;
        } else if any && config.breakeven_after_first_tier {
            self.stop_price = self.entry_price;
        }
    }

    /// Process one bar after the fill bar.
    pub fn on_bar(&mut self, bar: &Bar, config: &StrategyConfig, range: &Range) {
        if !self.is_open() {
            return;
        }
        self.bars_held += 1;
        self.update_excursion(bar);

        let stop = self.stop_price;
        let early_order = match config.early_exit {
            EarlyExit::None => None,
            EarlyExit::CloseInsideRange { order } => Some(order),
        };

        if config.exit_precedence == ExitPrecedence::StopFirst && self.stop_hit(bar, stop) {
            self.close_remaining(stop, bar.timestamp, ExitReason::StopLoss);
            return;
        }

        if early_order == Some(EarlyExitOrder::BeforeTarget) && self.closed_inside_range(bar, range)
        {
            self.close_remaining(bar.close, bar.timestamp, ExitReason::Invalidated);
            return;
        }

        self.fill_tiers(bar, config);
        if !self.is_open() {
            return;
        }

        if config.exit_precedence == ExitPrecedence::TargetFirst && self.stop_hit(bar, stop) {
            self.close_remaining(stop, bar.timestamp, ExitReason::StopLoss);
            return;
        }

        if early_order == Some(EarlyExitOrder::AfterTarget) && self.closed_inside_range(bar, range) {
            self.close_remaining(bar.close, bar.timestamp, ExitReason::Invalidated);
            return;
        }

        if bar.time() >= config.hard_exit {
            self.close_remaining(bar.close, bar.timestamp, ExitReason::Time);
        }
    }
}

/// Run `position` over the bars after its fill bar until it closes.
///
/// Returns the index of the bar on which the position closed. A day whose
/// data ends with the position still open is closed at the last close.
pub fn manage_position(
    position: &mut Position,
    bars: &[Bar],
    config: &StrategyConfig,
    range: &Range,
) -> usize {
    let start = position.entry_index + 1;
    for (index, bar) in bars.iter().enumerate().skip(start) {
        position.on_bar(bar, config, range);
        if !position.is_open() {
            return index;
        }
    }

    let last = bars.len().saturating_sub(1).max(position.entry_index);
    if let Some(bar) = bars.get(last) {
        position.close_remaining(bar.close, bar.timestamp, ExitReason::Time);
    }
    last
}
