//! Entry detection state machine.
//!
//! `WaitBreak -> Filled` for breakout variants,
//! `WaitBreak -> WaitPullback -> Filled` for pullback variants, with
//! `Invalidated` when a pullback setup crosses the opposite range boundary
//! before filling and `NoTrade` once the hard-exit time passes unfilled.

use chrono::NaiveDateTime;

use crate::domain::bar::Bar;
use crate::domain::confluence::{is_confluent, zones_for};
use crate::domain::range::Range;
use crate::domain::strategy::{Direction, EntryMode, StrategyConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryState {
    WaitBreak,
    WaitPullback {
        direction: Direction,
        trigger: f64,
        breakout_index: usize,
    },
    Filled,
    Invalidated,
    NoTrade,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntrySignal {
    pub direction: Direction,
    pub price: f64,
    pub time: NaiveDateTime,
    pub bar_index: usize,
    pub breakout_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanOutcome {
    Filled(EntrySignal),
    Invalidated { direction: Direction, bar_index: usize },
    NoTrade,
}

/// Retracement price a pullback entry waits for.
pub fn pullback_trigger(direction: Direction, range: &Range, depth: f64) -> f64 {
    match direction {
        Direction::Long => range.high - range.size * depth,
        Direction::Short => range.low + range.size * depth,
    }
}

pub struct EntryDetector<'a> {
    config: &'a StrategyConfig,
    range: &'a Range,
    state: EntryState,
}

impl<'a> EntryDetector<'a> {
    pub fn new(config: &'a StrategyConfig, range: &'a Range) -> Self {
        EntryDetector {
            config,
            range,
            state: EntryState::WaitBreak,
        }
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    /// Advance over `bars[index]`; `bars[..index]` is the visible history.
    ///
    /// Returns an outcome once the machine reaches a terminal state.
    pub fn on_bar(&mut self, bars: &[Bar], index: usize) -> Option<ScanOutcome> {
        let bar = &bars[index];

        if bar.time() >= self.config.hard_exit {
            self.state = EntryState::NoTrade;
            return Some(ScanOutcome::NoTrade);
        }
        if bar.time() < self.range.window_end {
            return None;
        }

        match self.state {
            EntryState::WaitBreak => {
                let direction = self.breakout_direction(bar)?;
                match self.config.entry_mode {
                    EntryMode::Breakout => {
                        if !self.confluent(direction, bars, index, bar.close) {
                            tracing::debug!(
                                "{}: breakout at {} rejected by confluence",
                                self.config.name,
                                bar.timestamp
                            );
                            return None;
                        }
                        self.state = EntryState::Filled;
                        Some(ScanOutcome::Filled(EntrySignal {
                            direction,
                            price: bar.close,
                            time: bar.timestamp,
                            bar_index: index,
                            breakout_index: index,
                        }))
                    }
                    EntryMode::Pullback { depth } => {
                        self.state = EntryState::WaitPullback {
                            direction,
                            trigger: pullback_trigger(direction, self.range, depth),
                            breakout_index: index,
                        };
                        None
                    }
                }
            }
            EntryState::WaitPullback {
                direction,
                trigger,
                breakout_index,
            } => {
                let touched = match direction {
                    Direction::Long => bar.low <= trigger,
                    Direction::Short => bar.high >= trigger,
                };
                if touched && self.confluent(direction, bars, index, trigger) {
                    self.state = EntryState::Filled;
                    return Some(ScanOutcome::Filled(EntrySignal {
                        direction,
                        price: trigger,
                        time: bar.timestamp,
                        bar_index: index,
                        breakout_index,
                    }));
                }

                let crossed_opposite = match direction {
                    Direction::Long => bar.low < self.range.low,
                    Direction::Short => bar.high > self.range.high,
                };
                if crossed_opposite {
                    self.state = EntryState::Invalidated;
                    return Some(ScanOutcome::Invalidated {
                        direction,
                        bar_index: index,
                    });
                }
                None
            }
            EntryState::Filled | EntryState::Invalidated | EntryState::NoTrade => None,
        }
    }

    fn breakout_direction(&self, bar: &Bar) -> Option<Direction> {
        let direction = if bar.close > self.range.high {
            Direction::Long
        } else if bar.close < self.range.low {
            Direction::Short
        } else {
            return None;
        };
        self.config.direction.allows(direction).then_some(direction)
    }

    fn confluent(&self, direction: Direction, bars: &[Bar], index: usize, price: f64) -> bool {
        match &self.config.confluence {
            None => true,
            Some(cfg) => {
                let zones = zones_for(
                    direction,
                    self.range,
                    &bars[..index],
                    bars[index].time(),
                    cfg,
                );
                is_confluent(&zones, price, cfg)
            }
        }
    }
}

/// Run a fresh detector over `bars[start..]`.
pub fn scan_for_entry(
    config: &StrategyConfig,
    range: &Range,
    bars: &[Bar],
    start: usize,
) -> ScanOutcome {
    let mut detector = EntryDetector::new(config, range);
    for index in start..bars.len() {
        if let Some(outcome) = detector.on_bar(bars, index) {
            return outcome;
        }
    }
    ScanOutcome::NoTrade
}
