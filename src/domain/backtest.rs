//! Variant runner.
//!
//! Drives every admitted day through entry detection and position
//! management for one variant. Variants are independent of each other and
//! may run on the rayon pool; results are merged in configured order.

use chrono::NaiveDate;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::domain::entry::{scan_for_entry, ScanOutcome};
use crate::domain::metrics::RunAggregator;
use crate::domain::position::{manage_position, Position};
use crate::domain::range::Range;
use crate::domain::session::{admit_day, Segmentation, SessionCalendar, SkippedDay, TradingDay};
use crate::domain::strategy::StrategyConfig;
use crate::domain::trade::{record_trade, ExitReason, Trade};

/// Trades and bookkeeping for one simulated day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayOutcome {
    pub trades: Vec<Trade>,
    pub invalidated_setups: usize,
}

/// Everything one variant produced over the whole day set.
#[derive(Debug, Clone, Default)]
pub struct VariantRun {
    pub name: String,
    pub trades: Vec<Trade>,
    /// Days that passed the variant's filters, in chronological order.
    pub admitted: Vec<NaiveDate>,
    pub skipped: Vec<SkippedDay>,
    pub invalidated_setups: usize,
    pub no_trade_days: usize,
}

impl VariantRun {
    pub fn days_simulated(&self) -> usize {
        self.admitted.len()
    }
}

/// Simulate one day for one variant.
///
/// Without re-entry the day yields at most one trade. With re-entry a new
/// scan starts on the bar after an invalidated setup or a failed trade
/// (`SL` or `INVALIDATED`) until `max_entries` fills have been taken.
pub fn simulate_day(day: &TradingDay, range: &Range, config: &StrategyConfig) -> DayOutcome {
    let bars = &day.bars;
    let mut outcome = DayOutcome::default();
    let mut start = day.index_at(range.window_end);
    let mut entries = 0usize;

    while entries < config.max_entries.max(1) && start < bars.len() {
        match scan_for_entry(config, range, bars, start) {
            ScanOutcome::NoTrade => break,
            ScanOutcome::Invalidated {
                direction,
                bar_index,
            } => {
                outcome.invalidated_setups += 1;
                tracing::debug!(
                    "{} {}: {direction} pullback invalidated at {}",
                    config.name,
                    day.date,
                    bars[bar_index].timestamp
                );
                if !config.allow_reentry {
                    break;
                }
                start = bar_index + 1;
            }
            ScanOutcome::Filled(signal) => {
                entries += 1;
                tracing::debug!(
                    "{} {}: {} fill at {:.4} ({}), breakout at {}",
                    config.name,
                    day.date,
                    signal.direction,
                    signal.price,
                    signal.time,
                    bars[signal.breakout_index].timestamp
                );

                let mut position = Position::open(&signal, config, range);
                let closed_at = manage_position(&mut position, bars, config, range);
                let Some(trade) = record_trade(&position, &config.name, range, config.cost_pct)
                else {
                    tracing::warn!(
                        "{} {}: position entered at {} closed without an exit fill, trade dropped",
                        config.name,
                        day.date,
                        signal.time
                    );
                    break;
                };
                tracing::debug!(
                    "{} {}: exit {} at {:.4}, pnl {:.3}%",
                    config.name,
                    day.date,
                    trade.exit_reason,
                    trade.exit_price,
                    trade.pnl_pct
                );

                let failed = matches!(
                    trade.exit_reason,
                    ExitReason::StopLoss | ExitReason::Invalidated
                );
                outcome.trades.push(trade);
                if !(config.allow_reentry && failed) {
                    break;
                }
                start = closed_at + 1;
            }
        }
    }

    outcome
}

/// Run one variant over every segmented day.
///
/// Calendar-level skips (holidays, anomalies) are copied into the run so
/// every variant reports them.
pub fn run_variant(
    segmentation: &Segmentation,
    calendar: &SessionCalendar,
    config: &StrategyConfig,
) -> VariantRun {
    let mut run = VariantRun {
        name: config.name.clone(),
        skipped: segmentation.skipped.clone(),
        ..VariantRun::default()
    };

    for day in &segmentation.days {
        let range = match admit_day(day, calendar, &config.day_filters) {
            Ok(range) => range,
            Err(reason) => {
                tracing::debug!("{} {}: day skipped ({reason})", config.name, day.date);
                run.skipped.push(SkippedDay {
                    date: day.date,
                    reason,
                });
                continue;
            }
        };

        run.admitted.push(day.date);
        let outcome = simulate_day(day, &range, config);
        if outcome.trades.is_empty() {
            run.no_trade_days += 1;
        }
        run.invalidated_setups += outcome.invalidated_setups;
        run.trades.extend(outcome.trades);
    }

    run.skipped.sort_by_key(|s| s.date);
    run
}

/// Run every variant and merge the results in configured order.
///
/// The cancellation flag is checked before each variant starts; variants
/// that never started are absent from the aggregate.
pub fn run_all(
    variants: &[StrategyConfig],
    segmentation: &Segmentation,
    calendar: &SessionCalendar,
    parallel: bool,
    cancel: Option<&AtomicBool>,
) -> RunAggregator {
    let run_one = |config: &StrategyConfig| -> Option<VariantRun> {
        if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
            tracing::warn!("{}: cancelled before start", config.name);
            return None;
        }
        tracing::info!("{}: simulating {} days", config.name, segmentation.days.len());
        let run = run_variant(segmentation, calendar, config);
        tracing::info!(
            "{}: {} trades, {} days admitted, {} skipped",
            config.name,
            run.trades.len(),
            run.days_simulated(),
            run.skipped.len()
        );
        Some(run)
    };

    let runs: Vec<Option<VariantRun>> = if parallel {
        variants.par_iter().map(run_one).collect()
    } else {
        variants.iter().map(run_one).collect()
    };

    let mut aggregator = RunAggregator::new();
    for run in runs.into_iter().flatten() {
        aggregator.merge(run);
    }
    aggregator
}
