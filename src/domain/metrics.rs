//! Per-variant statistics and the run-level aggregator.

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::domain::backtest::VariantRun;
use crate::domain::session::DaySkip;
use crate::domain::trade::{ExitReason, Trade};

/// Gross wins over gross losses, with an explicit infinite case.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProfitFactor {
    Finite(f64),
    Infinite,
}

impl ProfitFactor {
    /// `Infinite` when there are wins but no losses. With neither wins nor
    /// losses (no trades, or only breakeven trades) the factor is `Finite(0.0)`.
    pub fn from_sums(gross_win: f64, gross_loss: f64) -> Self {
        if gross_loss > 0.0 {
            ProfitFactor::Finite(gross_win / gross_loss)
        } else if gross_win > 0.0 {
            ProfitFactor::Infinite
        } else {
            ProfitFactor::Finite(0.0)
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, ProfitFactor::Infinite)
    }
}

impl fmt::Display for ProfitFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfitFactor::Finite(v) => write!(f, "{v:.4}"),
            ProfitFactor::Infinite => f.write_str("inf"),
        }
    }
}

impl Serialize for ProfitFactor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ProfitFactor::Finite(v) => serializer.serialize_f64(*v),
            ProfitFactor::Infinite => serializer.serialize_str("inf"),
        }
    }
}

/// One row of the summary table. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantSummary {
    pub variant: String,
    pub trades: usize,
    pub win_rate: f64,
    pub profit_factor: ProfitFactor,
    pub avg_pnl: f64,
    pub median_pnl: f64,
    pub fill_rate_vs_baseline: Option<f64>,
    pub wins: usize,
    pub losses: usize,
    pub avg_r: f64,
    pub mae_p50: f64,
    pub mae_p90: f64,
    pub mfe_p50: f64,
    pub mfe_p90: f64,
    pub exits_sl: usize,
    pub exits_tp: usize,
    pub exits_time: usize,
    pub exits_invalidated: usize,
    pub days_simulated: usize,
    pub days_skipped: usize,
    pub no_trade_days: usize,
    pub invalidated_setups: usize,
    pub anomalies: usize,
    #[serde(skip)]
    pub skipped_by_reason: BTreeMap<&'static str, usize>,
}

impl VariantSummary {
    /// Summarise `run`, comparing its fill count against `baseline`.
    pub fn compute(run: &VariantRun, baseline: Option<&VariantRun>) -> Self {
        let trades = &run.trades;
        let n = trades.len();

        let pnls: Vec<f64> = trades.iter().map(|t| t.pnl_pct).collect();
        let wins = pnls.iter().filter(|&&p| p > 0.0).count();
        let losses = pnls.iter().filter(|&&p| p < 0.0).count();
        let gross_win: f64 = pnls.iter().filter(|&&p| p > 0.0).sum();
        let gross_loss: f64 = pnls.iter().filter(|&&p| p < 0.0).map(|p| p.abs()).sum();

        let win_rate = if n > 0 { wins as f64 / n as f64 } else { 0.0 };
        let mae: Vec<f64> = trades.iter().map(|t| t.mae_pct).collect();
        let mfe: Vec<f64> = trades.iter().map(|t| t.mfe_pct).collect();

        let exits = |reason: ExitReason| trades.iter().filter(|t| t.exit_reason == reason).count();

        let mut skipped_by_reason = BTreeMap::new();
        for skip in &run.skipped {
            *skipped_by_reason.entry(skip.reason.label()).or_insert(0) += 1;
        }
        let anomalies = run
            .skipped
            .iter()
            .filter(|s| matches!(s.reason, DaySkip::Anomaly(_)))
            .count();

        VariantSummary {
            variant: run.name.clone(),
            trades: n,
            win_rate,
            profit_factor: ProfitFactor::from_sums(gross_win, gross_loss),
            avg_pnl: mean(&pnls),
            median_pnl: percentile(&pnls, 50.0),
            fill_rate_vs_baseline: baseline.and_then(|b| fill_rate(run, b)),
            wins,
            losses,
            avg_r: mean(&trades.iter().map(|t| t.r_multiple).collect::<Vec<_>>()),
            mae_p50: percentile(&mae, 50.0),
            mae_p90: percentile(&mae, 90.0),
            mfe_p50: percentile(&mfe, 50.0),
            mfe_p90: percentile(&mfe, 90.0),
            exits_sl: exits(ExitReason::StopLoss),
            exits_tp: exits(ExitReason::TakeProfit),
            exits_time: exits(ExitReason::Time),
            exits_invalidated: exits(ExitReason::Invalidated),
            days_simulated: run.days_simulated(),
            days_skipped: run.skipped.len(),
            no_trade_days: run.no_trade_days,
            invalidated_setups: run.invalidated_setups,
            anomalies,
            skipped_by_reason,
        }
    }
}

/// Trades of `run` over trades of `baseline`, counted on the days both admitted.
///
/// `None` when the baseline has no trades on that day set.
pub fn fill_rate(run: &VariantRun, baseline: &VariantRun) -> Option<f64> {
    let ours: BTreeSet<_> = run.admitted.iter().collect();
    let common: BTreeSet<_> = baseline
        .admitted
        .iter()
        .filter(|d| ours.contains(d))
        .collect();

    let count = |trades: &[Trade]| trades.iter().filter(|t| common.contains(&t.date)).count();
    let base = count(&baseline.trades);
    if base == 0 {
        return None;
    }
    Some(count(&run.trades) as f64 / base as f64)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Percentile `p` in `[0, 100]` with linear interpolation between ranks.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Owns every variant's results for the lifetime of a run.
#[derive(Debug, Clone, Default)]
pub struct RunAggregator {
    runs: Vec<VariantRun>,
}

impl RunAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, run: VariantRun) {
        self.runs.push(run);
    }

    pub fn runs(&self) -> &[VariantRun] {
        &self.runs
    }

    pub fn run(&self, name: &str) -> Option<&VariantRun> {
        self.runs.iter().find(|r| r.name == name)
    }

    /// All trades, grouped by variant in merge order.
    pub fn trades(&self) -> impl Iterator<Item = &Trade> {
        self.runs.iter().flat_map(|r| r.trades.iter())
    }

    pub fn summarize(&self, baseline: &str) -> Vec<VariantSummary> {
        let base = self.run(baseline);
        self.runs
            .iter()
            .map(|run| VariantSummary::compute(run, base))
            .collect()
    }
}
