//! CSV report adapter and console summary table.

use crate::domain::error::RangetraderError;
use crate::domain::metrics::{ProfitFactor, VariantSummary};
use crate::domain::trade::Trade;
use crate::ports::report_port::ReportPort;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const TRADE_COLUMNS: &[&str] = &[
    "date",
    "variant",
    "direction",
    "entry_price",
    "entry_time",
    "exit_price",
    "exit_time",
    "exit_reason",
    "pnl_pct",
    "mae_pct",
    "mfe_pct",
    "tiers_hit",
    "range_high",
    "range_low",
    "r_multiple",
    "bars_held",
];

pub struct CsvReportAdapter {
    trades_path: PathBuf,
    summary_path: PathBuf,
}

impl CsvReportAdapter {
    pub fn new(trades_path: PathBuf, summary_path: PathBuf) -> Self {
        Self {
            trades_path,
            summary_path,
        }
    }

    fn report_error(path: &Path, err: impl std::fmt::Display) -> RangetraderError {
        RangetraderError::Report {
            reason: format!("failed to write {}: {}", path.display(), err),
        }
    }
}

impl ReportPort for CsvReportAdapter {
    fn write_trades(&self, trades: &[&Trade]) -> Result<(), RangetraderError> {
        let path = &self.trades_path;
        let mut writer = csv::Writer::from_path(path).map_err(|e| Self::report_error(path, e))?;
        if trades.is_empty() {
            writer
                .write_record(TRADE_COLUMNS)
                .map_err(|e| Self::report_error(path, e))?;
        }
        for trade in trades {
            writer
                .serialize(trade)
                .map_err(|e| Self::report_error(path, e))?;
        }
        writer.flush().map_err(|e| Self::report_error(path, e))?;
        tracing::info!("wrote {} trades to {}", trades.len(), path.display());
        Ok(())
    }

    fn write_summary(&self, summaries: &[VariantSummary]) -> Result<(), RangetraderError> {
        let path = &self.summary_path;
        let mut writer = csv::Writer::from_path(path).map_err(|e| Self::report_error(path, e))?;
        for summary in summaries {
            writer
                .serialize(summary)
                .map_err(|e| Self::report_error(path, e))?;
        }
        writer.flush().map_err(|e| Self::report_error(path, e))?;
        Ok(())
    }
}

/// Fixed-width console rendering of the summary table.
pub fn format_summary_table(summaries: &[VariantSummary]) -> String {
    let name_width = summaries
        .iter()
        .map(|s| s.variant.len())
        .max()
        .unwrap_or(0)
        .max("variant".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<name_width$}  {:>6}  {:>7}  {:>8}  {:>8}  {:>8}  {:>6}  {:>6}  {:>6}",
        "variant", "trades", "win%", "pf", "avg%", "med%", "avg_r", "fill", "skip"
    );
    for s in summaries {
        let fill = match s.fill_rate_vs_baseline {
            Some(rate) => format!("{rate:.2}"),
            None => "-".to_string(),
        };
        let _ = writeln!(
            out,
            "{:<name_width$}  {:>6}  {:>7.1}  {:>8}  {:>8.3}  {:>8.3}  {:>6.2}  {:>6}  {:>6}",
            s.variant,
            s.trades,
            s.win_rate * 100.0,
            pf_cell(s),
            s.avg_pnl,
            s.median_pnl,
            s.avg_r,
            fill,
            s.days_skipped,
        );
    }
    out
}

fn pf_cell(s: &VariantSummary) -> String {
    match s.profit_factor {
        ProfitFactor::Finite(v) => format!("{v:.2}"),
        ProfitFactor::Infinite => s.profit_factor.to_string(),
    }
}
