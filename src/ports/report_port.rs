//! Report output port trait.

use crate::domain::error::RangetraderError;
use crate::domain::metrics::VariantSummary;
use crate::domain::trade::Trade;

/// Sink for the trade table and the per-variant summary table.
pub trait ReportPort {
    fn write_trades(&self, trades: &[&Trade]) -> Result<(), RangetraderError>;

    fn write_summary(&self, summaries: &[VariantSummary]) -> Result<(), RangetraderError>;
}
