//! Domain error types.

/// Top-level error type for rangetrader.
///
/// Only run-fatal conditions live here. Per-day problems (thin range window,
/// malformed bars, filtered weekdays) are [`crate::domain::session::DaySkip`]
/// values and never abort a batch.
#[derive(Debug, thiserror::Error)]
pub enum RangetraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RangetraderError {
    pub fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        RangetraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing(section: &str, key: &str) -> Self {
        RangetraderError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    /// Process exit status: 1 I/O, 2 configuration, 3 data, 4 report.
    pub fn exit_code(&self) -> u8 {
        match self {
            RangetraderError::Io(_) => 1,
            RangetraderError::ConfigParse { .. }
            | RangetraderError::ConfigMissing { .. }
            | RangetraderError::ConfigInvalid { .. } => 2,
            RangetraderError::Data { .. }
            | RangetraderError::NoData { .. }
            | RangetraderError::Csv(_) => 3,
            RangetraderError::Report { .. } => 4,
        }
    }
}

impl From<&RangetraderError> for std::process::ExitCode {
    fn from(err: &RangetraderError) -> Self {
        std::process::ExitCode::from(err.exit_code())
    }
}
