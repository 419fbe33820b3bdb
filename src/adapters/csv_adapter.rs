//! CSV one-minute bar adapter.
//!
//! Expects a header row with `timestamp,open,high,low,close[,volume]`
//! (`datetime` is accepted in place of `timestamp`). Rows are returned in
//! file order.

use crate::domain::bar::Bar;
use crate::domain::error::RangetraderError;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::PathBuf;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

pub struct CsvAdapter {
    path: PathBuf,
}

struct Columns {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, RangetraderError> {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        let require = |names: &[&str]| {
            find(names).ok_or_else(|| RangetraderError::Data {
                reason: format!("missing {} column", names[0]),
            })
        };
        Ok(Columns {
            timestamp: require(&["timestamp", "datetime"])?,
            open: require(&["open"])?,
            high: require(&["high"])?,
            low: require(&["low"])?,
            close: require(&["close"])?,
            volume: find(&["volume"]),
        })
    }
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_all(&self) -> Result<Vec<Bar>, RangetraderError> {
        let content = fs::read_to_string(&self.path).map_err(|e| RangetraderError::Data {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let columns = Columns::from_headers(rdr.headers()?)?;
        let mut bars = Vec::new();

        for (row, result) in rdr.records().enumerate() {
            let record = result?;
            let line = row + 2;
            bars.push(parse_record(&record, &columns).map_err(|reason| {
                RangetraderError::Data {
                    reason: format!("{} line {line}: {reason}", self.path.display()),
                }
            })?);
        }

        Ok(bars)
    }
}

fn field<'r>(record: &'r csv::StringRecord, idx: usize, name: &str) -> Result<&'r str, String> {
    record
        .get(idx)
        .map(str::trim)
        .ok_or_else(|| format!("missing {name} value"))
}

fn number(raw: &str, name: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .map_err(|e| format!("invalid {name} value '{raw}': {e}"))
}

fn parse_record(record: &csv::StringRecord, columns: &Columns) -> Result<Bar, String> {
    let price = |idx: usize, name: &str| number(field(record, idx, name)?, name);

    let volume = match columns.volume.and_then(|idx| record.get(idx)).map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(number(raw, "volume")?),
    };

    Ok(Bar {
        timestamp: parse_timestamp(field(record, columns.timestamp, "timestamp")?)?,
        open: price(columns.open, "open")?,
        high: price(columns.high, "high")?,
        low: price(columns.low, "low")?,
        close: price(columns.close, "close")?,
        volume,
    })
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| format!("invalid timestamp '{raw}'"))
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, RangetraderError> {
        let bars: Vec<Bar> = self
            .read_all()?
            .into_iter()
            .filter(|b| start.is_none_or(|s| b.date() >= s) && end.is_none_or(|e| b.date() <= e))
            .collect();

        if bars.is_empty() {
            return Err(RangetraderError::NoData {
                symbol: symbol.to_string(),
            });
        }
        tracing::info!("{symbol}: loaded {} bars from {}", bars.len(), self.path.display());
        Ok(bars)
    }

    fn data_range(&self, _symbol: &str) -> Result<Option<(NaiveDate, NaiveDate, usize)>, RangetraderError> {
        let bars = self.read_all()?;
        let first = bars.iter().map(Bar::date).min();
        let last = bars.iter().map(Bar::date).max();
        Ok(first.zip(last).map(|(f, l)| (f, l, bars.len())))
    }
}
