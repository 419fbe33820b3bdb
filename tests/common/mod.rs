#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
pub use rangetrader::domain::bar::Bar;
use rangetrader::domain::error::RangetraderError;
use rangetrader::domain::session::SessionCalendar;
use rangetrader::domain::strategy::{EntryMode, StrategyConfig};
use rangetrader::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, RangetraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(RangetraderError::Data {
                reason: reason.clone(),
            });
        }
        let bars: Vec<Bar> = self
            .data
            .get(symbol)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|b| start.is_none_or(|s| b.date() >= s) && end.is_none_or(|e| b.date() <= e))
            .collect();
        if bars.is_empty() {
            return Err(RangetraderError::NoData {
                symbol: symbol.to_string(),
            });
        }
        Ok(bars)
    }

    fn data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, RangetraderError> {
        match self.data.get(symbol) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(Bar::date).min().unwrap();
                let max = bars.iter().map(Bar::date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// Session 09:30-16:00 with a four-minute opening range.
pub fn test_calendar() -> SessionCalendar {
    SessionCalendar {
        range_minutes: 4,
        min_range_bars: 2,
        ..SessionCalendar::default()
    }
}

pub fn breakout_variant(name: &str) -> StrategyConfig {
    StrategyConfig::breakout(name, time(16, 0))
}

pub fn pullback_variant(name: &str, depth: f64) -> StrategyConfig {
    StrategyConfig {
        entry_mode: EntryMode::Pullback { depth },
        ..StrategyConfig::breakout(name, time(16, 0))
    }
}

/// Builds one session of one-minute bars starting at 09:30.
pub struct DayBuilder {
    next: NaiveDateTime,
    bars: Vec<Bar>,
}

impl DayBuilder {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            next: day.and_time(time(9, 30)),
            bars: Vec::new(),
        }
    }

    /// `minutes` bars spanning exactly `[low, high]`.
    pub fn range(mut self, low: f64, high: f64, minutes: u32) -> Self {
        let mid = (low + high) / 2.0;
        for _ in 0..minutes {
            self = self.bar(high, low, mid);
        }
        self
    }

    pub fn bar(mut self, high: f64, low: f64, close: f64) -> Self {
        self.bars.push(Bar {
            timestamp: self.next,
            open: close.clamp(low, high),
            high,
            low,
            close,
            volume: Some(1000.0),
        });
        self.next += Duration::minutes(1);
        self
    }

    /// `count` bars pinned at `price`.
    pub fn flat(mut self, price: f64, count: u32) -> Self {
        for _ in 0..count {
            self = self.bar(price, price, price);
        }
        self
    }

    /// Jump the clock forward so the next bar starts at `h:m`.
    pub fn at(mut self, h: u32, m: u32) -> Self {
        self.next = self.next.date().and_time(time(h, m));
        self
    }

    pub fn build(self) -> Vec<Bar> {
        self.bars
    }
}

/// Range [100, 105]; long breakout at 106 then a bar through the 100 stop.
pub fn stop_loss_day(day: NaiveDate) -> Vec<Bar> {
    DayBuilder::new(day)
        .range(100.0, 105.0, 4)
        .bar(106.2, 104.8, 106.0)
        .bar(106.5, 99.9, 100.2)
        .build()
}

/// Range [100, 105]; long breakout at 106 then a bar through the 118 target.
pub fn take_profit_day(day: NaiveDate) -> Vec<Bar> {
    DayBuilder::new(day)
        .range(100.0, 105.0, 4)
        .bar(106.2, 104.8, 106.0)
        .bar(118.5, 105.5, 117.0)
        .build()
}

/// Range [100, 105] with no bar closing outside it.
pub fn quiet_day(day: NaiveDate) -> Vec<Bar> {
    DayBuilder::new(day)
        .range(100.0, 105.0, 4)
        .flat(102.0, 20)
        .build()
}
