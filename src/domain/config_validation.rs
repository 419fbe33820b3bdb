//! Configuration validation.
//!
//! Turns a [`ConfigPort`] into immutable run settings, a session calendar
//! and one [`StrategyConfig`] per variant. Every problem is reported here,
//! before any bar is read.

use crate::domain::error::RangetraderError;
use crate::domain::session::SessionCalendar;
use crate::domain::strategy::{
    ConfluenceConfig, DayFilters, DirectionFilter, EarlyExit, EarlyExitOrder, EntryMode,
    ExitPrecedence, StopMode, StrategyConfig, TakeProfitMode, Tier,
};
use crate::ports::config_port::ConfigPort;
use chrono::{NaiveDate, NaiveTime, Weekday};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

const BACKTEST: &str = "backtest";
const SESSION: &str = "session";

const BACKTEST_KEYS: &[&str] = &[
    "data_file",
    "symbol",
    "start_date",
    "end_date",
    "variants",
    "baseline",
    "trades_output",
    "summary_output",
    "parallel",
];

const SESSION_KEYS: &[&str] = &["open", "close", "range_minutes", "min_range_bars", "holidays"];

const VARIANT_KEYS: &[&str] = &[
    "entry_mode",
    "pullback_depth",
    "direction",
    "stop_mode",
    "stop_pct",
    "take_profit_mode",
    "tiers",
    "hard_exit",
    "skip_weekdays",
    "min_range",
    "max_range",
    "min_range_pct",
    "max_range_pct",
    "confluence_min_score",
    "fib_levels",
    "fib_band_pct",
    "fib_weight",
    "fvg_timeframe",
    "fvg_weight",
    "fvg_min_gap_pct",
    "exit_precedence",
    "early_exit",
    "early_exit_order",
    "breakeven_after_first_tier",
    "allow_reentry",
    "max_entries",
    "cost_pct",
];

const CONFLUENCE_KEYS: &[&str] = &[
    "fib_levels",
    "fib_band_pct",
    "fib_weight",
    "fvg_timeframe",
    "fvg_weight",
    "fvg_min_gap_pct",
];

const TIER_SUM_TOLERANCE: f64 = 1e-6;

/// `[backtest]` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub data_file: PathBuf,
    pub symbol: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub variants: Vec<String>,
    pub baseline: String,
    pub trades_output: PathBuf,
    pub summary_output: PathBuf,
    pub parallel: bool,
}

/// Everything a run needs, validated.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub settings: RunSettings,
    pub calendar: SessionCalendar,
    pub variants: Vec<StrategyConfig>,
}

pub fn variant_section(name: &str) -> String {
    format!("variant.{name}")
}

pub fn build_run_config(config: &dyn ConfigPort) -> Result<RunConfig, RangetraderError> {
    let settings = build_run_settings(config)?;
    let calendar = build_session_calendar(config)?;
    let variants = settings
        .variants
        .iter()
        .map(|name| build_strategy_config(config, name, &calendar))
        .collect::<Result<Vec<_>, _>>()?;

    let referenced: BTreeSet<String> = settings
        .variants
        .iter()
        .map(|n| variant_section(n).to_lowercase())
        .collect();
    for section in config.sections() {
        let lower = section.to_lowercase();
        if lower.starts_with("variant.") && !referenced.contains(&lower) {
            tracing::warn!("[{section}] is not listed in [backtest] variants and will not run");
        }
    }

    Ok(RunConfig {
        settings,
        calendar,
        variants,
    })
}

pub fn build_run_settings(config: &dyn ConfigPort) -> Result<RunSettings, RangetraderError> {
    reject_unknown_keys(config, BACKTEST, BACKTEST_KEYS)?;

    let data_file = PathBuf::from(required(config, BACKTEST, "data_file")?);
    let symbol = match optional(config, BACKTEST, "symbol") {
        Some(s) => s,
        None => data_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let start_date = parse_opt(config, BACKTEST, "start_date", parse_date)?;
    let end_date = parse_opt(config, BACKTEST, "end_date", parse_date)?;
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if start > end {
            return Err(RangetraderError::invalid(
                BACKTEST,
                "start_date",
                "start_date must not be after end_date",
            ));
        }
    }

    let variants = split_list(&required(config, BACKTEST, "variants")?);
    if variants.is_empty() {
        return Err(RangetraderError::invalid(
            BACKTEST,
            "variants",
            "at least one variant is required",
        ));
    }
    let mut seen = BTreeSet::new();
    for name in &variants {
        if !seen.insert(name.to_lowercase()) {
            return Err(RangetraderError::invalid(
                BACKTEST,
                "variants",
                format!("variant '{name}' listed twice"),
            ));
        }
    }

    let baseline = optional(config, BACKTEST, "baseline").unwrap_or_else(|| variants[0].clone());
    if !variants.iter().any(|v| v.eq_ignore_ascii_case(&baseline)) {
        return Err(RangetraderError::invalid(
            BACKTEST,
            "baseline",
            format!("baseline '{baseline}' is not one of the configured variants"),
        ));
    }

    Ok(RunSettings {
        data_file,
        symbol,
        start_date,
        end_date,
        variants,
        baseline,
        trades_output: optional(config, BACKTEST, "trades_output")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("trades.csv")),
        summary_output: optional(config, BACKTEST, "summary_output")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("summary.csv")),
        parallel: parse_opt(config, BACKTEST, "parallel", parse_bool)?.unwrap_or(true),
    })
}

pub fn build_session_calendar(config: &dyn ConfigPort) -> Result<SessionCalendar, RangetraderError> {
    reject_unknown_keys(config, SESSION, SESSION_KEYS)?;
    let defaults = SessionCalendar::default();

    let open = parse_opt(config, SESSION, "open", parse_time)?.unwrap_or(defaults.open);
    let close = parse_opt(config, SESSION, "close", parse_time)?.unwrap_or(defaults.close);
    if open >= close {
        return Err(RangetraderError::invalid(
            SESSION,
            "close",
            "session close must be after open",
        ));
    }

    let range_minutes = parse_opt(config, SESSION, "range_minutes", parse_number::<u32>)?
        .unwrap_or(defaults.range_minutes);
    if range_minutes == 0 {
        return Err(RangetraderError::invalid(
            SESSION,
            "range_minutes",
            "range_minutes must be at least 1",
        ));
    }

    let min_range_bars = parse_opt(config, SESSION, "min_range_bars", parse_number::<usize>)?
        .unwrap_or_else(|| (range_minutes as usize / 2).max(1));
    if min_range_bars == 0 {
        return Err(RangetraderError::invalid(
            SESSION,
            "min_range_bars",
            "min_range_bars must be at least 1",
        ));
    }

    let holidays = match optional(config, SESSION, "holidays") {
        None => BTreeSet::new(),
        Some(list) => split_list(&list)
            .iter()
            .map(|d| parse_date(d).map_err(|r| RangetraderError::invalid(SESSION, "holidays", r)))
            .collect::<Result<BTreeSet<_>, _>>()?,
    };

    let calendar = SessionCalendar {
        open,
        close,
        range_minutes,
        min_range_bars,
        holidays,
    };
    if calendar.range_window_end() >= close || calendar.range_window_end() <= open {
        return Err(RangetraderError::invalid(
            SESSION,
            "range_minutes",
            "range window must end inside the session",
        ));
    }
    Ok(calendar)
}

/// Build the `[variant.<name>]` section into a [`StrategyConfig`].
pub fn build_strategy_config(
    config: &dyn ConfigPort,
    name: &str,
    calendar: &SessionCalendar,
) -> Result<StrategyConfig, RangetraderError> {
    let section = variant_section(name);
    let sec = section.as_str();
    if !config.has_section(sec) {
        return Err(RangetraderError::invalid(
            BACKTEST,
            "variants",
            format!("no [{section}] section for variant '{name}'"),
        ));
    }
    reject_unknown_keys(config, sec, VARIANT_KEYS)?;

    let entry_mode = match choice(config, sec, "entry_mode", &["breakout", "pullback"], "breakout")? {
        "pullback" => {
            let depth = parse_opt(config, sec, "pullback_depth", parse_finite)?
                .ok_or_else(|| RangetraderError::missing(sec, "pullback_depth"))?;
            if !(0.0..=1.0).contains(&depth) {
                return Err(RangetraderError::invalid(
                    sec,
                    "pullback_depth",
                    "pullback_depth must be between 0 and 1",
                ));
            }
            EntryMode::Pullback { depth }
        }
        _ => EntryMode::Breakout,
    };

    let direction = match choice(config, sec, "direction", &["both", "long", "short"], "both")? {
        "long" => DirectionFilter::LongOnly,
        "short" => DirectionFilter::ShortOnly,
        _ => DirectionFilter::Both,
    };

    let stop_mode = match choice(
        config,
        sec,
        "stop_mode",
        &["structural", "fixed_pct", "half_range"],
        "structural",
    )? {
        "fixed_pct" => {
            let pct = parse_opt(config, sec, "stop_pct", parse_finite)?
                .ok_or_else(|| RangetraderError::missing(sec, "stop_pct"))?;
            if pct <= 0.0 || pct >= 100.0 {
                return Err(RangetraderError::invalid(
                    sec,
                    "stop_pct",
                    "stop_pct must be between 0 and 100 exclusive",
                ));
            }
            StopMode::FixedPct(pct)
        }
        "half_range" => StopMode::HalfRange,
        _ => StopMode::StructuralOpposite,
    };
    if !matches!(stop_mode, StopMode::FixedPct(_)) && optional(config, sec, "stop_pct").is_some() {
        return Err(RangetraderError::invalid(
            sec,
            "stop_pct",
            "stop_pct only applies to stop_mode = fixed_pct",
        ));
    }
    if let (StopMode::StructuralOpposite, EntryMode::Pullback { depth }) = (stop_mode, entry_mode) {
        if depth >= 1.0 {
            return Err(RangetraderError::invalid(
                sec,
                "pullback_depth",
                "a full-depth pullback with a structural stop has zero risk",
            ));
        }
    }

    let take_profit_mode = match choice(
        config,
        sec,
        "take_profit_mode",
        &["fixed_pct", "r_multiple", "range_fraction"],
        "r_multiple",
    )? {
        "fixed_pct" => TakeProfitMode::FixedPct,
        "range_fraction" => TakeProfitMode::DynamicRangeFraction,
        _ => TakeProfitMode::RMultiple,
    };

    let tiers = match optional(config, sec, "tiers") {
        Some(spec) => parse_tiers(&spec).map_err(|r| RangetraderError::invalid(sec, "tiers", r))?,
        None => vec![Tier {
            size_fraction: 1.0,
            target: 2.0,
        }],
    };

    let hard_exit = parse_opt(config, sec, "hard_exit", parse_time)?.unwrap_or(calendar.close);
    if hard_exit <= calendar.range_window_end() || hard_exit > calendar.close {
        return Err(RangetraderError::invalid(
            sec,
            "hard_exit",
            "hard_exit must fall after the range window and no later than the session close",
        ));
    }

    let day_filters = build_day_filters(config, sec)?;
    let confluence = build_confluence(config, sec)?;

    let exit_precedence = match choice(
        config,
        sec,
        "exit_precedence",
        &["stop_first", "target_first"],
        "stop_first",
    )? {
        "target_first" => ExitPrecedence::TargetFirst,
        _ => ExitPrecedence::StopFirst,
    };

    let early_exit_order = match choice(
        config,
        sec,
        "early_exit_order",
        &["before_target", "after_target"],
        "before_target",
    )? {
        "after_target" => EarlyExitOrder::AfterTarget,
        _ => EarlyExitOrder::BeforeTarget,
    };
    let early_exit = match choice(config, sec, "early_exit", &["none", "close_inside_range"], "none")? {
        "close_inside_range" => EarlyExit::CloseInsideRange {
            order: early_exit_order,
        },
        _ => EarlyExit::None,
    };

    let breakeven_after_first_tier =
        parse_opt(config, sec, "breakeven_after_first_tier", parse_bool)?.unwrap_or(false);
    let allow_reentry = parse_opt(config, sec, "allow_reentry", parse_bool)?.unwrap_or(false);
    let max_entries = parse_opt(config, sec, "max_entries", parse_number::<usize>)?.unwrap_or(1);
    if max_entries == 0 {
        return Err(RangetraderError::invalid(
            sec,
            "max_entries",
            "max_entries must be at least 1",
        ));
    }
    if max_entries > 1 && !allow_reentry {
        return Err(RangetraderError::invalid(
            sec,
            "max_entries",
            "max_entries above 1 requires allow_reentry = true",
        ));
    }

    let cost_pct = non_negative(config, sec, "cost_pct")?.unwrap_or(0.0);

    Ok(StrategyConfig {
        name: name.to_string(),
        entry_mode,
        direction,
        stop_mode,
        take_profit_mode,
        tiers,
        hard_exit,
        day_filters,
        confluence,
        exit_precedence,
        early_exit,
        breakeven_after_first_tier,
        allow_reentry,
        max_entries,
        cost_pct,
    })
}

fn build_day_filters(config: &dyn ConfigPort, sec: &str) -> Result<DayFilters, RangetraderError> {
    let skip_weekdays = match optional(config, sec, "skip_weekdays") {
        None => Vec::new(),
        Some(list) => split_list(&list)
            .iter()
            .map(|d| {
                d.parse::<Weekday>().map_err(|_| {
                    RangetraderError::invalid(sec, "skip_weekdays", format!("unknown weekday '{d}'"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    let filters = DayFilters {
        skip_weekdays,
        min_range: non_negative(config, sec, "min_range")?,
        max_range: non_negative(config, sec, "max_range")?,
        min_range_pct: non_negative(config, sec, "min_range_pct")?,
        max_range_pct: non_negative(config, sec, "max_range_pct")?,
    };

    for (min, max, key) in [
        (filters.min_range, filters.max_range, "max_range"),
        (filters.min_range_pct, filters.max_range_pct, "max_range_pct"),
    ] {
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Err(RangetraderError::invalid(
                    sec,
                    key,
                    "maximum must not be below the minimum",
                ));
            }
        }
    }
    Ok(filters)
}

fn build_confluence(
    config: &dyn ConfigPort,
    sec: &str,
) -> Result<Option<ConfluenceConfig>, RangetraderError> {
    let Some(min_score) = non_negative(config, sec, "confluence_min_score")? else {
        if let Some(key) = CONFLUENCE_KEYS
            .iter()
            .find(|k| optional(config, sec, k).is_some())
        {
            return Err(RangetraderError::invalid(
                sec,
                key,
                "requires confluence_min_score to enable confluence",
            ));
        }
        return Ok(None);
    };

    let defaults = ConfluenceConfig::default();
    let fib_levels = match optional(config, sec, "fib_levels") {
        None => defaults.fib_levels,
        Some(list) => split_list(&list)
            .iter()
            .map(|l| {
                let v = parse_finite(l)
                    .map_err(|r| RangetraderError::invalid(sec, "fib_levels", r))?;
                if v <= 0.0 || v > 1.0 {
                    return Err(RangetraderError::invalid(
                        sec,
                        "fib_levels",
                        format!("level {v} must be in (0, 1]"),
                    ));
                }
                Ok(v)
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    let fvg_timeframe_minutes = parse_opt(config, sec, "fvg_timeframe", parse_number::<u32>)?
        .unwrap_or(defaults.fvg_timeframe_minutes);
    if fvg_timeframe_minutes == 0 {
        return Err(RangetraderError::invalid(
            sec,
            "fvg_timeframe",
            "fvg_timeframe must be at least 1 minute",
        ));
    }

    Ok(Some(ConfluenceConfig {
        min_score,
        fib_levels,
        fib_band_pct: non_negative(config, sec, "fib_band_pct")?.unwrap_or(defaults.fib_band_pct),
        fib_weight: non_negative(config, sec, "fib_weight")?.unwrap_or(defaults.fib_weight),
        fvg_timeframe_minutes,
        fvg_weight: non_negative(config, sec, "fvg_weight")?.unwrap_or(defaults.fvg_weight),
        fvg_min_gap_pct: non_negative(config, sec, "fvg_min_gap_pct")?
            .unwrap_or(defaults.fvg_min_gap_pct),
    }))
}

/// Parse `"0.5@1.0, 0.5@2.0"` into tiers whose fractions sum to one.
pub fn parse_tiers(spec: &str) -> Result<Vec<Tier>, String> {
    let tiers = split_list(spec)
        .iter()
        .map(|item| {
            let (fraction, target) = item
                .split_once('@')
                .ok_or_else(|| format!("tier '{item}' must look like fraction@target"))?;
            let size_fraction = parse_finite(fraction.trim())?;
            let target = parse_finite(target.trim())?;
            if size_fraction <= 0.0 || size_fraction > 1.0 {
                return Err(format!("tier fraction {size_fraction} must be in (0, 1]"));
            }
            if target <= 0.0 {
                return Err(format!("tier target {target} must be positive"));
            }
            Ok(Tier {
                size_fraction,
                target,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if tiers.is_empty() {
        return Err("at least one tier is required".to_string());
    }
    let total: f64 = tiers.iter().map(|t| t.size_fraction).sum();
    if (total - 1.0).abs() > TIER_SUM_TOLERANCE {
        return Err(format!("tier fractions sum to {total}, expected 1"));
    }
    Ok(tiers)
}

fn reject_unknown_keys(
    config: &dyn ConfigPort,
    section: &str,
    allowed: &[&str],
) -> Result<(), RangetraderError> {
    match config
        .section_keys(section)
        .into_iter()
        .find(|k| !allowed.contains(&k.as_str()))
    {
        Some(key) => Err(RangetraderError::invalid(section, &key, "unknown key")),
        None => Ok(()),
    }
}

fn optional(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, RangetraderError> {
    optional(config, section, key).ok_or_else(|| RangetraderError::missing(section, key))
}

fn parse_opt<T>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<Option<T>, RangetraderError> {
    optional(config, section, key)
        .map(|v| parse(&v).map_err(|r| RangetraderError::invalid(section, key, r)))
        .transpose()
}

fn non_negative(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, RangetraderError> {
    let value = parse_opt(config, section, key, parse_finite)?;
    match value {
        Some(v) if v < 0.0 => Err(RangetraderError::invalid(
            section,
            key,
            format!("{key} must be non-negative"),
        )),
        other => Ok(other),
    }
}

/// Validate an enumerated option and return the matching allowed value.
fn choice<'a>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    allowed: &[&'a str],
    default: &'a str,
) -> Result<&'a str, RangetraderError> {
    match optional(config, section, key) {
        None => Ok(default),
        Some(v) => {
            let lower = v.to_lowercase();
            allowed
                .iter()
                .find(|a| **a == lower)
                .copied()
                .ok_or_else(|| {
                    RangetraderError::invalid(
                        section,
                        key,
                        format!("unknown value '{v}', expected one of {}", allowed.join("|")),
                    )
                })
        }
    }
}

fn parse_number<T: FromStr>(value: &str) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| format!("invalid number '{value}': {e}"))
}

/// Floats also accept `NaN` and `inf`, which slip past every range check.
fn parse_finite(value: &str) -> Result<f64, String> {
    let v: f64 = parse_number(value)?;
    if !v.is_finite() {
        return Err(format!("invalid number '{value}': must be finite"));
    }
    Ok(v)
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(format!("invalid boolean '{value}'")),
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{value}', expected YYYY-MM-DD"))
}

fn parse_time(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| format!("invalid time '{value}', expected HH:MM"))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
