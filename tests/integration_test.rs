//! End-to-end simulation tests against in-memory bars.
//!
//! Tests cover:
//! - Worked breakout, pullback and all-winner scenarios
//! - Full pipeline through mock data and report ports
//! - Fill rate against the baseline over commonly admitted days
//! - Holidays, anomalies and day filters reported as skips
//! - Parallel and sequential runs producing identical results

mod common;

use approx::assert_relative_eq;
use common::*;
use rangetrader::adapters::csv_report_adapter::{format_summary_table, CsvReportAdapter};
use rangetrader::adapters::file_config_adapter::FileConfigAdapter;
use rangetrader::cli::run_pipeline;
use rangetrader::domain::backtest::{run_all, run_variant};
use rangetrader::domain::config_validation::{build_run_config, RunConfig};
use rangetrader::domain::error::RangetraderError;
use rangetrader::domain::metrics::{ProfitFactor, VariantSummary};
use rangetrader::domain::session::{segment_days, DaySkip};
use rangetrader::domain::strategy::{Direction, DirectionFilter};
use rangetrader::domain::trade::{ExitReason, Trade};
use rangetrader::ports::report_port::ReportPort;
use std::cell::RefCell;
use std::sync::atomic::AtomicBool;

struct RecordingReportPort {
    trades: RefCell<Vec<Trade>>,
    summaries: RefCell<Vec<VariantSummary>>,
}

impl RecordingReportPort {
    fn new() -> Self {
        Self {
            trades: RefCell::new(Vec::new()),
            summaries: RefCell::new(Vec::new()),
        }
    }
}

impl ReportPort for RecordingReportPort {
    fn write_trades(&self, trades: &[&Trade]) -> Result<(), RangetraderError> {
        self.trades
            .borrow_mut()
            .extend(trades.iter().map(|t| (*t).clone()));
        Ok(())
    }

    fn write_summary(&self, summaries: &[VariantSummary]) -> Result<(), RangetraderError> {
        self.summaries.borrow_mut().extend_from_slice(summaries);
        Ok(())
    }
}

const PIPELINE_INI: &str = r#"
[backtest]
data_file = unused.csv
symbol = ES
variants = orb, pb
baseline = orb

[session]
range_minutes = 4
min_range_bars = 2

[variant.orb]
entry_mode = breakout

[variant.pb]
entry_mode = pullback
pullback_depth = 0.5
"#;

fn pipeline_config(extra_backtest: &str) -> RunConfig {
    let content = PIPELINE_INI.replace(
        "baseline = orb\n",
        &format!("baseline = orb\n{extra_backtest}\n"),
    );
    build_run_config(&FileConfigAdapter::from_string(&content).unwrap()).unwrap()
}

fn three_day_bars() -> Vec<Bar> {
    let mut bars = stop_loss_day(date(2024, 3, 4));
    bars.extend(take_profit_day(date(2024, 3, 5)));
    bars.extend(quiet_day(date(2024, 3, 6)));
    bars
}

mod scenarios {
    use super::*;

    #[test]
    fn breakout_long_stopped_at_opposite_boundary() {
        let calendar = test_calendar();
        let segmentation = segment_days(&stop_loss_day(date(2024, 3, 4)), &calendar);
        let run = run_variant(&segmentation, &calendar, &breakout_variant("orb"));

        assert_eq!(run.trades.len(), 1);
        let trade = &run.trades[0];
        assert_eq!(trade.direction, Direction::Long);
        assert_eq!(trade.entry_price, 106.0);
        assert_eq!(trade.entry_time, date(2024, 3, 4).and_time(time(9, 34)));
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(trade.exit_price, 100.0);
        assert_relative_eq!(trade.pnl_pct, -5.660377358490567, epsilon = 1e-9);
        assert_relative_eq!(trade.r_multiple, -1.0, epsilon = 1e-12);
        assert_relative_eq!(trade.mae_pct, 6.1 / 106.0 * 100.0, epsilon = 1e-9);
        assert_relative_eq!(trade.mfe_pct, 0.5 / 106.0 * 100.0, epsilon = 1e-9);
        assert_eq!(trade.range_high, 105.0);
        assert_eq!(trade.range_low, 100.0);
        assert_eq!(trade.bars_held, 1);
    }

    #[test]
    fn pullback_short_fills_at_trigger_not_bar_high() {
        let calendar = test_calendar();
        let bars = DayBuilder::new(date(2024, 3, 4))
            .range(100.0, 105.0, 4)
            .bar(100.5, 98.8, 99.0)
            .bar(101.30, 100.80, 101.0)
            .flat(101.0, 5)
            .build();
        let segmentation = segment_days(&bars, &calendar);
        let mut config = pullback_variant("pb", 0.25);
        config.direction = DirectionFilter::ShortOnly;

        let run = run_variant(&segmentation, &calendar, &config);

        assert_eq!(run.trades.len(), 1);
        let trade = &run.trades[0];
        assert_eq!(trade.direction, Direction::Short);
        assert_relative_eq!(trade.entry_price, 101.25, epsilon = 1e-12);
        assert_eq!(trade.entry_time, date(2024, 3, 4).and_time(time(9, 35)));
        assert_eq!(trade.exit_reason, ExitReason::Time);
    }

    #[test]
    fn all_winning_variant_reports_infinite_profit_factor() {
        let calendar = test_calendar();
        let mut bars = take_profit_day(date(2024, 3, 4));
        bars.extend(take_profit_day(date(2024, 3, 5)));
        let segmentation = segment_days(&bars, &calendar);

        let aggregator = run_all(
            &[breakout_variant("orb")],
            &segmentation,
            &calendar,
            false,
            None,
        );
        let summaries = aggregator.summarize("orb");
        let orb = &summaries[0];

        assert_eq!(orb.trades, 2);
        assert_eq!(orb.losses, 0);
        assert_eq!(orb.profit_factor, ProfitFactor::Infinite);
        assert_eq!(orb.exits_tp, 2);
        assert_relative_eq!(orb.avg_r, 2.0, epsilon = 1e-12);

        let table = format_summary_table(&summaries);
        assert!(table.contains("inf"));

        let dir = tempfile::TempDir::new().unwrap();
        let report = CsvReportAdapter::new(dir.path().join("t.csv"), dir.path().join("s.csv"));
        report.write_summary(&summaries).unwrap();
        let content = std::fs::read_to_string(dir.path().join("s.csv")).unwrap();
        assert!(content.lines().nth(1).unwrap().contains(",inf,"));
    }

    #[test]
    fn hard_exit_closes_open_position_at_bar_close() {
        let calendar = test_calendar();
        let bars = DayBuilder::new(date(2024, 3, 4))
            .range(100.0, 105.0, 4)
            .bar(106.2, 104.8, 106.0)
            .flat(106.0, 10)
            .build();
        let segmentation = segment_days(&bars, &calendar);
        let mut config = breakout_variant("orb");
        config.hard_exit = time(9, 40);

        let run = run_variant(&segmentation, &calendar, &config);

        let trade = &run.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::Time);
        assert_eq!(trade.exit_time, date(2024, 3, 4).and_time(time(9, 40)));
        assert_relative_eq!(trade.pnl_pct, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn breakout_after_hard_exit_is_no_trade() {
        let calendar = test_calendar();
        let bars = DayBuilder::new(date(2024, 3, 4))
            .range(100.0, 105.0, 4)
            .flat(102.0, 2)
            .bar(106.2, 104.8, 106.0)
            .build();
        let segmentation = segment_days(&bars, &calendar);
        let mut config = breakout_variant("orb");
        config.hard_exit = time(9, 36);

        let run = run_variant(&segmentation, &calendar, &config);

        assert!(run.trades.is_empty());
        assert_eq!(run.no_trade_days, 1);
        assert_eq!(run.days_simulated(), 1);
    }
}

mod pipeline {
    use super::*;

    #[test]
    fn full_pipeline_with_mock_ports() {
        let config = pipeline_config("");
        let data = MockDataPort::new().with_bars("ES", three_day_bars());
        let report = RecordingReportPort::new();

        let summaries = run_pipeline(&config, &data, &report, None).unwrap();

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].variant, "orb");
        assert_eq!(summaries[0].trades, 2);
        assert_eq!(summaries[0].exits_sl, 1);
        assert_eq!(summaries[0].exits_tp, 1);
        assert_eq!(summaries[0].no_trade_days, 1);
        assert_eq!(summaries[0].days_simulated, 3);
        assert_eq!(summaries[0].fill_rate_vs_baseline, Some(1.0));
        assert_eq!(summaries[1].variant, "pb");
        assert_eq!(summaries[1].trades, 1);
        assert_eq!(summaries[1].fill_rate_vs_baseline, Some(0.5));

        let trades = report.trades.borrow();
        assert_eq!(trades.len(), 3);
        assert!(trades[..2].iter().all(|t| t.variant == "orb"));
        assert_eq!(trades[2].variant, "pb");
        assert_eq!(*report.summaries.borrow(), summaries);
    }

    #[test]
    fn date_bounds_limit_simulated_days() {
        let config = pipeline_config("start_date = 2024-03-05\nend_date = 2024-03-05");
        let data = MockDataPort::new().with_bars("ES", three_day_bars());
        let report = RecordingReportPort::new();

        let summaries = run_pipeline(&config, &data, &report, None).unwrap();

        assert_eq!(summaries[0].days_simulated, 1);
        assert_eq!(summaries[0].trades, 1);
        assert_eq!(summaries[0].exits_tp, 1);
    }

    #[test]
    fn data_errors_propagate() {
        let config = pipeline_config("");
        let data = MockDataPort::new().with_error("ES", "disk on fire");
        let report = RecordingReportPort::new();

        let err = run_pipeline(&config, &data, &report, None).unwrap_err();
        assert!(matches!(err, RangetraderError::Data { .. }));
        assert!(report.trades.borrow().is_empty());
    }

    #[test]
    fn missing_symbol_is_no_data() {
        let config = pipeline_config("");
        let data = MockDataPort::new().with_bars("NQ", three_day_bars());
        let err = run_pipeline(&config, &data, &RecordingReportPort::new(), None).unwrap_err();
        assert!(matches!(err, RangetraderError::NoData { symbol } if symbol == "ES"));
    }

    #[test]
    fn cancelled_batch_writes_empty_tables() {
        let config = pipeline_config("");
        let data = MockDataPort::new().with_bars("ES", three_day_bars());
        let report = RecordingReportPort::new();
        let cancel = AtomicBool::new(true);

        let summaries = run_pipeline(&config, &data, &report, Some(&cancel)).unwrap();

        assert!(summaries.is_empty());
        assert!(report.trades.borrow().is_empty());
    }
}

mod fill_rate {
    use super::*;
    use chrono::Weekday;

    #[test]
    fn fill_rate_uses_days_both_variants_admitted() {
        let calendar = test_calendar();
        let segmentation = segment_days(&three_day_bars(), &calendar);

        let baseline = breakout_variant("orb");
        let mut no_tuesday = breakout_variant("no_tue");
        no_tuesday.day_filters.skip_weekdays = vec![Weekday::Tue];
        let mut shorts = breakout_variant("shorts");
        shorts.direction = DirectionFilter::ShortOnly;

        let aggregator = run_all(
            &[baseline, no_tuesday, shorts],
            &segmentation,
            &calendar,
            true,
            None,
        );
        let summaries = aggregator.summarize("orb");

        assert_eq!(summaries[1].trades, 1);
        assert_eq!(summaries[1].days_simulated, 2);
        assert_eq!(summaries[1].skipped_by_reason.get("weekday"), Some(&1));
        assert_eq!(summaries[1].fill_rate_vs_baseline, Some(1.0));
        assert_eq!(summaries[2].trades, 0);
        assert_eq!(summaries[2].fill_rate_vs_baseline, Some(0.0));
    }

    #[test]
    fn baseline_without_trades_leaves_fill_rate_empty() {
        let calendar = test_calendar();
        let segmentation = segment_days(&quiet_day(date(2024, 3, 4)), &calendar);

        let aggregator = run_all(
            &[breakout_variant("orb"), pullback_variant("pb", 0.5)],
            &segmentation,
            &calendar,
            false,
            None,
        );
        let summaries = aggregator.summarize("orb");

        assert!(summaries.iter().all(|s| s.fill_rate_vs_baseline.is_none()));
        assert_eq!(summaries[0].profit_factor, ProfitFactor::Finite(0.0));
    }
}

mod skipped_days {
    use super::*;

    #[test]
    fn anomalous_day_is_skipped_by_every_variant() {
        let calendar = test_calendar();
        let mut broken = stop_loss_day(date(2024, 3, 5));
        broken.swap(1, 2);
        let mut bars = take_profit_day(date(2024, 3, 4));
        bars.extend(broken);

        let segmentation = segment_days(&bars, &calendar);
        assert_eq!(segmentation.days.len(), 1);
        assert_eq!(segmentation.anomalies().count(), 1);

        let aggregator = run_all(
            &[breakout_variant("orb"), pullback_variant("pb", 0.5)],
            &segmentation,
            &calendar,
            false,
            None,
        );
        for summary in aggregator.summarize("orb") {
            assert_eq!(summary.anomalies, 1);
            assert_eq!(summary.days_skipped, 1);
            assert_eq!(summary.days_simulated, 1);
        }
    }

    #[test]
    fn holidays_and_thin_ranges_are_skipped() {
        let mut calendar = test_calendar();
        calendar.holidays.insert(date(2024, 3, 4));
        let mut bars = take_profit_day(date(2024, 3, 4));
        bars.extend(
            DayBuilder::new(date(2024, 3, 5))
                .range(100.0, 105.0, 1)
                .at(9, 40)
                .bar(106.2, 104.8, 106.0)
                .build(),
        );

        let segmentation = segment_days(&bars, &calendar);
        let run = run_variant(&segmentation, &calendar, &breakout_variant("orb"));

        assert!(run.trades.is_empty());
        assert_eq!(run.days_simulated(), 0);
        let reasons: Vec<&DaySkip> = run.skipped.iter().map(|s| &s.reason).collect();
        assert_eq!(reasons[0], &DaySkip::Holiday);
        assert!(matches!(
            reasons[1],
            DaySkip::InsufficientRangeBars { bars: 1, minimum: 2 }
        ));
    }

    #[test]
    fn bars_outside_session_are_ignored() {
        let calendar = test_calendar();
        let mut bars = DayBuilder::new(date(2024, 3, 4))
            .at(8, 0)
            .bar(200.0, 50.0, 150.0)
            .build();
        bars.extend(stop_loss_day(date(2024, 3, 4)));

        let segmentation = segment_days(&bars, &calendar);
        let run = run_variant(&segmentation, &calendar, &breakout_variant("orb"));

        assert_eq!(run.trades.len(), 1);
        assert_eq!(run.trades[0].range_high, 105.0);
        assert_eq!(run.trades[0].range_low, 100.0);
    }
}

mod determinism {
    use super::*;

    #[test]
    fn parallel_and_sequential_runs_agree() {
        let calendar = test_calendar();
        let segmentation = segment_days(&three_day_bars(), &calendar);
        let variants = vec![
            breakout_variant("orb"),
            pullback_variant("pb25", 0.25),
            pullback_variant("pb50", 0.5),
        ];

        let parallel = run_all(&variants, &segmentation, &calendar, true, None);
        let sequential = run_all(&variants, &segmentation, &calendar, false, None);

        let p: Vec<&Trade> = parallel.trades().collect();
        let s: Vec<&Trade> = sequential.trades().collect();
        assert_eq!(p, s);
        assert_eq!(parallel.summarize("orb"), sequential.summarize("orb"));
        let names: Vec<&str> = parallel.runs().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["orb", "pb25", "pb50"]);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let config = pipeline_config("");
        let data = MockDataPort::new().with_bars("ES", three_day_bars());

        let first = run_pipeline(&config, &data, &RecordingReportPort::new(), None).unwrap();
        let second = run_pipeline(&config, &data, &RecordingReportPort::new(), None).unwrap();
        assert_eq!(first, second);
    }
}
