//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::{format_summary_table, CsvReportAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::run_all;
use crate::domain::config_validation::{build_run_config, RunConfig};
use crate::domain::error::RangetraderError;
use crate::domain::metrics::VariantSummary;
use crate::domain::session::segment_days;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "rangetrader", about = "Intraday range breakout and pullback simulator")]
pub struct Cli {
    /// Log progress (info level)
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Log every fill and exit (debug level)
    #[arg(long, global = true)]
    pub debug: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Simulate every configured variant and write the trade and summary tables
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Override [backtest] data_file
        #[arg(long)]
        data: Option<PathBuf>,
        /// Override [backtest] trades_output
        #[arg(long)]
        trades: Option<PathBuf>,
        /// Override [backtest] summary_output
        #[arg(long)]
        summary: Option<PathBuf>,
        /// Run variants one after another
        #[arg(long)]
        sequential: bool,
    },
    /// Validate a configuration without reading data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show bar count, day count and date range of a data file
    Info {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        data: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn execute(command: Command) -> Result<(), RangetraderError> {
    match command {
        Command::Run {
            config,
            data,
            trades,
            summary,
            sequential,
        } => run_simulation(&config, data, trades, summary, sequential),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, data } => run_info(config.as_deref(), data),
    }
}

/// Install the stderr log subscriber. `RUST_LOG` overrides the flag levels.
pub fn init_logging(verbose: bool, debug: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn load_config(path: &Path) -> Result<RunConfig, RangetraderError> {
    eprintln!("Loading config from {}", path.display());
    let adapter = FileConfigAdapter::from_file(path)?;
    build_run_config(&adapter)
}

fn run_simulation(
    config_path: &Path,
    data: Option<PathBuf>,
    trades: Option<PathBuf>,
    summary: Option<PathBuf>,
    sequential: bool,
) -> Result<(), RangetraderError> {
    // Stage 1: configuration, fully validated before any data is read
    let mut run_config = load_config(config_path)?;
    if let Some(path) = data {
        run_config.settings.data_file = path;
    }
    if let Some(path) = trades {
        run_config.settings.trades_output = path;
    }
    if let Some(path) = summary {
        run_config.settings.summary_output = path;
    }
    if sequential {
        run_config.settings.parallel = false;
    }

    // Stage 2: data and reports
    let data_port = CsvAdapter::new(run_config.settings.data_file.clone());
    let report_port = CsvReportAdapter::new(
        run_config.settings.trades_output.clone(),
        run_config.settings.summary_output.clone(),
    );

    let summaries = run_pipeline(&run_config, &data_port, &report_port, None)?;

    println!("{}", format_summary_table(&summaries));
    eprintln!(
        "Trades written to: {}",
        run_config.settings.trades_output.display()
    );
    eprintln!(
        "Summary written to: {}",
        run_config.settings.summary_output.display()
    );
    Ok(())
}

/// Load bars, simulate every variant and write both tables.
pub fn run_pipeline(
    run_config: &RunConfig,
    data_port: &dyn DataPort,
    report_port: &dyn ReportPort,
    cancel: Option<&AtomicBool>,
) -> Result<Vec<VariantSummary>, RangetraderError> {
    let settings = &run_config.settings;
    let bars = data_port.fetch_bars(&settings.symbol, settings.start_date, settings.end_date)?;

    let segmentation = segment_days(&bars, &run_config.calendar);
    eprintln!(
        "Simulating {} variants over {} days ({} skipped by calendar, {} anomalies)",
        run_config.variants.len(),
        segmentation.days.len(),
        segmentation.skipped.len(),
        segmentation.anomalies().count()
    );
    let aggregator = run_all(
        &run_config.variants,
        &segmentation,
        &run_config.calendar,
        settings.parallel,
        cancel,
    );

    let trades: Vec<_> = aggregator.trades().collect();
    let summaries = aggregator.summarize(&settings.baseline);
    report_port.write_trades(&trades)?;
    report_port.write_summary(&summaries)?;
    Ok(summaries)
}

fn run_validate(config_path: &Path) -> Result<(), RangetraderError> {
    let run_config = load_config(config_path)?;
    let settings = &run_config.settings;
    let calendar = &run_config.calendar;

    eprintln!("Config validated successfully");
    eprintln!("\nData:");
    eprintln!("  file:     {}", settings.data_file.display());
    eprintln!("  symbol:   {}", settings.symbol);
    eprintln!(
        "  session:  {}-{}, range {} min (min {} bars), {} holidays",
        calendar.open.format("%H:%M"),
        calendar.close.format("%H:%M"),
        calendar.range_minutes,
        calendar.min_range_bars,
        calendar.holidays.len()
    );

    eprintln!("\nVariants (baseline: {}):", settings.baseline);
    for v in &run_config.variants {
        eprintln!(
            "  {}: {:?}, stop {:?}, targets {:?} x{}, exit {}",
            v.name,
            v.entry_mode,
            v.stop_mode,
            v.take_profit_mode,
            v.tiers.len(),
            v.hard_exit.format("%H:%M")
        );
    }
    Ok(())
}

fn run_info(config_path: Option<&Path>, data: Option<PathBuf>) -> Result<(), RangetraderError> {
    let (data_file, calendar, symbol) = match (data, config_path) {
        (Some(path), None) => {
            let symbol = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            (path, Default::default(), symbol)
        }
        (data, Some(config_path)) => {
            let run_config = load_config(config_path)?;
            let settings = run_config.settings;
            (
                data.unwrap_or(settings.data_file),
                run_config.calendar,
                settings.symbol,
            )
        }
        (None, None) => {
            return Err(RangetraderError::missing("backtest", "data_file"));
        }
    };

    let adapter = CsvAdapter::new(data_file.clone());
    let Some((first, last, count)) = adapter.data_range(&symbol)? else {
        return Err(RangetraderError::NoData { symbol });
    };
    let bars = adapter.fetch_bars(&symbol, None, None)?;
    let segmentation = segment_days(&bars, &calendar);

    println!("{}: {}", symbol, data_file.display());
    println!("  bars:      {count}");
    println!("  range:     {first} to {last}");
    println!("  days:      {}", segmentation.days.len());
    println!("  skipped:   {}", segmentation.skipped.len());
    println!("  anomalies: {}", segmentation.anomalies().count());
    Ok(())
}
