use clap::Parser;
use rangetrader::cli::{init_logging, run, Cli};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.debug);
    run(cli)
}
