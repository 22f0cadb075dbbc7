use clap::Parser;
use kline_backtester::cli::{run, Cli};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let parsed = cli.log_level.parse::<tracing::Level>().ok();
    let level = parsed.unwrap_or(tracing::Level::INFO);
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(Targets::new().with_default(level));
    tracing_subscriber::registry().with(fmt_layer).init();

    if parsed.is_none() {
        tracing::warn!(requested = %cli.log_level, "unknown log level, using info");
    }

    run(cli)
}
