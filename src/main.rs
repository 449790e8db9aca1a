use anyhow::Result;
use clap::Parser;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use plank::config;
use plank::scheduler::Scheduler;

#[derive(Parser)]
#[command(name = "plank")]
#[command(about = "Status-line block scheduler for i3bar-compatible bars", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the block configuration file
    #[arg(default_value = "blocks.toml")]
    config: PathBuf,

    /// Raise the log level (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let blocks = config::load(&cli.config)?;
    let mut scheduler = Scheduler::new(blocks, io::stdout())?;
    scheduler.run()
}

/// Logs go to stderr; stdout carries the status-line protocol.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
