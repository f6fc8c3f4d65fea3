mod channel;
mod cli;
mod engine;
mod model;
mod orchestrator;
mod protocol;
mod tempfiles;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // stdout belongs to --print-config; logs always go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_logging(&args.log_level);

    if let Err(e) = cli::run(args) {
        tracing::error!("{e:#}");
        return Err(e);
    }
    Ok(())
}
