//! rpcm-analyze - summarize an RPCM event log.

use clap::{Parser, ValueEnum};
use rpcm_tester::analyzer::{LogAggregator, PathStripPolicy};

use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, ValueEnum)]
enum StripPath {
    /// Drop `path` only from errors that carry a `code`
    Coded,
    /// Drop `path` from every structured error
    Always,
}

impl From<StripPath> for PathStripPolicy {
    fn from(value: StripPath) -> Self {
        match value {
            StripPath::Coded => PathStripPolicy::CodedOnly,
            StripPath::Always => PathStripPolicy::Always,
        }
    }
}

#[derive(Parser)]
#[command(name = "rpcm-analyze", version, about = "Summarize an RPCM event log")]
struct Cli {
    /// Event log written by rpcm-scheduler
    logfile: PathBuf,

    /// Which structured errors lose their `path` before grouping
    #[arg(long, value_enum, default_value = "coded")]
    strip_path: StripPath,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("rpcm_tester=warn".parse()?))
        .init();

    let cli = Cli::parse();

    if !cli.logfile.exists() {
        println!("File with name {} does not exist", cli.logfile.display());
        return Ok(());
    }

    let mut aggregator = LogAggregator::new(cli.strip_path.into());
    aggregator.ingest_file(&cli.logfile)?;
    print!("{}", aggregator.report());

    Ok(())
}
