//! rpcm-scheduler - periodic RPCM outlet tests.

use clap::Parser;
use rpcm_tester::config::SchedulerConfig;
use rpcm_tester::device::RpcmClient;
use rpcm_tester::events::EventLogger;
use rpcm_tester::scheduler::Scheduler;

use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rpcm-scheduler", version, about = "Periodic RPCM outlet tester")]
struct Cli {
    /// Path to the configuration file (JSON with comments)
    #[arg(long, env = "RPCM_CONFIG", default_value = "./config.jsonc")]
    config: PathBuf,

    /// Run a single pass over the targets and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("rpcm_tester=info".parse()?))
        .init();

    let cli = Cli::parse();

    let cfg = SchedulerConfig::load(&cli.config)?;
    tracing::info!("Loaded {} targets from {}", cfg.targets.len(), cli.config.display());

    let (logger, status) = EventLogger::begin(&cfg.logging);
    if !status.success {
        println!("{}", serde_json::to_string(&status)?);
        return Ok(());
    }
    tracing::info!("Event log ready: {}", status.message);
    let logger = Arc::new(logger);

    let client = RpcmClient::new(logger.clone())?;
    let scheduler = Scheduler::new(&cfg, &client, &logger);

    if cli.once {
        let summary = scheduler.run_cycle().await;
        tracing::info!("Single pass done: {} passed, {} failed", summary.passed, summary.failed);
    } else {
        scheduler.run_forever().await;
    }

    Ok(())
}
