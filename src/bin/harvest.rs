use std::sync::Arc;

use clap::Parser;
use perf_harvest::{
    collectors::MetricCollector,
    config::{Config, read_config_file},
    executor::{CommandRunner, LocalRunner},
    scheduler::TriggerGate,
};
use tracing::{debug, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: Option<String>,

    /// Run without a trigger gate; tasks gated on the load signal are
    /// skipped instead of waited for
    #[arg(long)]
    no_gate: bool,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("perf_harvest", LevelFilter::TRACE),
        ("harvest", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    };

    let runner: Arc<dyn CommandRunner> = Arc::new(LocalRunner::new(config.command_timeout()));

    let gate = if args.no_gate {
        debug!("running without a trigger gate, gated tasks will be skipped");
        None
    } else {
        Some(TriggerGate::new(config.trigger.clone()).spawn(Arc::clone(&runner)))
    };

    let collector = MetricCollector::new(config, Arc::clone(&runner), gate.clone())?;
    let report = collector.run().await?;

    if let Some(gate) = gate {
        gate.stop().await;
    }

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
