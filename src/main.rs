//! Hub Publisher - sends one test event to a broker hub
//!
//! Publishes a single JSON message and prints the outcome, for manually
//! verifying a downstream trigger. Exits 0 when the message was
//! acknowledged and 1 when publishing failed.

use anyhow::Result;
use clap::Parser;
use hub_publisher::{
    send_test_message, BrokerConnector, Cli, Console, LogFormat, MemoryBroker, PublisherConfig,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration first to get log level
    let config = PublisherConfig::from_env()?.apply_cli(cli)?;

    init_tracing(&config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        hub = %config.connection.hub_name,
        endpoint = ?config.connection.endpoint,
        "Starting hub publisher"
    );

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    // memory:// endpoints publish into a loopback broker holding the configured hub
    let loopback = MemoryBroker::new().with_hub(config.connection.hub_name.clone());
    let connector = BrokerConnector::new(loopback);
    let mut console = Console::stdio();

    match send_test_message(&connector, &config, &mut rng, &mut console).await {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(_) => Ok(ExitCode::FAILURE),
    }
}

/// Log to stderr so stdout carries only the report
fn init_tracing(config: &PublisherConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("hub_publisher={}", config.log_level).parse()?)
        .add_directive("async_nats=warn".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    Ok(())
}
