mod terminal;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use hostpulse_core::HostpulseConfig;
use hostpulse_services::{GpuCapability, RefreshLoop, Sampler};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use terminal::TerminalSink;

#[derive(Parser)]
#[command(name = "hostpulse")]
#[command(about = "hostpulse - live host telemetry in the terminal", long_about = None)]
struct Cli {
    /// Refresh interval in milliseconds (overrides HOSTPULSE_INTERVAL_MS)
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("hostpulse_services=info,hostpulse_cli=info")
        }))
        .init();

    let cli = Cli::parse();
    let config = HostpulseConfig::from_env()?.with_interval_ms(cli.interval_ms);

    info!(interval_ms = config.refresh.interval_ms, "hostpulse starting");

    let probes = config.probes.clone();
    let sampler = tokio::task::spawn_blocking(move || {
        let capability = GpuCapability::detect(probes.timeout());
        Sampler::from_config(&probes, capability)
    })
    .await?;

    let refresh = RefreshLoop::new(sampler, config.refresh.interval());
    let cancel = CancellationToken::new();

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested, finishing current tick");
            ctrl_c.cancel();
        }
    });

    let mut sink = TerminalSink::new(std::io::stdout(), cli.output);
    refresh.run(&mut sink, cancel).await;

    Ok(())
}
