use anyhow::{Context, Result};
use netpulse_agent::config::AgentConfig;
use netpulse_agent::probe::build_probes;
use netpulse_agent::scheduler::Scheduler;
use netpulse_agent::sink::{InfluxSink, MetricSink};
use std::future::Future;

#[tokio::main]
async fn main() -> Result<()> {
    netpulse_agent::logging::init()?;

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());
    let config = AgentConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;
    tracing::info!(server = %config.influxdb.server, bucket = %config.influxdb.bucket, "netpulse-agent starting");

    let probes = build_probes(&config)?;
    let sink = InfluxSink::new(&config.influxdb, config.series_names())?;
    let mut scheduler = Scheduler::new(probes, sink)?;
    // Installed before any blocking work: interrupts during startup or a tick are queued.
    let mut shutdown = Box::pin(shutdown_signal()?);

    let connected = tokio::select! {
        biased;
        _ = &mut shutdown => None,
        result = scheduler
            .sink_mut()
            .connect_when_healthy(config.influxdb.health_check_interval()) => Some(result),
    };
    match connected {
        None => {
            tracing::info!("Interrupted before connecting to InfluxDB");
            scheduler.close().await;
            return Ok(());
        }
        Some(Err(e)) => {
            tracing::error!(error = %e, "Could not connect to InfluxDB");
            scheduler.close().await;
            return Err(e.into());
        }
        Some(Ok(())) => {}
    }

    let result = scheduler.run_until(shutdown).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Critical error - shutting down");
    }
    scheduler.close().await;
    result.map_err(Into::into)
}

#[cfg(unix)]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => tracing::info!("Caught interrupt. Exiting"),
            _ = terminate.recv() => tracing::info!("Caught terminate. Exiting"),
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    Ok(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Caught interrupt. Exiting");
        }
    })
}
