use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` directives are honoured and
/// the agent's own crates default to `info`.
pub fn init() -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("netpulse_agent=info".parse()?)
        .add_directive("netpulse_collector=info".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}
