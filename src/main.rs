use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use pgtunnel::config::ProxyConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let config = ProxyConfig::from_env()?;

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let sweep = config
        .sweep_interval
        .map(|d| format!("{}s", d.as_secs()))
        .unwrap_or_else(|| "off".to_string());
    info!(
        target: "startup",
        "pgtunnel starting: RUST_LOG='{}', http_addr={}, database='{}', session_ttl={}s, sweep={}",
        rust_log,
        config.http_addr,
        config.redacted_database_url(),
        config.session_ttl.as_secs(),
        sweep
    );

    pgtunnel::server::run(config).await
}
