//! Process configuration read from `PGTUNNEL_*` environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;

pub const ENV_HTTP_ADDR: &str = "PGTUNNEL_HTTP_ADDR";
pub const ENV_DATABASE_URL: &str = "PGTUNNEL_DATABASE_URL";
pub const ENV_SESSION_TTL_SECS: &str = "PGTUNNEL_SESSION_TTL_SECS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "PGTUNNEL_SWEEP_INTERVAL_SECS";

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub http_addr: SocketAddr,
    /// libpq-style key/value string or `postgres://` URL.
    pub database_url: String,
    pub session_ttl: Duration,
    /// None disables the background sweeper.
    pub sweep_interval: Option<Duration>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 7878)),
            database_url: "host=localhost user=postgres".to_string(),
            session_ttl: crate::session::DEFAULT_SESSION_TTL,
            sweep_interval: Some(Duration::from_secs(60)),
        }
    }
}

impl ProxyConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset or blank values keep the default.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = ProxyConfig::default();
        if let Some(addr) = get(ENV_HTTP_ADDR) {
            cfg.http_addr = addr.parse().with_context(|| format!("{} is not a socket address: {}", ENV_HTTP_ADDR, addr))?;
        }
        if let Some(url) = get(ENV_DATABASE_URL) {
            cfg.database_url = url;
        }
        cfg.pg_config()?;
        if let Some(ttl) = get(ENV_SESSION_TTL_SECS) {
            let secs: u64 = ttl.parse().with_context(|| format!("{} must be a number of seconds: {}", ENV_SESSION_TTL_SECS, ttl))?;
            anyhow::ensure!(secs > 0, "{} must be positive", ENV_SESSION_TTL_SECS);
            cfg.session_ttl = Duration::from_secs(secs);
        }
        if let Some(interval) = get(ENV_SWEEP_INTERVAL_SECS) {
            let secs: u64 = interval
                .parse()
                .with_context(|| format!("{} must be a number of seconds: {}", ENV_SWEEP_INTERVAL_SECS, interval))?;
            cfg.sweep_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        Ok(cfg)
    }

    pub fn pg_config(&self) -> anyhow::Result<tokio_postgres::Config> {
        self.database_url
            .parse::<tokio_postgres::Config>()
            .with_context(|| format!("invalid {}", ENV_DATABASE_URL))
    }

    /// Database URL safe for logs: any password is masked.
    pub fn redacted_database_url(&self) -> String {
        redact_password(&self.database_url)
    }
}

fn redact_password(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("postgres://").or_else(|| url.strip_prefix("postgresql://")) {
        let scheme = &url[..url.len() - rest.len()];
        if let Some((userinfo, host)) = rest.split_once('@') {
            if let Some((user, _)) = userinfo.split_once(':') {
                return format!("{}{}:***@{}", scheme, user, host);
            }
        }
        return url.to_string();
    }
    url.split_whitespace()
        .map(|kv| match kv.split_once('=') {
            Some((k, _)) if k.eq_ignore_ascii_case("password") => format!("{}=***", k),
            _ => kv.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
