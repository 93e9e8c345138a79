use anyhow::{Context, Result};
use bw_acquire_prometheus::PrometheusSource;
use bw_acquire_ssh::{RemoteExecutor, SshExecutor};

use crate::Config;

/// The metrics endpoint answers the build-info API.
pub async fn check_metrics(cfg: &Config) -> Result<String> {
    let prom = PrometheusSource::new(&cfg.prometheus_options())?;
    let version = prom.check().await.with_context(|| format!("prometheus at {}", prom.base_url()))?;
    let auth = if prom.has_api_key() { "with api key" } else { "without api key" };
    Ok(format!("prometheus {} reachable {auth} (version {})", prom.base_url(), or_unknown(&version)))
}

/// An ssh round trip to the monitored host completes within the connect timeout.
pub async fn check_ssh(cfg: &Config) -> Result<String> {
    let ssh = SshExecutor::new(cfg.ssh_options());
    ssh.warm_up().await.with_context(|| format!("ssh to {}", ssh.host()))?;
    Ok(format!("ssh {} reachable", ssh.host()))
}

/// Connectivity checks for the configured sources; stops at the first failure.
pub async fn doctor(cfg: &Config, verify: bool) -> Result<Vec<String>> {
    let mut lines = vec![check_metrics(cfg).await?];
    if verify {
        lines.push(check_ssh(cfg).await?);
    }
    Ok(lines)
}

fn or_unknown(s: &str) -> &str {
    if s.is_empty() {
        "unknown"
    } else {
        s
    }
}
