use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bw_acquire_prometheus::PrometheusOptions;
use bw_acquire_ssh::{ResticProbe, SshOptions};
use bw_core::{StalenessPolicy, HOUR_SECONDS};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub metrics: MetricsConfig,
    pub probe: ProbeConfig,
    pub staleness: StalenessConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub accept_invalid_certs: bool,
    pub deadline_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9090".to_string(),
            api_key: None,
            timeout_secs: 10,
            accept_invalid_certs: true,
            deadline_secs: 30,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub host: String,
    pub domain: Option<String>,
    pub ssh_program: String,
    pub use_sudo: bool,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub restic_program: String,
    pub snapshot_limit: u32,
    pub deadline_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            domain: None,
            ssh_program: "ssh".to_string(),
            use_sudo: true,
            connect_timeout_secs: 60,
            command_timeout_secs: 120,
            restic_program: "restic".to_string(),
            snapshot_limit: 1,
            deadline_secs: 900,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StalenessConfig {
    pub snapshot_backup_hours: u64,
    pub physical_db_backup_hours: u64,
    pub replication_hours: u64,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self { snapshot_backup_hours: 26, physical_db_backup_hours: 26, replication_hours: 2 }
    }
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    /// Built-in defaults when `path` does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from(shellexpand::tilde("~/.config/backwatch/backwatch.toml").to_string())
    }

    /// Expand a user supplied path such as `~/backwatch.toml`.
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// `host.domain`, or the bare host when no domain is set or the host is
    /// already qualified.
    pub fn fqdn(&self) -> String {
        let host = self.probe.host.trim();
        match self.probe.domain.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(domain) if !host.contains('.') && host != "localhost" => format!("{host}.{domain}"),
            _ => host.to_string(),
        }
    }

    pub fn staleness_policy(&self) -> StalenessPolicy {
        StalenessPolicy {
            snapshot_backup_seconds: self.staleness.snapshot_backup_hours * HOUR_SECONDS,
            physical_db_backup_seconds: self.staleness.physical_db_backup_hours * HOUR_SECONDS,
            replication_seconds: self.staleness.replication_hours * HOUR_SECONDS,
        }
    }

    pub fn prometheus_options(&self) -> PrometheusOptions {
        PrometheusOptions {
            url: self.metrics.url.clone(),
            api_key: self.metrics.api_key.clone(),
            timeout: Duration::from_secs(self.metrics.timeout_secs),
            accept_invalid_certs: self.metrics.accept_invalid_certs,
        }
    }

    pub fn ssh_options(&self) -> SshOptions {
        SshOptions {
            host: self.fqdn(),
            program: self.probe.ssh_program.clone(),
            use_sudo: self.probe.use_sudo,
            connect_timeout: Duration::from_secs(self.probe.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.probe.command_timeout_secs),
        }
    }

    pub fn restic_probe(&self) -> ResticProbe {
        ResticProbe { program: self.probe.restic_program.clone(), snapshot_limit: self.probe.snapshot_limit }
    }
}
