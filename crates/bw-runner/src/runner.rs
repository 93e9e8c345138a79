use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bw_acquire::{collect, SignalSource};
use bw_acquire_prometheus::PrometheusSource;
use bw_acquire_ssh::{ProbeSource, SshExecutor};
use bw_core::{JobRegistry, StalenessPolicy, Subsystem};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{util::now_epoch_seconds, Config};

/// Where signals come from for one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Exported metrics in the metrics store.
    Metrics,
    /// Direct probes on the monitored host over ssh.
    Verify,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Metrics => "metrics",
            Mode::Verify => "verify",
        }
    }
}

pub struct Runner {
    pub cfg: Config,
    pub mode: Mode,
    source: Arc<dyn SignalSource>,
    source_label: String,
    deadline: Duration,
}

/// One reconciled run and the context needed to present it.
pub struct RunResult {
    pub registry: JobRegistry,
    pub mode: Mode,
    pub host: String,
    pub source: String,
    pub policy: StalenessPolicy,
    pub now_epoch_seconds: f64,
}

impl Runner {
    pub fn open(cfg: Config, mode: Mode) -> Result<Self> {
        let (source, source_label, deadline) = match mode {
            Mode::Metrics => {
                let prom = PrometheusSource::new(&cfg.prometheus_options())?;
                let label = format!("Prometheus ({})", prom.base_url());
                let source: Arc<dyn SignalSource> = Arc::new(prom);
                (source, label, cfg.metrics.deadline_secs)
            }
            Mode::Verify => {
                let ssh = SshExecutor::new(cfg.ssh_options());
                let label = format!("Direct probe (ssh://{})", ssh.host());
                let source: Arc<dyn SignalSource> = Arc::new(ProbeSource::new(ssh, cfg.restic_probe()));
                (source, label, cfg.probe.deadline_secs)
            }
        };
        Ok(Self { cfg, mode, source, source_label, deadline: Duration::from_secs(deadline) })
    }

    /// Run against an already built source.
    pub fn with_source(cfg: Config, mode: Mode, source: Arc<dyn SignalSource>, label: impl Into<String>) -> Self {
        let deadline = match mode {
            Mode::Metrics => cfg.metrics.deadline_secs,
            Mode::Verify => cfg.probe.deadline_secs,
        };
        Self { cfg, mode, source, source_label: label.into(), deadline: Duration::from_secs(deadline) }
    }

    pub fn source_label(&self) -> &str {
        &self.source_label
    }

    pub async fn run(&self, subsystems: &[Subsystem]) -> RunResult {
        self.run_at(subsystems, now_epoch_seconds()).await
    }

    /// Run with a fixed `now`; every job of the run ages against it.
    pub async fn run_at(&self, subsystems: &[Subsystem], now: f64) -> RunResult {
        let policy = self.cfg.staleness_policy();
        let acquired = collect(Arc::clone(&self.source), subsystems, self.deadline).await;
        let registry = JobRegistry::from_signals(acquired.signals, acquired.faults, now, &policy);
        info!(
            mode = self.mode.as_str(),
            source = %self.source_label,
            jobs = registry.len(),
            faults = registry.faults().len(),
            "run complete"
        );
        RunResult {
            registry,
            mode: self.mode,
            host: self.cfg.fqdn(),
            source: self.source_label.clone(),
            policy,
            now_epoch_seconds: now,
        }
    }
}
