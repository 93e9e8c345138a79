use std::collections::BTreeMap;
use std::path::Path;

use bw_acquire::{AcquisitionError, Batch, QueryKind};
use bw_core::{Fault, JobIdentity, RawSignal, SourceKind, Subsystem, FAILED_CODE, SUCCESS_CODE};
use chrono::DateTime;
use serde::Deserialize;
use tracing::debug;

use crate::executor::shell_quote;
use crate::systemd::{parse_properties, parse_unit_list};
use crate::RemoteExecutor;

const SUBSYSTEM: Subsystem = Subsystem::SnapshotBackup;

pub const LIST_SERVICES: &str =
    "systemctl list-units --all --type=service 'restic-backup-*.service' --no-pager --plain --no-legend";

const DEFAULT_CACHE_DIR: &str = "/var/cache/restic";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResticProbe {
    /// Command used to invoke restic on the remote host.
    pub program: String,
    /// Snapshots fetched per job; the newest one sets last success.
    pub snapshot_limit: u32,
}

/// Subset of `restic snapshots --json`.
#[derive(Clone, Debug, Deserialize)]
pub struct Snapshot {
    pub time: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub short_id: Option<String>,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl Snapshot {
    pub fn epoch_seconds(&self) -> Option<f64> {
        DateTime::parse_from_rfc3339(&self.time).ok().map(|t| t.timestamp_millis() as f64 / 1000.0)
    }

    pub fn display_id(&self) -> String {
        self.short_id.clone().unwrap_or_else(|| self.id.chars().take(8).collect())
    }
}

/// Display name of a repository from its URL.
pub fn repo_display_name(url: &str) -> String {
    if url.starts_with("/mnt/nas-backup") {
        "nas-primary".to_string()
    } else if url.starts_with("s3:") && url.contains("r2.cloudflarestorage.com") {
        "r2-offsite".to_string()
    } else if url.starts_with("s3:") {
        "s3-remote".to_string()
    } else if url.starts_with("/mnt/") {
        Path::new(url)
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    } else {
        "unknown".to_string()
    }
}

/// Snapshot tag of a job: `service-autobrr` is tagged `autobrr`.
pub fn snapshot_tag(job: &str) -> &str {
    job.strip_prefix("service-").unwrap_or(job)
}

/// Environment of a service from `Environment=` and `EnvironmentFile=`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceEnv {
    pub vars: BTreeMap<String, String>,
    pub env_file: Option<String>,
}

impl ServiceEnv {
    pub fn parse(props: &BTreeMap<String, String>) -> Self {
        let vars = props
            .get("Environment")
            .map(|env| {
                env.split_whitespace()
                    .filter_map(|pair| pair.split_once('='))
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        // `EnvironmentFile=-/run/secrets/x (ignore_errors=yes)`
        let env_file = props
            .get("EnvironmentFile")
            .and_then(|v| v.split_whitespace().next())
            .map(|f| f.trim_start_matches('-').to_string())
            .filter(|f| !f.is_empty());
        Self { vars, env_file }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

impl ResticProbe {
    /// `sh -c` line that loads the service environment and lists the latest
    /// snapshots for one tag.
    pub fn snapshots_command(&self, env: &ServiceEnv, repo: &str, password_file: &str, tag: &str) -> String {
        let cache = env.get("RESTIC_CACHE_DIR").unwrap_or(DEFAULT_CACHE_DIR);
        let mut script = String::new();
        if let Some(file) = &env.env_file {
            script.push_str(&format!("set -a && . {} && set +a && ", shell_quote(file)));
        }
        script.push_str(&format!(
            "RESTIC_REPOSITORY={} RESTIC_PASSWORD_FILE={} RESTIC_CACHE_DIR={} {} snapshots --json --tag {} --latest {}",
            shell_quote(repo),
            shell_quote(password_file),
            shell_quote(cache),
            self.program,
            shell_quote(tag),
            self.snapshot_limit.max(1)
        ));
        format!("sh -c {}", shell_quote(&script))
    }

    /// One signal per restic backup service: systemd result as status, newest
    /// snapshot as last success, a failing restic call as the error flag.
    pub async fn probe(&self, exec: &dyn RemoteExecutor, batch: &mut Batch) -> Result<(), AcquisitionError> {
        let listing = exec.run(LIST_SERVICES, false).await?.require_success()?;
        for service in parse_unit_list(&listing.stdout, "restic-backup-", ".service") {
            let job = service.trim_start_matches("restic-backup-").trim_end_matches(".service").to_string();
            let show = format!("systemctl show {service} -p Result -p Environment -p EnvironmentFile");
            let props = match exec.run(&show, false).await.and_then(|o| o.require_success()) {
                Ok(out) => parse_properties(&out.stdout),
                Err(e) => {
                    batch.faults.push(Fault::unavailable(SUBSYSTEM, QueryKind::Status.as_str(), format!("{job}: {e}")));
                    continue;
                }
            };
            let signal = self.job_signal(exec, &job, &props, batch).await;
            batch.push(signal);
        }
        Ok(())
    }

    async fn job_signal(
        &self,
        exec: &dyn RemoteExecutor,
        job: &str,
        props: &BTreeMap<String, String>,
        batch: &mut Batch,
    ) -> RawSignal {
        let env = ServiceEnv::parse(props);
        let repo = env.get("RESTIC_REPOSITORY").unwrap_or("");
        let repo_name = repo_display_name(repo);

        let mut signal = RawSignal::job(JobIdentity::new(SUBSYSTEM, job, Some(repo_name.clone())), SourceKind::DirectProbe)
            .with_meta("repository", repo)
            .with_meta("repository_name", repo_name);
        match props.get("Result").map(String::as_str) {
            Some("success") => signal = signal.with_status(SUCCESS_CODE),
            Some(r) if !r.is_empty() => signal = signal.with_status(FAILED_CODE).with_meta("systemd_result", r),
            _ => {}
        }

        let Some(password_file) = env.get("RESTIC_PASSWORD_FILE") else {
            debug!(%job, "no restic repository credentials in service environment");
            return signal;
        };
        if repo.is_empty() {
            return signal;
        }

        let cmd = self.snapshots_command(&env, repo, password_file, snapshot_tag(job));
        let out = match exec.run(&cmd, true).await {
            Ok(out) => out,
            Err(e) => {
                batch.faults.push(Fault::unavailable(SUBSYSTEM, QueryKind::LastSuccess.as_str(), format!("{job}: {e}")));
                return signal;
            }
        };
        if !out.success() {
            let reason = out.stderr.lines().next().unwrap_or("failed to list snapshots").trim().to_string();
            return signal.with_error_flag(true).with_meta("restic_error", reason);
        }

        let snapshots: Vec<Snapshot> = match serde_json::from_str(out.stdout.trim()) {
            Ok(s) => s,
            Err(e) => {
                batch.drop_malformed(SUBSYSTEM, QueryKind::LastSuccess, format!("{job}: snapshot list: {e}"));
                return signal.with_error_flag(false);
            }
        };
        signal = signal.with_error_flag(false).with_meta("snapshot_count", snapshots.len().to_string());

        let mut latest: Option<(f64, &Snapshot)> = None;
        for snap in &snapshots {
            match snap.epoch_seconds() {
                Some(ts) if latest.map_or(true, |(best, _)| ts > best) => latest = Some((ts, snap)),
                Some(_) => {}
                None => batch.drop_malformed(SUBSYSTEM, QueryKind::LastSuccess, format!("{job}: snapshot time {:?}", snap.time)),
            }
        }
        if let Some((ts, snap)) = latest {
            signal = signal
                .with_last_success(ts)
                .with_meta("snapshot_id", snap.display_id())
                .with_meta("snapshot_host", snap.hostname.clone());
        }
        signal
    }
}
