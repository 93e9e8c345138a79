//! `pgbackrest info --output=json`: decoding, signals and a per-stanza summary.

use std::collections::BTreeMap;

use bw_acquire::{AcquisitionError, Batch};
use bw_core::{JobIdentity, RawSignal, SourceKind, Subsystem};
use serde::{Deserialize, Serialize};

use crate::RemoteExecutor;

const SUBSYSTEM: Subsystem = Subsystem::PhysicalDbBackup;

pub const INFO_COMMAND: &str = "pgbackrest info --output=json";

/// Backup types in display order.
pub const BACKUP_TYPES: [&str; 3] = ["full", "diff", "incr"];

#[derive(Clone, Debug, Default, Deserialize)]
pub struct StatusBlock {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Repo {
    pub key: i64,
    #[serde(default)]
    pub status: StatusBlock,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Timestamps {
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub stop: i64,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DatabaseRef {
    #[serde(default, rename = "repo-key")]
    pub repo_key: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Sizes {
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub delta: u64,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct BackupInfo {
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub delta: u64,
    #[serde(default)]
    pub repository: Sizes,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ArchiveRange {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub stop: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Backup {
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub timestamp: Timestamps,
    #[serde(default)]
    pub database: DatabaseRef,
    #[serde(default)]
    pub info: BackupInfo,
    #[serde(default)]
    pub archive: ArchiveRange,
}

impl Backup {
    /// Backups without a repo key belong to repo 1.
    pub fn repo_key(&self) -> i64 {
        self.database.repo_key.unwrap_or(1)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Stanza {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: StatusBlock,
    #[serde(default)]
    pub repo: Vec<Repo>,
    #[serde(default)]
    pub backup: Vec<Backup>,
}

impl Stanza {
    /// Job name for one backup type of this stanza: `<stanza>/<type>`.
    pub fn job_name(&self, kind: &str) -> String {
        format!("{}/{kind}", self.name)
    }
}

/// Accepts the usual array of stanzas as well as a single stanza object.
pub fn parse_info(json: &str) -> Result<Vec<Stanza>, AcquisitionError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Info {
        Many(Vec<Stanza>),
        One(Stanza),
    }
    match serde_json::from_str::<Info>(json.trim()).map_err(|e| AcquisitionError::Decode(e.to_string()))? {
        Info::Many(v) => Ok(v),
        Info::One(s) => Ok(vec![s]),
    }
}

/// Repository signals (error flag, status message) and one signal per
/// (stanza, repository, backup type) carrying the newest stop time.
///
/// Repository signals are keyed by repo key alone, so a repository error
/// reported under one stanza flags every stanza's jobs in that repository.
pub fn signals_from_info(stanzas: &[Stanza], source: SourceKind) -> Vec<RawSignal> {
    let mut out = Vec::new();
    for stanza in stanzas {
        for repo in &stanza.repo {
            out.push(
                RawSignal::target(SUBSYSTEM, repo.key.to_string(), source)
                    .with_error_flag(repo.status.code != 0)
                    .with_meta("repo_status", repo.status.message.clone())
                    .with_meta("stanza", stanza.name.clone()),
            );
        }

        let mut latest: BTreeMap<(i64, &str), (&Backup, usize)> = BTreeMap::new();
        for backup in &stanza.backup {
            let entry = latest.entry((backup.repo_key(), backup.kind.as_str())).or_insert((backup, 0));
            entry.1 += 1;
            if backup.timestamp.stop > entry.0.timestamp.stop {
                entry.0 = backup;
            }
        }
        for ((repo_key, kind), (backup, count)) in latest {
            let identity = JobIdentity::new(SUBSYSTEM, stanza.job_name(kind), Some(repo_key.to_string()));
            let mut signal = RawSignal::job(identity, source)
                .with_meta("stanza", stanza.name.clone())
                .with_meta("latest_label", backup.label.clone())
                .with_meta("backup_count", count.to_string());
            if backup.timestamp.stop > 0 {
                signal = signal.with_last_success(backup.timestamp.stop as f64);
            }
            out.push(signal);
        }
    }
    out
}

pub async fn probe_physical_db(exec: &dyn RemoteExecutor, batch: &mut Batch) -> Result<(), AcquisitionError> {
    let out = exec.run(INFO_COMMAND, true).await?.require_success()?;
    for signal in signals_from_info(&parse_info(&out.stdout)?, SourceKind::DirectProbe) {
        batch.push(signal);
    }
    Ok(())
}

/// Per-repository view of one stanza.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RepoSummary {
    pub key: i64,
    pub status: String,
    pub counts: BTreeMap<String, usize>,
    /// Newest backup of any type: (type, stop, size, delta).
    pub latest: Option<(String, i64, u64, u64)>,
    /// Newest full backup: (label, stop, repository size).
    pub latest_full: Option<(String, i64, u64)>,
    /// Up to five newest incrementals: (stop, delta, repository delta, duration).
    pub recent_incr: Vec<(i64, u64, u64, i64)>,
    /// Largest full backup repository size.
    pub full_size: u64,
}

impl RepoSummary {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.counts.get(kind).copied().unwrap_or(0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StanzaSummary {
    pub name: String,
    pub status: String,
    pub repos: Vec<RepoSummary>,
    pub first_wal: Option<String>,
    pub last_wal: Option<String>,
    pub total_backups: usize,
}

pub fn summarize(stanza: &Stanza) -> StanzaSummary {
    let mut repos: BTreeMap<i64, RepoSummary> = stanza
        .repo
        .iter()
        .map(|r| (r.key, RepoSummary { key: r.key, status: r.status.message.clone(), ..Default::default() }))
        .collect();

    let mut by_stop: Vec<&Backup> = stanza.backup.iter().collect();
    by_stop.sort_by_key(|b| b.timestamp.stop);

    for backup in by_stop.iter().rev() {
        let repo = repos
            .entry(backup.repo_key())
            .or_insert_with(|| RepoSummary { key: backup.repo_key(), status: "unknown".to_string(), ..Default::default() });
        *repo.counts.entry(backup.kind.clone()).or_insert(0) += 1;
        if repo.latest.is_none() {
            repo.latest = Some((backup.kind.clone(), backup.timestamp.stop, backup.info.size, backup.info.delta));
        }
        match backup.kind.as_str() {
            "full" => {
                if repo.latest_full.is_none() {
                    repo.latest_full = Some((backup.label.clone(), backup.timestamp.stop, backup.info.repository.size));
                }
                repo.full_size = repo.full_size.max(backup.info.repository.size);
            }
            "incr" if repo.recent_incr.len() < 5 => repo.recent_incr.push((
                backup.timestamp.stop,
                backup.info.delta,
                backup.info.repository.delta,
                backup.timestamp.stop - backup.timestamp.start,
            )),
            _ => {}
        }
    }

    StanzaSummary {
        name: if stanza.name.is_empty() { "unknown".to_string() } else { stanza.name.clone() },
        status: stanza.status.message.clone(),
        repos: repos.into_values().collect(),
        first_wal: by_stop.first().and_then(|b| b.archive.start.clone()),
        last_wal: by_stop.last().and_then(|b| b.archive.stop.clone()),
        total_backups: stanza.backup.len(),
    }
}
