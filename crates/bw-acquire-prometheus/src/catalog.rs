//! Which metrics answer which query, and how their labels become signals.

use bw_acquire::{Batch, QueryKind};
use bw_core::{JobIdentity, RawSignal, SourceKind, Subsystem};

use crate::wire::Sample;

const SOURCE: SourceKind = SourceKind::MetricsStore;

/// How a metric's value is read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueRole {
    /// Presence only; the value is ignored.
    Presence,
    StatusCode,
    LastSuccessTimestamp,
    /// Error flag raised when the value differs from `healthy`.
    HealthyWhen(i64),
    /// Copied into metadata under the given key.
    Detail(&'static str),
}

/// How a metric's labels map onto a signal scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Job key label plus target labels tried in order. When `group_label`
    /// is present on a sample the name becomes `<group>/<name>`.
    Job { name_label: &'static str, group_label: Option<&'static str>, target_labels: &'static [&'static str] },
    /// Repository-wide signal keyed by one label.
    Target { label: &'static str },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetricDef {
    pub metric: &'static str,
    pub query: QueryKind,
    pub role: ValueRole,
    pub scope: Scope,
    /// Labels copied verbatim into metadata.
    pub meta_labels: &'static [&'static str],
}

const RESTIC_JOB: Scope = Scope::Job { name_label: "backup_job", group_label: None, target_labels: &["repository_name", "repository"] };
const RESTIC_META: &[&str] = &["repository", "repository_name", "repository_location", "hostname"];

const SYNCOID_JOB: Scope = Scope::Job { name_label: "dataset", group_label: None, target_labels: &["target_host"] };
const SYNCOID_META: &[&str] = &["unit", "target_host", "target_name", "target_location", "instance"];

const PG_JOB: Scope = Scope::Job { name_label: "type", group_label: Some("stanza"), target_labels: &["repo_key"] };
const PG_REPO: Scope = Scope::Target { label: "repo_key" };

static RESTIC: &[MetricDef] = &[
    MetricDef {
        metric: "restic_backup_status",
        query: QueryKind::Status,
        role: ValueRole::StatusCode,
        scope: RESTIC_JOB,
        meta_labels: RESTIC_META,
    },
    MetricDef {
        metric: "restic_backup_last_success_timestamp",
        query: QueryKind::LastSuccess,
        role: ValueRole::LastSuccessTimestamp,
        scope: RESTIC_JOB,
        meta_labels: RESTIC_META,
    },
    MetricDef {
        metric: "restic_backup_repo_healthy",
        query: QueryKind::RepositoryHealth,
        role: ValueRole::HealthyWhen(1),
        scope: RESTIC_JOB,
        meta_labels: &[],
    },
    MetricDef {
        metric: "restic_backup_duration_seconds",
        query: QueryKind::Details,
        role: ValueRole::Detail("duration_seconds"),
        scope: RESTIC_JOB,
        meta_labels: &[],
    },
    MetricDef {
        metric: "restic_backup_files_total",
        query: QueryKind::Details,
        role: ValueRole::Detail("files_total"),
        scope: RESTIC_JOB,
        meta_labels: &[],
    },
    MetricDef {
        metric: "restic_backup_size_bytes",
        query: QueryKind::Details,
        role: ValueRole::Detail("size_bytes"),
        scope: RESTIC_JOB,
        meta_labels: &[],
    },
    MetricDef {
        metric: "restic_backup_snapshots_total",
        query: QueryKind::Details,
        role: ValueRole::Detail("snapshots_total"),
        scope: RESTIC_JOB,
        meta_labels: &[],
    },
];

static SYNCOID: &[MetricDef] = &[
    MetricDef {
        metric: "syncoid_replication_info",
        query: QueryKind::Identity,
        role: ValueRole::Presence,
        scope: SYNCOID_JOB,
        meta_labels: SYNCOID_META,
    },
    MetricDef {
        metric: "syncoid_replication_status",
        query: QueryKind::Status,
        role: ValueRole::StatusCode,
        scope: SYNCOID_JOB,
        meta_labels: &[],
    },
    MetricDef {
        metric: "syncoid_replication_last_success_timestamp",
        query: QueryKind::LastSuccess,
        role: ValueRole::LastSuccessTimestamp,
        scope: SYNCOID_JOB,
        meta_labels: &[],
    },
];

static PGBACKREST: &[MetricDef] = &[
    MetricDef {
        metric: "pgbackrest_backup_last_good_completion_seconds",
        query: QueryKind::LastSuccess,
        role: ValueRole::LastSuccessTimestamp,
        scope: PG_JOB,
        meta_labels: &["stanza"],
    },
    MetricDef {
        metric: "pgbackrest_repo_status",
        query: QueryKind::RepositoryHealth,
        role: ValueRole::HealthyWhen(0),
        scope: PG_REPO,
        meta_labels: &[],
    },
    MetricDef {
        metric: "pgbackrest_repo_info",
        query: QueryKind::RepositoryInfo,
        role: ValueRole::Presence,
        scope: PG_REPO,
        meta_labels: &["repo_name", "repo_location"],
    },
];

pub fn metrics_for(subsystem: Subsystem) -> &'static [MetricDef] {
    match subsystem {
        Subsystem::SnapshotBackup => RESTIC,
        Subsystem::Replication => SYNCOID,
        Subsystem::PhysicalDbBackup => PGBACKREST,
    }
}

/// Distinct queries for `subsystem`, in catalog order.
pub fn queries_for(subsystem: Subsystem) -> Vec<QueryKind> {
    let mut out: Vec<QueryKind> = Vec::new();
    for def in metrics_for(subsystem) {
        if !out.contains(&def.query) {
            out.push(def.query);
        }
    }
    out
}

/// Convert one metric's samples into signals. Samples with a missing key
/// label or an unusable value are dropped as malformed.
pub fn decode_samples(subsystem: Subsystem, def: &MetricDef, samples: &[Sample], batch: &mut Batch) {
    for sample in samples {
        match decode_sample(subsystem, def, sample) {
            Ok(signal) => batch.push(signal),
            Err(reason) => batch.drop_malformed(subsystem, def.query, format!("{}: {reason}", def.metric)),
        }
    }
}

fn decode_sample(subsystem: Subsystem, def: &MetricDef, sample: &Sample) -> Result<RawSignal, String> {
    let mut signal = match def.scope {
        Scope::Job { name_label, group_label, target_labels } => {
            let name = sample.label(name_label).ok_or_else(|| format!("missing label {name_label}"))?;
            let name = match group_label.and_then(|l| sample.label(l)) {
                Some(group) => format!("{group}/{name}"),
                None => name.to_string(),
            };
            let target = target_labels.iter().find_map(|l| sample.label(l)).map(String::from);
            RawSignal::job(JobIdentity::new(subsystem, name, target), SOURCE)
        }
        Scope::Target { label } => {
            let target = sample.label(label).ok_or_else(|| format!("missing label {label}"))?;
            RawSignal::target(subsystem, target, SOURCE)
        }
    };

    signal = match def.role {
        ValueRole::Presence => signal,
        ValueRole::StatusCode => signal.with_status(sample.code()?),
        ValueRole::LastSuccessTimestamp => signal.with_last_success(sample.number()?),
        ValueRole::HealthyWhen(healthy) => signal.with_error_flag(sample.code()? != healthy),
        ValueRole::Detail(key) => signal.with_meta(key, sample.number()?.to_string()),
    };

    for label in def.meta_labels {
        if let Some(v) = sample.label(label) {
            signal = signal.with_meta(*label, v);
        }
    }
    Ok(signal)
}
