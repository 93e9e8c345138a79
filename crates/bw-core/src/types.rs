use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::model::*;

/// Key of one monitored unit. Unique within a reconciliation run.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobIdentity {
    pub subsystem: Subsystem,
    /// Job, dataset or backup-type name.
    pub name: String,
    /// Repository or replication target, when the subsystem has one.
    pub target: Option<String>,
}

impl JobIdentity {
    pub fn new(subsystem: Subsystem, name: impl Into<String>, target: Option<String>) -> Self {
        Self { subsystem, name: name.into(), target }
    }

    /// Stable ordering key: subsystem, then group key, then secondary key.
    ///
    /// pgBackRest rows group by repository and then backup type; the other
    /// subsystems order by job name with the target as a tie-break.
    pub fn sort_key(&self) -> (Subsystem, &str, &str) {
        let target = self.target.as_deref().unwrap_or("");
        match self.subsystem {
            Subsystem::PhysicalDbBackup => (self.subsystem, target, &self.name),
            Subsystem::Replication | Subsystem::SnapshotBackup => (self.subsystem, &self.name, target),
        }
    }
}

/// What a signal is about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum SignalScope {
    /// One job. A job identity without a target applies to every job with the
    /// same subsystem and name that does carry one.
    Job(JobIdentity),
    /// Every job of `subsystem` stored at `target`. Never creates a job.
    Target { subsystem: Subsystem, target: String },
}

impl SignalScope {
    pub fn subsystem(&self) -> Subsystem {
        match self {
            SignalScope::Job(id) => id.subsystem,
            SignalScope::Target { subsystem, .. } => *subsystem,
        }
    }
}

/// One observation of a job (or of a repository) from one acquisition source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSignal {
    pub scope: SignalScope,
    pub status_code: Option<i64>,
    pub last_success_epoch_seconds: Option<f64>,
    pub error_flag: Option<bool>,
    /// Display labels only.
    pub metadata: BTreeMap<String, String>,
    pub source: SourceKind,
}

impl RawSignal {
    pub fn job(identity: JobIdentity, source: SourceKind) -> Self {
        Self::scoped(SignalScope::Job(identity), source)
    }

    pub fn target(subsystem: Subsystem, target: impl Into<String>, source: SourceKind) -> Self {
        Self::scoped(SignalScope::Target { subsystem, target: target.into() }, source)
    }

    fn scoped(scope: SignalScope, source: SourceKind) -> Self {
        Self {
            scope,
            status_code: None,
            last_success_epoch_seconds: None,
            error_flag: None,
            metadata: BTreeMap::new(),
            source,
        }
    }

    pub fn with_status(mut self, code: i64) -> Self {
        self.status_code = Some(code);
        self
    }

    pub fn with_last_success(mut self, epoch_seconds: f64) -> Self {
        self.last_success_epoch_seconds = Some(epoch_seconds);
        self
    }

    pub fn with_error_flag(mut self, flag: bool) -> Self {
        self.error_flag = Some(flag);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.metadata.insert(key.into(), value);
        }
        self
    }
}

/// Signals for one identity after reconciliation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedSignal {
    pub status_code: Option<i64>,
    pub last_success_epoch_seconds: Option<f64>,
    pub error_flag: Option<bool>,
    pub metadata: BTreeMap<String, String>,
    pub sources: BTreeSet<SourceKind>,
}

/// Normalized health of one job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthVerdict {
    pub state: VerdictState,
    pub detail: String,
    /// Seconds since last success; negative when the timestamp is in the future.
    pub age_seconds: Option<f64>,
}

/// A job as handed to presentation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub identity: JobIdentity,
    pub signal: MergedSignal,
    pub verdict: HealthVerdict,
}

impl JobRecord {
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.signal.metadata.get(key).map(String::as_str)
    }
}
