use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    normalize, reconcile, Fault, JobIdentity, JobRecord, RawSignal, Reconciled, StalenessPolicy, Subsystem,
    VerdictState,
};

/// Case-insensitive substring filters over identity fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    /// Empty means every subsystem.
    #[serde(default)]
    pub subsystems: Vec<Subsystem>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
}

impl JobFilter {
    pub fn matches(&self, id: &JobIdentity) -> bool {
        if !self.subsystems.is_empty() && !self.subsystems.contains(&id.subsystem) {
            return false;
        }
        if let Some(needle) = &self.name {
            if !contains_ci(&id.name, needle) {
                return false;
            }
        }
        if let Some(needle) = &self.target {
            match &id.target {
                Some(t) if contains_ci(t, needle) => {}
                _ => return false,
            }
        }
        true
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Count of jobs per verdict state. Every state is always present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub by_state: BTreeMap<VerdictState, usize>,
}

impl Default for SummaryCounts {
    fn default() -> Self {
        Self { by_state: VerdictState::ALL.iter().map(|s| (*s, 0)).collect() }
    }
}

impl SummaryCounts {
    pub fn of(records: &[JobRecord]) -> Self {
        let mut counts = Self::default();
        for r in records {
            *counts.by_state.entry(r.verdict.state).or_insert(0) += 1;
        }
        counts
    }

    pub fn get(&self, state: VerdictState) -> usize {
        self.by_state.get(&state).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.by_state.values().sum()
    }

    pub fn healthy(&self) -> usize {
        self.by_state.iter().filter(|(s, _)| s.is_healthy()).map(|(_, n)| n).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReportOutcome {
    Jobs,
    /// Jobs were discovered but the filter kept none of them.
    FilteredEmpty,
    /// The source produced no identities at all.
    NoIdentitiesDiscovered { reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub outcome: ReportOutcome,
    pub records: Vec<JobRecord>,
    pub summary: SummaryCounts,
    pub faults: Vec<Fault>,
}

/// All jobs of one reconciliation run, in stable display order.
#[derive(Clone, Debug, Default)]
pub struct JobRegistry {
    records: Vec<JobRecord>,
    faults: Vec<Fault>,
}

impl JobRegistry {
    /// Reconcile, normalize and sort. `faults` are soft acquisition faults
    /// carried along for reporting.
    pub fn from_signals(
        signals: impl IntoIterator<Item = RawSignal>,
        faults: Vec<Fault>,
        now_epoch_seconds: f64,
        policy: &StalenessPolicy,
    ) -> Self {
        let mut registry = Self::build(reconcile(signals), now_epoch_seconds, policy);
        let mut all = faults;
        all.append(&mut registry.faults);
        registry.faults = all;
        registry
    }

    pub fn build(reconciled: Reconciled, now_epoch_seconds: f64, policy: &StalenessPolicy) -> Self {
        let mut records: Vec<JobRecord> = reconciled
            .jobs
            .into_iter()
            .map(|(identity, signal)| {
                let verdict = normalize(identity.subsystem, &signal, now_epoch_seconds, policy);
                JobRecord { identity, signal, verdict }
            })
            .collect();
        records.sort_by(|a, b| a.identity.sort_key().cmp(&b.identity.sort_key()));
        Self { records, faults: reconciled.faults }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn faults(&self) -> &[Fault] {
        &self.faults
    }

    /// Records kept by `filter`, in stable order.
    pub fn list_job_records(&self, filter: &JobFilter) -> Vec<JobRecord> {
        self.records.iter().filter(|r| filter.matches(&r.identity)).cloned().collect()
    }

    /// Counts over the records kept by `filter`.
    pub fn summary_counts(&self, filter: &JobFilter) -> SummaryCounts {
        SummaryCounts::of(&self.list_job_records(filter))
    }

    pub fn report(&self, filter: &JobFilter) -> Report {
        let records = self.list_job_records(filter);
        let outcome = if self.records.is_empty() {
            ReportOutcome::NoIdentitiesDiscovered { reason: self.empty_reason() }
        } else if records.is_empty() {
            ReportOutcome::FilteredEmpty
        } else {
            ReportOutcome::Jobs
        };
        Report { outcome, summary: SummaryCounts::of(&records), records, faults: self.faults.clone() }
    }

    fn empty_reason(&self) -> String {
        let unavailable = self
            .faults
            .iter()
            .filter(|f| matches!(f, Fault::AcquisitionUnavailable { .. }))
            .count();
        if unavailable > 0 {
            format!("no jobs discovered; {unavailable} queries were unavailable")
        } else {
            "no jobs discovered; the source reported no records".to_string()
        }
    }
}
