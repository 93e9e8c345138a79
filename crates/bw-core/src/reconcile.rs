use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    rules_for, Fault, JobIdentity, MergedSignal, RawSignal, SignalScope, FAILED_CODE, IN_PROGRESS_CODE,
};

/// Per-identity merged signals plus the faults found while merging.
#[derive(Clone, Debug, Default)]
pub struct Reconciled {
    pub jobs: BTreeMap<JobIdentity, MergedSignal>,
    pub faults: Vec<Fault>,
}

/// Group signals by identity and merge them.
///
/// Must only run once every query of the acquisition source has returned:
/// status and age for one job may come from different queries. Target-scoped
/// and untargeted signals are applied after every concrete identity is known,
/// so the result does not depend on input order.
pub fn reconcile(signals: impl IntoIterator<Item = RawSignal>) -> Reconciled {
    let mut out = Reconciled::default();
    let mut untargeted = Vec::new();
    let mut target_scoped = Vec::new();

    for signal in signals {
        if let Err(fault) = validate(&signal) {
            out.faults.push(fault);
            continue;
        }
        match &signal.scope {
            SignalScope::Job(id) if id.target.is_some() => {
                absorb(out.jobs.entry(id.clone()).or_default(), &signal);
            }
            SignalScope::Job(_) => untargeted.push(signal),
            SignalScope::Target { .. } => target_scoped.push(signal),
        }
    }

    for signal in untargeted {
        let SignalScope::Job(id) = &signal.scope else { continue };
        let matches: Vec<JobIdentity> = out
            .jobs
            .keys()
            .filter(|k| k.target.is_some() && k.subsystem == id.subsystem && k.name == id.name)
            .cloned()
            .collect();
        if matches.is_empty() {
            absorb(out.jobs.entry(id.clone()).or_default(), &signal);
        } else {
            for key in matches {
                if let Some(merged) = out.jobs.get_mut(&key) {
                    absorb(merged, &signal);
                }
            }
        }
    }

    for signal in target_scoped {
        let SignalScope::Target { subsystem, target } = &signal.scope else { continue };
        if signal.status_code.is_some() || signal.last_success_epoch_seconds.is_some() {
            debug!(%subsystem, %target, "ignoring job-level fields on a target-scoped signal");
        }
        let mut applied = 0usize;
        for (id, merged) in out.jobs.iter_mut() {
            if id.subsystem == *subsystem && id.target.as_deref() == Some(target.as_str()) {
                merged.error_flag = or_flag(merged.error_flag, signal.error_flag);
                merge_metadata(merged, &signal);
                merged.sources.insert(signal.source);
                applied += 1;
            }
        }
        if applied == 0 {
            debug!(%subsystem, %target, "target-scoped signal matched no job");
        }
    }

    out
}

fn validate(signal: &RawSignal) -> Result<(), Fault> {
    let subsystem = signal.scope.subsystem();
    if let Some(code) = signal.status_code {
        if !rules_for(subsystem).accepts_status(code) {
            return Err(Fault::malformed(subsystem, "reconcile", format!("status code {code} out of range")));
        }
    }
    if let Some(ts) = signal.last_success_epoch_seconds {
        if !ts.is_finite() {
            return Err(Fault::malformed(subsystem, "reconcile", format!("last-success timestamp {ts}")));
        }
    }
    if let SignalScope::Job(id) = &signal.scope {
        if id.name.is_empty() {
            return Err(Fault::malformed(subsystem, "reconcile", "empty job name"));
        }
    }
    Ok(())
}

fn absorb(merged: &mut MergedSignal, signal: &RawSignal) {
    merged.status_code = match (merged.status_code, signal.status_code) {
        (Some(a), Some(b)) => Some(if severity(b) > severity(a) { b } else { a }),
        (a, b) => a.or(b),
    };
    merged.last_success_epoch_seconds = match (merged.last_success_epoch_seconds, signal.last_success_epoch_seconds) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
    merged.error_flag = or_flag(merged.error_flag, signal.error_flag);
    merge_metadata(merged, signal);
    merged.sources.insert(signal.source);
}

/// failed > in-progress > success
fn severity(code: i64) -> u8 {
    match code {
        FAILED_CODE => 3,
        IN_PROGRESS_CODE => 2,
        _ => 1,
    }
}

fn or_flag(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x || y),
        (a, b) => a.or(b),
    }
}

fn merge_metadata(merged: &mut MergedSignal, signal: &RawSignal) {
    for (k, v) in &signal.metadata {
        merged.metadata.entry(k.clone()).or_insert_with(|| v.clone());
    }
}
