use crate::{
    evaluate_staleness, AgeClass, HealthVerdict, MergedSignal, StalenessPolicy, Subsystem, VerdictState,
};

pub const FAILED_CODE: i64 = 0;
pub const SUCCESS_CODE: i64 = 1;
pub const IN_PROGRESS_CODE: i64 = 2;

/// A decisive check that can settle a verdict before staleness is consulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Check {
    /// A set repository error flag yields ERROR.
    ErrorFlag,
    /// Failed yields FAILED, in-progress yields RUNNING.
    StatusCode,
}

/// How one subsystem's raw signals map onto a verdict.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubsystemRules {
    pub subsystem: Subsystem,
    /// Decisive checks in precedence order. Staleness always runs last.
    pub precedence: &'static [Check],
    pub has_status_code: bool,
    pub in_progress_code: Option<i64>,
    /// When set, a fresh age without a status code stays UNKNOWN.
    pub status_required_for_ok: bool,
}

impl SubsystemRules {
    /// Whether `code` is meaningful for this subsystem.
    pub fn accepts_status(&self, code: i64) -> bool {
        self.has_status_code
            && (code == FAILED_CODE || code == SUCCESS_CODE || self.in_progress_code == Some(code))
    }
}

static RULES: [SubsystemRules; 3] = [
    SubsystemRules {
        subsystem: Subsystem::PhysicalDbBackup,
        precedence: &[Check::ErrorFlag],
        has_status_code: false,
        in_progress_code: None,
        status_required_for_ok: false,
    },
    SubsystemRules {
        subsystem: Subsystem::Replication,
        precedence: &[Check::StatusCode],
        has_status_code: true,
        in_progress_code: Some(IN_PROGRESS_CODE),
        status_required_for_ok: true,
    },
    SubsystemRules {
        subsystem: Subsystem::SnapshotBackup,
        precedence: &[Check::StatusCode, Check::ErrorFlag],
        has_status_code: true,
        in_progress_code: None,
        status_required_for_ok: false,
    },
];

pub fn rules_for(subsystem: Subsystem) -> &'static SubsystemRules {
    match subsystem {
        Subsystem::PhysicalDbBackup => &RULES[0],
        Subsystem::Replication => &RULES[1],
        Subsystem::SnapshotBackup => &RULES[2],
    }
}

/// Map a job's merged signal to its verdict.
///
/// Pure in (subsystem, status code, error flag, last success, now, policy):
/// provenance and other jobs never influence the result. Missing data can
/// only produce UNKNOWN or STALE, never OK, unless a success status is present.
pub fn normalize(
    subsystem: Subsystem,
    signal: &MergedSignal,
    now_epoch_seconds: f64,
    policy: &StalenessPolicy,
) -> HealthVerdict {
    let rules = rules_for(subsystem);
    let age = signal.last_success_epoch_seconds.map(|ts| now_epoch_seconds - ts);
    let status = signal.status_code.filter(|c| rules.accepts_status(*c));

    for check in rules.precedence {
        match check {
            Check::ErrorFlag => {
                if signal.error_flag == Some(true) {
                    return verdict(VerdictState::Error, "Repository error", age);
                }
            }
            Check::StatusCode => match status {
                Some(FAILED_CODE) => return verdict(VerdictState::Failed, "Last run failed", age),
                Some(code) if rules.in_progress_code == Some(code) => {
                    return verdict(VerdictState::Running, "In progress", age);
                }
                _ => {}
            },
        }
    }

    let staleness = evaluate_staleness(age, policy.threshold_seconds(subsystem));
    match (status, staleness.class) {
        (_, AgeClass::Stale) => verdict(VerdictState::Stale, &staleness.detail, age),
        (Some(_), AgeClass::Indeterminate) => verdict(VerdictState::Ok, "Healthy (no timestamp)", age),
        (Some(_), AgeClass::Fresh | AgeClass::Future) => verdict(VerdictState::Ok, "Healthy", age),
        (None, AgeClass::Indeterminate) if rules.has_status_code => {
            verdict(VerdictState::Unknown, "No status or last-success signal", age)
        }
        (None, AgeClass::Indeterminate) => verdict(VerdictState::Unknown, "No last-success signal", age),
        (None, _) if rules.status_required_for_ok => verdict(VerdictState::Unknown, "No status metric", age),
        (None, AgeClass::Fresh | AgeClass::Future) => verdict(VerdictState::Ok, "Healthy", age),
    }
}

fn verdict(state: VerdictState, detail: &str, age_seconds: Option<f64>) -> HealthVerdict {
    HealthVerdict { state, detail: detail.to_string(), age_seconds }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: f64 = 1_700_000_000.0;

    fn sig(status: Option<i64>, error: Option<bool>, age: Option<f64>) -> MergedSignal {
        MergedSignal {
            status_code: status,
            error_flag: error,
            last_success_epoch_seconds: age.map(|a| NOW - a),
            ..Default::default()
        }
    }

    fn state(sub: Subsystem, status: Option<i64>, error: Option<bool>, age: Option<f64>) -> VerdictState {
        normalize(sub, &sig(status, error, age), NOW, &StalenessPolicy::default()).state
    }

    #[test]
    fn replication_in_progress_ignores_age() {
        assert_eq!(state(Subsystem::Replication, Some(2), None, Some(9_999.0)), VerdictState::Running);
        assert_eq!(state(Subsystem::Replication, Some(2), None, Some(1e9)), VerdictState::Running);
    }

    #[test]
    fn failed_outranks_fresh_age() {
        for sub in [Subsystem::Replication, Subsystem::SnapshotBackup] {
            assert_eq!(state(sub, Some(0), None, Some(1.0)), VerdictState::Failed);
        }
    }

    #[test]
    fn snapshot_has_no_in_progress_state() {
        // 2 is outside the restic domain and is treated as absent
        assert_eq!(state(Subsystem::SnapshotBackup, Some(2), None, Some(10.0)), VerdictState::Ok);
        assert_eq!(state(Subsystem::SnapshotBackup, Some(2), None, None), VerdictState::Unknown);
    }

    #[test]
    fn physical_db_error_flag_first() {
        let v = normalize(
            Subsystem::PhysicalDbBackup,
            &sig(None, Some(true), Some(10.0)),
            NOW,
            &StalenessPolicy::default(),
        );
        assert_eq!(v.state, VerdictState::Error);
        assert_eq!(v.detail, "Repository error");
        assert_eq!(state(Subsystem::PhysicalDbBackup, None, Some(false), Some(10.0)), VerdictState::Ok);
        assert_eq!(state(Subsystem::PhysicalDbBackup, None, None, None), VerdictState::Unknown);
    }

    #[test]
    fn success_then_staleness() {
        let v = normalize(
            Subsystem::SnapshotBackup,
            &sig(Some(1), None, Some(93_601.0)),
            NOW,
            &StalenessPolicy::default(),
        );
        assert_eq!(v.state, VerdictState::Stale);
        assert!(v.detail.contains("26h"));
        assert_eq!(v.age_seconds, Some(93_601.0));
    }

    #[test]
    fn absent_status_differs_by_subsystem() {
        // restic falls back to age alone
        assert_eq!(state(Subsystem::SnapshotBackup, None, None, Some(60.0)), VerdictState::Ok);
        // syncoid never reaches OK without a status
        assert_eq!(state(Subsystem::Replication, None, None, Some(60.0)), VerdictState::Unknown);
        assert_eq!(state(Subsystem::Replication, None, None, Some(10_000.0)), VerdictState::Stale);
        assert_eq!(state(Subsystem::Replication, None, None, None), VerdictState::Unknown);
    }

    #[test]
    fn success_without_timestamp_is_ok() {
        let v = normalize(Subsystem::Replication, &sig(Some(1), None, None), NOW, &StalenessPolicy::default());
        assert_eq!(v.state, VerdictState::Ok);
        assert_eq!(v.detail, "Healthy (no timestamp)");
    }

    #[test]
    fn future_timestamp_counts_as_fresh() {
        assert_eq!(state(Subsystem::SnapshotBackup, Some(1), None, Some(-120.0)), VerdictState::Ok);
    }

    #[test]
    fn error_flag_outranks_staleness_for_restic() {
        assert_eq!(state(Subsystem::SnapshotBackup, Some(1), Some(true), Some(1e6)), VerdictState::Error);
        // but a failed run still reads as FAILED
        assert_eq!(state(Subsystem::SnapshotBackup, Some(0), Some(true), Some(1.0)), VerdictState::Failed);
    }

    #[test]
    fn replication_ignores_error_flag() {
        assert_eq!(rules_for(Subsystem::Replication).precedence, &[Check::StatusCode]);
        assert_eq!(state(Subsystem::Replication, Some(1), Some(true), Some(60.0)), VerdictState::Ok);
    }

    #[test]
    fn rules_table_is_indexed_by_subsystem() {
        for sub in Subsystem::ALL {
            assert_eq!(rules_for(sub).subsystem, sub);
        }
    }
}
