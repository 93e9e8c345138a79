use serde::{Deserialize, Serialize};

use crate::Subsystem;

pub const HOUR_SECONDS: u64 = 3600;

/// Per-subsystem stale thresholds, fixed for the duration of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessPolicy {
    pub snapshot_backup_seconds: u64,
    pub physical_db_backup_seconds: u64,
    pub replication_seconds: u64,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            snapshot_backup_seconds: 26 * HOUR_SECONDS,
            physical_db_backup_seconds: 26 * HOUR_SECONDS,
            // syncoid runs far more often than the nightly backups
            replication_seconds: 2 * HOUR_SECONDS,
        }
    }
}

impl StalenessPolicy {
    pub fn threshold_seconds(&self, subsystem: Subsystem) -> u64 {
        match subsystem {
            Subsystem::SnapshotBackup => self.snapshot_backup_seconds,
            Subsystem::PhysicalDbBackup => self.physical_db_backup_seconds,
            Subsystem::Replication => self.replication_seconds,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgeClass {
    /// No last-success timestamp.
    Indeterminate,
    /// Timestamp ahead of `now`; not stale.
    Future,
    Fresh,
    Stale,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StalenessCheck {
    pub class: AgeClass,
    pub detail: String,
}

impl StalenessCheck {
    pub fn is_stale(&self) -> bool {
        self.class == AgeClass::Stale
    }
}

/// Classify an age against a threshold. Reaching the threshold counts as stale.
pub fn evaluate_staleness(age_seconds: Option<f64>, threshold_seconds: u64) -> StalenessCheck {
    let Some(age) = age_seconds else {
        return StalenessCheck {
            class: AgeClass::Indeterminate,
            detail: "No last-success timestamp".to_string(),
        };
    };
    if age < 0.0 {
        return StalenessCheck {
            class: AgeClass::Future,
            detail: "Last success in the future".to_string(),
        };
    }
    if age >= threshold_seconds as f64 {
        return StalenessCheck {
            class: AgeClass::Stale,
            detail: format!("Last success > {} ago", format_threshold(threshold_seconds)),
        };
    }
    StalenessCheck { class: AgeClass::Fresh, detail: "Healthy".to_string() }
}

/// `93600` -> `26h`, `5400` -> `90m`, `45` -> `45s`.
pub fn format_threshold(seconds: u64) -> String {
    if seconds >= HOUR_SECONDS && seconds % HOUR_SECONDS == 0 {
        format!("{}h", seconds / HOUR_SECONDS)
    } else if seconds >= 60 && seconds % 60 == 0 {
        format!("{}m", seconds / 60)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds() {
        let p = StalenessPolicy::default();
        assert_eq!(p.threshold_seconds(Subsystem::SnapshotBackup), 93_600);
        assert_eq!(p.threshold_seconds(Subsystem::PhysicalDbBackup), 93_600);
        assert_eq!(p.threshold_seconds(Subsystem::Replication), 7_200);
    }

    #[test]
    fn threshold_boundary_is_stale() {
        assert_eq!(evaluate_staleness(Some(93_599.0), 93_600).class, AgeClass::Fresh);
        assert_eq!(evaluate_staleness(Some(93_600.0), 93_600).class, AgeClass::Stale);
        let over = evaluate_staleness(Some(93_601.0), 93_600);
        assert!(over.is_stale());
        assert_eq!(over.detail, "Last success > 26h ago");
    }

    #[test]
    fn missing_age_is_indeterminate_not_stale() {
        let c = evaluate_staleness(None, 7_200);
        assert_eq!(c.class, AgeClass::Indeterminate);
        assert!(!c.is_stale());
    }

    #[test]
    fn future_timestamp_is_not_stale() {
        let c = evaluate_staleness(Some(-30.0), 7_200);
        assert_eq!(c.class, AgeClass::Future);
        assert!(!c.is_stale());
    }

    #[test]
    fn threshold_formatting() {
        assert_eq!(format_threshold(7_200), "2h");
        assert_eq!(format_threshold(5_400), "90m");
        assert_eq!(format_threshold(45), "45s");
    }
}
