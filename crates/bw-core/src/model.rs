use std::fmt;

use serde::{Deserialize, Serialize};

/// Family of monitored jobs. Declaration order is the display order.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    /// Database physical backups (pgBackRest).
    PhysicalDbBackup,
    /// Filesystem replication (syncoid).
    Replication,
    /// File-level snapshot backups (restic).
    SnapshotBackup,
}

impl Subsystem {
    pub const ALL: [Subsystem; 3] = [
        Subsystem::PhysicalDbBackup,
        Subsystem::Replication,
        Subsystem::SnapshotBackup,
    ];

    /// Short label used in tables and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Subsystem::PhysicalDbBackup => "pgBackRest",
            Subsystem::Replication => "Syncoid",
            Subsystem::SnapshotBackup => "Restic",
        }
    }

    /// Accepts both the canonical snake_case name and the tool name.
    pub fn parse(s: &str) -> Option<Subsystem> {
        match s.to_ascii_lowercase().as_str() {
            "physical_db_backup" | "pgbackrest" | "postgres" => Some(Subsystem::PhysicalDbBackup),
            "replication" | "syncoid" | "zfs" => Some(Subsystem::Replication),
            "snapshot_backup" | "restic" => Some(Subsystem::SnapshotBackup),
            _ => None,
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which acquisition source produced a signal. Never consulted by verdict logic.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    MetricsStore,
    DirectProbe,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictState {
    Ok,
    Stale,
    Running,
    Failed,
    Error,
    Unknown,
}

impl VerdictState {
    pub const ALL: [VerdictState; 6] = [
        VerdictState::Ok,
        VerdictState::Stale,
        VerdictState::Running,
        VerdictState::Failed,
        VerdictState::Error,
        VerdictState::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictState::Ok => "OK",
            VerdictState::Stale => "STALE",
            VerdictState::Running => "RUNNING",
            VerdictState::Failed => "FAILED",
            VerdictState::Error => "ERROR",
            VerdictState::Unknown => "UNKNOWN",
        }
    }

    /// OK and RUNNING count as healthy in summaries.
    pub fn is_healthy(&self) -> bool {
        matches!(self, VerdictState::Ok | VerdictState::Running)
    }
}

impl fmt::Display for VerdictState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
