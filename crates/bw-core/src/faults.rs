use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Subsystem;

/// Soft failure isolated to one query or one signal. Never aborts a run.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fault {
    /// A query could not be answered; its signals are treated as absent.
    #[error("{subsystem} {query}: acquisition unavailable: {reason}")]
    AcquisitionUnavailable { subsystem: Subsystem, query: String, reason: String },

    /// One signal was unusable and has been dropped.
    #[error("{subsystem} {query}: malformed signal dropped: {reason}")]
    MalformedSignal { subsystem: Subsystem, query: String, reason: String },
}

impl Fault {
    pub fn unavailable(subsystem: Subsystem, query: impl Into<String>, reason: impl ToString) -> Self {
        Fault::AcquisitionUnavailable { subsystem, query: query.into(), reason: reason.to_string() }
    }

    pub fn malformed(subsystem: Subsystem, query: impl Into<String>, reason: impl ToString) -> Self {
        Fault::MalformedSignal { subsystem, query: query.into(), reason: reason.to_string() }
    }

    pub fn subsystem(&self) -> Subsystem {
        match self {
            Fault::AcquisitionUnavailable { subsystem, .. } | Fault::MalformedSignal { subsystem, .. } => *subsystem,
        }
    }
}
