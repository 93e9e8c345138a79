use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bw_core::{Fault, RawSignal, SourceKind, Subsystem};
use thiserror::Error;

/// One question asked of an acquisition source for one subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QueryKind {
    /// Which jobs exist, with display labels.
    Identity,
    Status,
    LastSuccess,
    /// Repository-level error flag.
    RepositoryHealth,
    /// Repository-level display labels.
    RepositoryInfo,
    /// Extra per-job display labels.
    Details,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Identity => "identity",
            QueryKind::Status => "status",
            QueryKind::LastSuccess => "last_success",
            QueryKind::RepositoryHealth => "repository_health",
            QueryKind::RepositoryInfo => "repository_info",
            QueryKind::Details => "details",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hard failure of one acquisition call. The collect driver turns it into a
/// soft `Fault::AcquisitionUnavailable`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote command exited with status {code}: {stderr}")]
    Remote { code: i32, stderr: String },

    #[error("could not decode response: {0}")]
    Decode(String),
}

/// Signals answered by one call, plus any individual signals that had to be
/// dropped while decoding.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    pub signals: Vec<RawSignal>,
    pub faults: Vec<Fault>,
}

impl Batch {
    pub fn of(signals: Vec<RawSignal>) -> Self {
        Self { signals, faults: Vec::new() }
    }

    pub fn push(&mut self, signal: RawSignal) {
        self.signals.push(signal);
    }

    pub fn drop_malformed(&mut self, subsystem: Subsystem, query: QueryKind, reason: impl ToString) {
        self.faults.push(Fault::malformed(subsystem, query.as_str(), reason));
    }
}

/// An acquisition adapter. "No data" is an empty batch, never an error.
#[async_trait]
pub trait SignalSource: Send + Sync {
    fn source_kind(&self) -> SourceKind;

    /// Queries this source answers for `subsystem`, in issue order.
    fn queries(&self, subsystem: Subsystem) -> Vec<QueryKind>;

    async fn fetch_signals(&self, subsystem: Subsystem, query: QueryKind) -> Result<Batch, AcquisitionError>;
}
